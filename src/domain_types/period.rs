use crate::error::DataError;

pub const FIVE_MINUTES: i64 = 300;
pub const FIFTEEN_MINUTES: i64 = 900;
pub const HALF_HOUR: i64 = 1800;
pub const TWO_HOUR: i64 = 7200;
pub const FOUR_HOUR: i64 = 14400;
pub const DAY: i64 = 86400;

/// 存儲粒度，所有入庫記錄的時間戳都是它的倍數
pub const STORAGE_PERIOD: i64 = FIVE_MINUTES;

/// 每次向行情來源請求的最大區間（約三個月）
pub const FETCH_CHUNK_SECS: i64 = 7_819_200;

pub const SUPPORTED_PERIODS: [i64; 6] = [
    FIVE_MINUTES,
    FIFTEEN_MINUTES,
    HALF_HOUR,
    TWO_HOUR,
    FOUR_HOUR,
    DAY,
];

/// 檢查週期是否受支援
pub fn check_period(period: i64) -> Result<i64, DataError> {
    if SUPPORTED_PERIODS.contains(&period) {
        Ok(period)
    } else {
        Err(DataError::UnsupportedPeriod(period))
    }
}

/// 將時間戳向下對齊到週期邊界
pub fn snap_down(timestamp: i64, period: i64) -> i64 {
    timestamp - timestamp.rem_euclid(period)
}

/// `[start, end]` 內每個週期邊界的時間戳
pub fn bucket_ends(start: i64, end: i64, period: i64) -> Vec<i64> {
    if end < start || period <= 0 {
        return Vec::new();
    }
    (0..=((end - start) / period))
        .map(|i| start + i * period)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[rstest]
    #[case(300)]
    #[case(900)]
    #[case(1800)]
    #[case(7200)]
    #[case(14400)]
    #[case(86400)]
    fn test_supported_periods(#[case] period: i64) {
        assert_eq!(check_period(period).unwrap(), period);
    }

    #[rstest]
    #[case(0)]
    #[case(600)]
    #[case(3600)]
    fn test_unsupported_periods(#[case] period: i64) {
        assert_matches!(check_period(period), Err(DataError::UnsupportedPeriod(p)) if p == period);
    }

    #[test]
    fn test_snap_down() {
        assert_eq!(snap_down(1_500_000_123, 300), 1_500_000_000);
        assert_eq!(snap_down(1_500_000_000, 1800), 1_499_999_400);
        assert_eq!(snap_down(600, 300), 600);
    }

    #[test]
    fn test_bucket_ends() {
        assert_eq!(bucket_ends(0, 900, 300), vec![0, 300, 600, 900]);
        assert_eq!(bucket_ends(0, 0, 300), vec![0]);
        assert!(bucket_ends(900, 0, 300).is_empty());
    }
}
