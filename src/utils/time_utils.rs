// time_utils.rs
//
// 秒級 Unix 時間戳與日期之間的轉換，以及結果鍵的格式。

use chrono::{DateTime, TimeZone, Utc};

/// 結果鍵中的時間格式
pub const KEY_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// 將秒級時間戳轉換為 DateTime<Utc>，超出範圍時返回 None
pub fn timestamp_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

/// 以 `YYYY/MM/DD HH:MM` 顯示時間戳，用於日誌
pub fn format_timestamp(ts: i64) -> String {
    timestamp_to_datetime(ts)
        .map(|dt| dt.format("%Y/%m/%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// 當前秒級時間戳
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// 運行結果的鍵：`<完成時間>_<訓練包編號>`
pub fn result_key(finished_at: DateTime<Utc>, package_index: usize) -> String {
    format!("{}_{}", finished_at.format(KEY_TIME_FORMAT), package_index)
}
