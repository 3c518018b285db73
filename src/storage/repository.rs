use sqlx::PgPool;

// 重新導出子模塊
pub mod bar;
pub mod run_result;

// 重新導出常用類型
pub use bar::{BarRepository, InMemoryBarRepository, PgBarRepository};
pub use run_result::{InMemoryResultRepository, PgResultRepository, ResultRepository};

/// 時間範圍查詢，兩端皆為 Unix 秒且包含在內
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// 按固定長度切分為連續的子區間，最後一段可能較短
    ///
    /// 每段為 `[bk_start, bk_start + chunk - 1]`，相鄰兩段不重疊。
    pub fn chunks(&self, chunk: i64) -> Vec<TimeRange> {
        let mut chunks = Vec::new();
        if self.is_empty() || chunk <= 0 {
            return chunks;
        }
        let mut bk_start = self.start;
        while bk_start <= self.end {
            let bk_end = (bk_start + chunk - 1).min(self.end);
            chunks.push(TimeRange::new(bk_start, bk_end));
            bk_start += chunk;
        }
        chunks
    }
}

/// 通用的數據庫操作特性
pub trait DbExecutor {
    fn get_pool(&self) -> &PgPool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_cover_range_without_overlap() {
        let range = TimeRange::new(0, 25);
        let chunks = range.chunks(10);
        assert_eq!(
            chunks,
            vec![TimeRange::new(0, 9), TimeRange::new(10, 19), TimeRange::new(20, 25)]
        );
    }

    #[test]
    fn test_chunks_include_end_point() {
        // 區間長度恰為整數倍時，終點仍需被覆蓋
        let chunks = TimeRange::new(0, 20).chunks(10);
        assert_eq!(chunks.last(), Some(&TimeRange::new(20, 20)));
    }

    #[test]
    fn test_empty_range() {
        assert!(TimeRange::new(5, 4).is_empty());
        assert!(TimeRange::new(5, 4).chunks(10).is_empty());
        assert!(TimeRange::new(5, 5).contains(5));
    }
}
