use crate::domain_types::feature::Feature;
use crate::domain_types::period::bucket_ends;
use serde::{Deserialize, Serialize};

/// 單一資產單一特徵在固定週期上的稠密序列
///
/// `values[i]` 對應時間戳 `start + i * period`，該時間戳是週期的結束邊界。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub asset_id: String,
    pub feature: Feature,
    pub start: i64,
    pub period: i64,
    pub values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(asset_id: impl Into<String>, feature: Feature, start: i64, period: i64, values: Vec<f64>) -> Self {
        Self {
            asset_id: asset_id.into(),
            feature,
            start,
            period,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 最後一個時間戳
    pub fn end(&self) -> i64 {
        self.start + (self.values.len() as i64 - 1).max(0) * self.period
    }

    /// 所有時間戳
    pub fn timestamps(&self) -> Vec<i64> {
        if self.values.is_empty() {
            return Vec::new();
        }
        bucket_ends(self.start, self.end(), self.period)
    }

    /// 指定時間戳的值
    pub fn value_at(&self, timestamp: i64) -> Option<f64> {
        if timestamp < self.start || (timestamp - self.start) % self.period != 0 {
            return None;
        }
        self.values.get(((timestamp - self.start) / self.period) as usize).copied()
    }
}
