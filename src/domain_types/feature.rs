use crate::domain_types::aggregation::AggregationOp;
use crate::domain_types::bar::Bar;
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 張量中的特徵
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Close,
    High,
    Low,
    Open,
    Volume,
}

impl Feature {
    /// 根據特徵數量取得特徵列表，收盤價永遠在第一位
    pub fn from_count(feature_number: usize) -> Result<Vec<Feature>, PipelineError> {
        match feature_number {
            1 => Ok(vec![Feature::Close]),
            2 => Ok(vec![Feature::Close, Feature::Volume]),
            3 => Ok(vec![Feature::Close, Feature::High, Feature::Low]),
            4 => Ok(vec![Feature::Close, Feature::High, Feature::Low, Feature::Open]),
            n => Err(PipelineError::ConfigMismatch(format!(
                "不支援的特徵數量 {}，只能是 1 到 4",
                n
            ))),
        }
    }

    /// 週期聚合方式
    pub fn aggregation(&self) -> AggregationOp {
        match self {
            Feature::Open => AggregationOp::First,
            Feature::Close => AggregationOp::Last,
            Feature::High => AggregationOp::Max,
            Feature::Low => AggregationOp::Min,
            Feature::Volume => AggregationOp::Sum,
        }
    }

    /// 取出記錄中對應的欄位
    pub fn value_of(&self, bar: &Bar) -> f64 {
        match self {
            Feature::Close => bar.close,
            Feature::High => bar.high,
            Feature::Low => bar.low,
            Feature::Open => bar.open,
            Feature::Volume => bar.volume,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Close => "close",
            Feature::High => "high",
            Feature::Low => "low",
            Feature::Open => "open",
            Feature::Volume => "volume",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
