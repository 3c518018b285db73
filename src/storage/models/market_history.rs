use crate::domain_types::Bar;
use serde::{Deserialize, Serialize};

/// market_history 表的一行
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BarRow {
    pub time: i64,
    pub asset_id: String,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub weighted_average: f64,
}

impl From<BarRow> for Bar {
    fn from(row: BarRow) -> Self {
        Bar {
            timestamp: row.time,
            asset_id: row.asset_id,
            high: row.high,
            low: row.low,
            open: row.open,
            close: row.close,
            volume: row.volume,
            quote_volume: row.quote_volume,
            weighted_average: row.weighted_average,
        }
    }
}

/// 成交量排名查詢結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct VolumeRank {
    pub asset_id: String,
    pub total_volume: f64,
}
