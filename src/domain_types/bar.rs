use serde::{Deserialize, Serialize};

/// 反向交易對資產代碼的前綴
pub const REVERSED_PREFIX: &str = "reversed_";

/// 交易對方向
///
/// 反向交易對（以資產報價計價貨幣，例如 `USDT_BTC`）在寫入存儲前轉換為
/// 以計價貨幣表示的價格，之後的所有計算都只看到統一方向的數據。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Normal,
    Inverted,
}

impl Orientation {
    /// 根據資產代碼判斷方向
    pub fn of(asset_id: &str) -> Self {
        if asset_id.starts_with(REVERSED_PREFIX) {
            Orientation::Inverted
        } else {
            Orientation::Normal
        }
    }

    pub fn is_inverted(&self) -> bool {
        matches!(self, Orientation::Inverted)
    }
}

/// 行情來源返回的原始 K 線
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCandle {
    pub date: i64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(rename = "quoteVolume")]
    pub quote_volume: f64,
    #[serde(rename = "weightedAverage")]
    pub weighted_average: f64,
}

/// 存儲粒度的 OHLCV 記錄，以 `(timestamp, asset_id)` 唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub asset_id: String,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub weighted_average: f64,
}

impl Bar {
    /// 由原始 K 線轉換，只在寫入時套用一次方向轉換
    ///
    /// 時間戳非正的記錄（行情來源以 0 表示無數據）返回 None。
    pub fn from_candle(asset_id: &str, candle: &RawCandle) -> Option<Self> {
        if candle.date <= 0 {
            return None;
        }

        let weighted_average = if candle.weighted_average == 0.0 {
            candle.close
        } else {
            candle.weighted_average
        };

        let bar = match Orientation::of(asset_id) {
            Orientation::Normal => Bar {
                timestamp: candle.date,
                asset_id: asset_id.to_string(),
                high: candle.high,
                low: candle.low,
                open: candle.open,
                close: candle.close,
                volume: candle.volume,
                quote_volume: candle.quote_volume,
                weighted_average,
            },
            Orientation::Inverted => Bar {
                timestamp: candle.date,
                asset_id: asset_id.to_string(),
                high: 1.0 / candle.low,
                low: 1.0 / candle.high,
                open: 1.0 / candle.open,
                close: 1.0 / candle.close,
                volume: candle.quote_volume,
                quote_volume: candle.volume,
                weighted_average: 1.0 / weighted_average,
            },
        };
        Some(bar)
    }
}
