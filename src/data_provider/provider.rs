use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain_types::{RawCandle, REVERSED_PREFIX};
use crate::error::DataError;

/// 以計價貨幣報價的可交易市場
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketInfo {
    /// 交易所的交易對代碼，例如 `BTC_ETH` 或 `USDT_BTC`
    pub pair: String,
    /// 統一方向後的資產代碼，反向交易對帶 `reversed_` 前綴
    pub asset_id: String,
    /// 以計價貨幣表示的最新價格
    pub last_price: f64,
}

impl MarketInfo {
    /// 由交易對與最新成交價建立，與計價貨幣無關的交易對返回 None
    ///
    /// `BASE_X` 為正向交易對，`X_BASE` 為反向交易對，價格取倒數。
    pub fn from_pair(pair: &str, base_currency: &str, last: f64) -> Option<Self> {
        let (quote, asset) = pair.split_once('_')?;

        if quote == base_currency && asset != base_currency {
            return Some(Self {
                pair: pair.to_string(),
                asset_id: asset.to_string(),
                last_price: last,
            });
        }

        if asset == base_currency && quote != base_currency {
            if last <= 0.0 {
                return None;
            }
            return Some(Self {
                pair: pair.to_string(),
                asset_id: format!("{}{}", REVERSED_PREFIX, quote),
                last_price: 1.0 / last,
            });
        }

        None
    }

    pub fn is_reversed(&self) -> bool {
        self.asset_id.starts_with(REVERSED_PREFIX)
    }
}

/// 由資產代碼推出交易對代碼，是 [`MarketInfo::from_pair`] 的逆運算
pub fn pair_for_asset(asset_id: &str, base_currency: &str) -> String {
    match asset_id.strip_prefix(REVERSED_PREFIX) {
        Some(quote) => format!("{}_{}", quote, base_currency),
        None => format!("{}_{}", base_currency, asset_id),
    }
}

/// 行情來源接口，重試由實現自行處理
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// 當前所有以計價貨幣報價的市場
    async fn markets(&self) -> Result<Vec<MarketInfo>, DataError>;

    /// 交易對在 `[start, end]` 的 K 線，`period` 為秒
    async fn get_bars(
        &self,
        pair: &str,
        start: i64,
        end: i64,
        period: i64,
    ) -> Result<Vec<RawCandle>, DataError>;
}
