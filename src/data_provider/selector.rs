use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::data_provider::provider::{pair_for_asset, MarketDataProvider};
use crate::domain_types::period::DAY;
use crate::domain_types::Orientation;
use crate::error::{DataError, SelectionError};
use crate::storage::repository::{BarRepository, TimeRange};

/// 價格低於此值的資產視為塵埃
pub const DEFAULT_DUST_THRESHOLD: f64 = 2e-6;

/// 資產排名快照中的一項
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRanking {
    pub asset_id: String,
    pub pair: String,
    pub trailing_volume: f64,
    /// 離線排名沒有最新價格
    pub last_price: Option<f64>,
}

/// 按成交量選取資產
pub struct AssetSelector {
    provider: Arc<dyn MarketDataProvider>,
    repository: Arc<dyn BarRepository>,
    base_currency: String,
    online: bool,
}

impl AssetSelector {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        repository: Arc<dyn BarRepository>,
        base_currency: impl Into<String>,
        online: bool,
    ) -> Self {
        Self {
            provider,
            repository,
            base_currency: base_currency.into(),
            online,
        }
    }

    /// 成交量統計窗口 `[end - forward_offset - lookback_days 天, end - forward_offset]`
    pub fn volume_window(end: i64, lookback_days: i64, forward_offset: i64) -> TimeRange {
        TimeRange::new(end - forward_offset - lookback_days * DAY, end - forward_offset)
    }

    /// 選出成交量最高的 `k` 個資產，數量不足時返回錯誤
    pub async fn top_k_by_volume(
        &self,
        end: i64,
        k: usize,
        lookback_days: i64,
        forward_offset: i64,
        min_price: f64,
    ) -> Result<Vec<AssetRanking>, SelectionError> {
        let window = Self::volume_window(end, lookback_days, forward_offset);
        info!(start = window.start, end = window.end, k, online = self.online, "選取資產");

        let mut ranking = if self.online {
            self.rank_online(window, min_price).await?
        } else {
            self.rank_offline(window, k).await?
        };

        ranking.sort_by(|a, b| {
            b.trailing_volume
                .total_cmp(&a.trailing_volume)
                .then_with(|| a.asset_id.cmp(&b.asset_id))
        });

        if ranking.len() < k {
            return Err(SelectionError::InsufficientAssets {
                requested: k,
                available: ranking.len(),
            });
        }
        ranking.truncate(k);

        info!(
            assets = ?ranking.iter().map(|r| r.asset_id.as_str()).collect::<Vec<_>>(),
            "已選取資產"
        );
        Ok(ranking)
    }

    /// 向行情來源查詢每個市場的日 K 線並累計成交量
    ///
    /// 正向交易對累計 `volume`，反向交易對累計 `quote_volume`，兩者都是計價貨幣的量。
    async fn rank_online(&self, window: TimeRange, min_price: f64) -> Result<Vec<AssetRanking>, DataError> {
        let markets = self.provider.markets().await?;
        let mut ranking = Vec::with_capacity(markets.len());

        for market in markets {
            if !(market.last_price > min_price) {
                debug!(asset_id = %market.asset_id, price = market.last_price, "排除塵埃資產");
                continue;
            }

            let candles = self
                .provider
                .get_bars(&market.pair, window.start, window.end, DAY)
                .await?;
            let trailing_volume: f64 = match Orientation::of(&market.asset_id) {
                Orientation::Normal => candles.iter().map(|c| c.volume).sum(),
                Orientation::Inverted => candles.iter().map(|c| c.quote_volume).sum(),
            };

            ranking.push(AssetRanking {
                asset_id: market.asset_id,
                pair: market.pair,
                trailing_volume,
                last_price: Some(market.last_price),
            });
        }

        Ok(ranking)
    }

    /// 從本地存儲統計成交量
    async fn rank_offline(&self, window: TimeRange, k: usize) -> Result<Vec<AssetRanking>, DataError> {
        let rows = self
            .repository
            .volume_ranking(window, k)
            .await
            .map_err(|e| DataError::StoreReadFailed(format!("{:#}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| AssetRanking {
                pair: pair_for_asset(&row.asset_id, &self.base_currency),
                asset_id: row.asset_id,
                trailing_volume: row.total_volume,
                last_price: None,
            })
            .collect())
    }
}
