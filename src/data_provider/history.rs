//! 歷史行情快取
//!
//! 本地存儲與行情來源保持一致，只補齊缺失的頭尾區間。已存區間內部的空洞
//! 不會被偵測，查詢時由前後值填補。

use std::sync::Arc;
use tracing::{debug, info};

use crate::data_provider::provider::{pair_for_asset, MarketDataProvider};
use crate::domain_types::period::{bucket_ends, check_period, snap_down, FETCH_CHUNK_SECS, STORAGE_PERIOD};
use crate::domain_types::{fill_both, Bar, Feature, TimeSeries};
use crate::error::DataError;
use crate::storage::repository::{BarRepository, TimeRange};

/// 最新記錄落後請求終點超過此數量的存儲週期時才向後補齊
const TAIL_TOLERANCE_PERIODS: i64 = 10;

/// 歷史行情快取
pub struct BarStore {
    repository: Arc<dyn BarRepository>,
    provider: Arc<dyn MarketDataProvider>,
    base_currency: String,
    /// 是否允許向前、向後延伸已存區間
    online: bool,
}

impl BarStore {
    pub fn new(
        repository: Arc<dyn BarRepository>,
        provider: Arc<dyn MarketDataProvider>,
        base_currency: impl Into<String>,
        online: bool,
    ) -> Self {
        Self {
            repository,
            provider,
            base_currency: base_currency.into(),
            online,
        }
    }

    pub fn repository(&self) -> &Arc<dyn BarRepository> {
        &self.repository
    }

    pub fn provider(&self) -> &Arc<dyn MarketDataProvider> {
        &self.provider
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// 確保 `[start, end]` 的存儲粒度記錄已在本地
    ///
    /// 沒有任何記錄時整段補齊；否則只在線上模式延伸頭尾。任何一段失敗都會
    /// 中止調用，已提交的段落保留（寫入為覆蓋式，重試是安全的）。
    pub async fn ensure_range(&self, asset_id: &str, start: i64, end: i64) -> Result<(), DataError> {
        let bounds = self
            .repository
            .time_bounds(asset_id)
            .await
            .map_err(|e| DataError::StoreReadFailed(format!("{:#}", e)))?;

        match bounds {
            None => {
                info!(asset_id, start, end, "本地無記錄，完整補齊");
                self.fill(asset_id, start, end).await?;
            }
            Some((min_ts, max_ts)) => {
                if self.online && max_ts + TAIL_TOLERANCE_PERIODS * STORAGE_PERIOD < end {
                    info!(asset_id, from = max_ts + STORAGE_PERIOD, to = end, "向後補齊");
                    self.fill(asset_id, max_ts + STORAGE_PERIOD, end).await?;
                }
                if self.online && min_ts > start {
                    info!(asset_id, from = start, to = min_ts - STORAGE_PERIOD, "向前補齊");
                    self.fill(asset_id, start, min_ts - STORAGE_PERIOD).await?;
                }
            }
        }

        Ok(())
    }

    /// 分段抓取並寫入 `[start, end]`，每段一個事務，返回寫入的記錄數
    pub async fn fill(&self, asset_id: &str, start: i64, end: i64) -> Result<u64, DataError> {
        let pair = pair_for_asset(asset_id, &self.base_currency);
        let mut written = 0;

        for chunk in TimeRange::new(start, end).chunks(FETCH_CHUNK_SECS) {
            let candles = self
                .provider
                .get_bars(&pair, chunk.start, chunk.end, STORAGE_PERIOD)
                .await?;

            let bars: Vec<Bar> = candles
                .iter()
                .filter(|c| c.date % STORAGE_PERIOD == 0)
                .filter_map(|c| Bar::from_candle(asset_id, c))
                .collect();

            written += self
                .repository
                .upsert_bars(&bars)
                .await
                .map_err(|e| DataError::StoreWriteFailed(format!("{:#}", e)))?;

            debug!(asset_id, pair = %pair, start = chunk.start, end = chunk.end, rows = bars.len(), "寫入一段歷史數據");
        }

        Ok(written)
    }

    /// 讀取單一特徵在 `[start, end]` 的週期序列
    ///
    /// 時間戳為週期結束邊界，每個週期一個值；沒有記錄的週期以前值填補，
    /// 開頭的缺口以第一個有效值填補。
    pub async fn query_feature(
        &self,
        asset_id: &str,
        feature: Feature,
        start: i64,
        end: i64,
        period: i64,
    ) -> Result<TimeSeries, DataError> {
        let period = check_period(period)?;
        let start = snap_down(start, period);
        let end = snap_down(end, period);

        let rows = self
            .repository
            .bucketed(asset_id, feature, TimeRange::new(start, end), period)
            .await
            .map_err(|e| DataError::StoreReadFailed(format!("{:#}", e)))?;

        let timestamps = bucket_ends(start, end, period);
        let mut cells: Vec<Option<f64>> = vec![None; timestamps.len()];
        for (bucket, value) in rows {
            if bucket < start || bucket > end || !value.is_finite() {
                continue;
            }
            cells[((bucket - start) / period) as usize] = Some(value);
        }

        let missing = cells.iter().filter(|c| c.is_none()).count();
        if missing > 0 {
            debug!(asset_id, feature = %feature, missing, total = cells.len(), "填補缺失週期");
        }

        let values = fill_both(&cells).ok_or_else(|| {
            DataError::StoreReadFailed(format!(
                "{} 在 {} 至 {} 之間沒有 {} 數據",
                asset_id, start, end, feature
            ))
        })?;

        Ok(TimeSeries::new(asset_id, feature, start, period, values))
    }
}
