//! Poloniex 相容的公開行情 API 客戶端

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::data_provider::provider::{MarketDataProvider, MarketInfo};
use crate::domain_types::RawCandle;
use crate::error::DataError;

/// Poloniex 公開 API 客戶端
#[derive(Debug, Clone)]
pub struct PoloniexClient {
    base_url: String,
    base_currency: String,
    max_retries: u32,
    retry_delay: Duration,
    client: reqwest::Client,
}

impl PoloniexClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, DataError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| DataError::ProviderUnavailable(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            base_currency: config.base_currency.clone(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            client,
        })
    }

    /// 發送請求，失敗時按遞增間隔重試
    async fn command<T: DeserializeOwned>(&self, params: &[(&str, String)]) -> Result<T, DataError> {
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay * attempt).await;
            }

            match self.command_once(params).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(attempt, error = %e, "行情來源請求失敗");
                    last_error = e;
                }
            }
        }

        Err(DataError::ProviderUnavailable(format!(
            "重試 {} 次後仍失敗: {}",
            self.max_retries, last_error
        )))
    }

    async fn command_once<T: DeserializeOwned>(&self, params: &[(&str, String)]) -> Result<T, String> {
        let response = self
            .client
            .get(&self.base_url)
            .query(params)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let body: serde_json::Value = response
            .error_for_status()
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;

        if let Some(message) = body.get("error").and_then(|e| e.as_str()) {
            return Err(message.to_string());
        }

        serde_json::from_value(body).map_err(|e| e.to_string())
    }
}

/// 解析 24 小時成交量回應中的交易對
///
/// 回應中除交易對外還包含 `totalBTC` 之類的匯總欄位，只保留物件值。
pub fn parse_volume_pairs(body: &HashMap<String, serde_json::Value>) -> Vec<String> {
    let mut pairs: Vec<String> = body
        .iter()
        .filter(|(key, value)| value.is_object() && key.contains('_'))
        .map(|(key, _)| key.clone())
        .collect();
    pairs.sort();
    pairs
}

/// 解析行情快照中的最新成交價，價格以字串表示
pub fn parse_ticker_last(body: &HashMap<String, serde_json::Value>) -> HashMap<String, f64> {
    body.iter()
        .filter_map(|(pair, ticker)| {
            let last = ticker.get("last")?;
            let price = match last {
                serde_json::Value::String(s) => s.parse().ok()?,
                other => other.as_f64()?,
            };
            Some((pair.clone(), price))
        })
        .collect()
}

#[async_trait]
impl MarketDataProvider for PoloniexClient {
    async fn markets(&self) -> Result<Vec<MarketInfo>, DataError> {
        let volume: HashMap<String, serde_json::Value> =
            self.command(&[("command", "return24hVolume".to_string())]).await?;
        let ticker: HashMap<String, serde_json::Value> =
            self.command(&[("command", "returnTicker".to_string())]).await?;
        let prices = parse_ticker_last(&ticker);

        let markets: Vec<MarketInfo> = parse_volume_pairs(&volume)
            .into_iter()
            .filter_map(|pair| {
                let last = *prices.get(&pair)?;
                MarketInfo::from_pair(&pair, &self.base_currency, last)
            })
            .collect();

        debug!(count = markets.len(), "取得市場列表");
        Ok(markets)
    }

    async fn get_bars(
        &self,
        pair: &str,
        start: i64,
        end: i64,
        period: i64,
    ) -> Result<Vec<RawCandle>, DataError> {
        let mut candles: Vec<RawCandle> = self
            .command(&[
                ("command", "returnChartData".to_string()),
                ("currencyPair", pair.to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
                ("period", period.to_string()),
            ])
            .await?;

        candles.sort_by_key(|c| c.date);
        debug!(pair, start, end, count = candles.len(), "取得 K 線");
        Ok(candles)
    }
}
