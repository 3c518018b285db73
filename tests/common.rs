#![allow(dead_code)]

use async_trait::async_trait;
use ndarray::Array3;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use portfolio_lab::config::ApplicationConfig;
use portfolio_lab::data_provider::{AssetSelector, BarStore, MarketDataProvider, MarketInfo};
use portfolio_lab::domain_types::{Feature, RawCandle};
use portfolio_lab::error::DataError;
use portfolio_lab::market_data::{FeatureTensor, PortfolioVectorMemory, SampleWindower, WindowerParams};
use portfolio_lab::storage::InMemoryBarRepository;

pub const BASE: &str = "BTC";

/// 2017/01/01 00:00 UTC
pub const JAN_2017: i64 = 1_483_228_800;

/// 測試用的行情來源：一個交易對的價格只由時間決定
pub struct FakeProvider {
    /// `(交易對, 基準價, 每根 K 線的成交量)`
    markets: Vec<(String, f64, f64)>,
    flat: bool,
    bar_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(markets: &[(&str, f64, f64)]) -> Self {
        Self {
            markets: markets
                .iter()
                .map(|(pair, price, volume)| (pair.to_string(), *price, *volume))
                .collect(),
            flat: false,
            bar_calls: AtomicUsize::new(0),
        }
    }

    /// 四個市場，其中 `USDT_BTC` 為反向交易對
    pub fn standard() -> Self {
        Self::new(&[
            ("BTC_ETH", 0.05, 500.0),
            ("BTC_LTC", 0.01, 300.0),
            ("BTC_XMR", 0.02, 200.0),
            ("USDT_BTC", 1000.0, 0.1),
        ])
    }

    /// 所有價格恆定
    pub fn flat(mut self) -> Self {
        self.flat = true;
        self
    }

    pub fn bar_calls(&self) -> usize {
        self.bar_calls.load(Ordering::SeqCst)
    }

    pub fn price(&self, pair: &str, timestamp: i64) -> f64 {
        let base = self
            .markets
            .iter()
            .find(|(p, _, _)| p == pair)
            .map(|(_, price, _)| *price)
            .unwrap_or(1.0);
        if self.flat {
            base
        } else {
            base * (1.0 + 0.002 * ((timestamp / 300) % 13) as f64)
        }
    }
}

#[async_trait]
impl MarketDataProvider for FakeProvider {
    async fn markets(&self) -> Result<Vec<MarketInfo>, DataError> {
        Ok(self
            .markets
            .iter()
            .filter_map(|(pair, price, _)| MarketInfo::from_pair(pair, BASE, *price))
            .collect())
    }

    async fn get_bars(&self, pair: &str, start: i64, end: i64, period: i64) -> Result<Vec<RawCandle>, DataError> {
        self.bar_calls.fetch_add(1, Ordering::SeqCst);
        let volume = self
            .markets
            .iter()
            .find(|(p, _, _)| p == pair)
            .map(|(_, _, v)| *v)
            .ok_or_else(|| DataError::UnknownAsset(pair.to_string()))?;

        let first = start + (period - start.rem_euclid(period)) % period;
        Ok((first..=end)
            .step_by(period as usize)
            .map(|date| {
                let close = self.price(pair, date);
                RawCandle {
                    date,
                    high: close * 1.01,
                    low: close * 0.99,
                    open: close,
                    close,
                    volume,
                    quote_volume: volume * close,
                    weighted_average: close,
                }
            })
            .collect())
    }
}

/// 共用同一個記憶體存儲的歷史快取與資產篩選器
pub fn data_sources(
    provider: Arc<FakeProvider>,
    online: bool,
) -> (Arc<InMemoryBarRepository>, Arc<BarStore>, Arc<AssetSelector>) {
    let repository = Arc::new(InMemoryBarRepository::new());
    let store = Arc::new(BarStore::new(repository.clone(), provider.clone(), BASE, online));
    let selector = Arc::new(AssetSelector::new(provider, repository.clone(), BASE, online));
    (repository, store, selector)
}

/// 一週半小時數據的配置，規模足以切出訓練集與測試集
pub fn small_config() -> ApplicationConfig {
    let mut config = ApplicationConfig::default();
    config.input.start_date = "2017/01/01".to_string();
    config.input.end_date = "2017/01/08".to_string();
    config.input.global_period = 1800;
    config.input.coin_number = 3;
    config.input.window_size = 31;
    config.input.feature_number = 3;
    config.input.test_portion = 0.2;
    config.input.online = true;
    config.training.steps = 10;
    config.training.batch_size = 16;
    config.training.log_interval = 5;
    config.training.fast_train = true;
    config.training.snap_shot = false;
    config.backtest.trading_consumption = 0.0025;
    config
}

/// 由收盤價函數直接建立只含收盤價的張量與 PVM
pub fn close_only_windower(
    num_assets: usize,
    num_periods: usize,
    window_size: usize,
    test_portion: f64,
    close: impl Fn(usize, usize) -> f64,
) -> SampleWindower {
    let data = Array3::from_shape_fn((1, num_assets, num_periods), |(_, a, t)| close(a, t));
    let assets = (0..num_assets).map(|a| format!("A{}", a)).collect();
    let tensor = FeatureTensor::new(data, vec![Feature::Close], assets, JAN_2017, 1800)
        .expect("tensor shape");
    let pvm = PortfolioVectorMemory::new(num_periods, num_assets, true);
    let params = WindowerParams {
        window_size,
        test_portion,
        portion_reversed: false,
        batch_size: 1,
        buffer_bias: 0.99995,
        is_permed: false,
        random_seed: 0,
    };
    SampleWindower::new(tensor, pvm, &params).expect("windower")
}
