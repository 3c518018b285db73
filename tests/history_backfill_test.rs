mod common;

use std::sync::Arc;

use common::{data_sources, FakeProvider, BASE, JAN_2017};
use portfolio_lab::data_provider::BarStore;
use portfolio_lab::domain_types::{Feature, FETCH_CHUNK_SECS, STORAGE_PERIOD};
use portfolio_lab::storage::{BarRepository, InMemoryBarRepository, TimeRange};

async fn stored_timestamps(repository: &InMemoryBarRepository, asset_id: &str, start: i64, end: i64) -> Vec<i64> {
    repository
        .get_bars(asset_id, TimeRange::new(start, end))
        .await
        .unwrap()
        .into_iter()
        .map(|bar| bar.timestamp)
        .collect()
}

fn assert_contiguous(timestamps: &[i64], start: i64, end: i64) {
    assert_eq!(timestamps.first(), Some(&start));
    assert_eq!(timestamps.last(), Some(&end));
    assert!(timestamps.windows(2).all(|w| w[1] - w[0] == STORAGE_PERIOD));
}

#[tokio::test]
async fn test_empty_store_is_filled_completely() {
    let provider = Arc::new(FakeProvider::standard());
    let (repository, store, _) = data_sources(provider.clone(), true);
    let (start, end) = (JAN_2017, JAN_2017 + 86_400);

    store.ensure_range("ETH", start, end).await.unwrap();

    let expected = ((end - start) / STORAGE_PERIOD + 1) as usize;
    assert_eq!(repository.row_count("ETH"), expected);
    assert_contiguous(&stored_timestamps(&repository, "ETH", start, end).await, start, end);
    assert_eq!(repository.assets(), vec!["ETH".to_string()]);
}

#[tokio::test]
async fn test_second_call_fetches_nothing() {
    let provider = Arc::new(FakeProvider::standard());
    let (repository, store, _) = data_sources(provider.clone(), true);
    let (start, end) = (JAN_2017, JAN_2017 + 86_400);

    store.ensure_range("LTC", start, end).await.unwrap();
    let calls = provider.bar_calls();
    let rows = repository.row_count("LTC");

    store.ensure_range("LTC", start, end).await.unwrap();
    assert_eq!(provider.bar_calls(), calls);
    assert_eq!(repository.row_count("LTC"), rows);
}

#[tokio::test]
async fn test_long_range_spans_several_chunks() {
    let provider = Arc::new(FakeProvider::standard());
    let (repository, store, _) = data_sources(provider.clone(), true);
    let start = JAN_2017;
    let end = start + 2 * FETCH_CHUNK_SECS + 600;

    store.ensure_range("XMR", start, end).await.unwrap();

    assert_eq!(provider.bar_calls(), 3);
    let timestamps = stored_timestamps(&repository, "XMR", start, end).await;
    assert_eq!(timestamps.len(), ((end - start) / STORAGE_PERIOD + 1) as usize);
    assert_contiguous(&timestamps, start, end);
}

#[tokio::test]
async fn test_online_store_extends_both_ends() {
    let provider = Arc::new(FakeProvider::standard());
    let (repository, store, _) = data_sources(provider.clone(), true);
    let (start, end) = (JAN_2017 + 3_600, JAN_2017 + 86_400);
    store.ensure_range("ETH", start, end).await.unwrap();

    // 尾部落後在容忍範圍內，不抓取
    let calls = provider.bar_calls();
    store.ensure_range("ETH", start, end + 5 * STORAGE_PERIOD).await.unwrap();
    assert_eq!(provider.bar_calls(), calls);

    let new_end = end + 20 * STORAGE_PERIOD;
    store.ensure_range("ETH", JAN_2017, new_end).await.unwrap();

    let timestamps = stored_timestamps(&repository, "ETH", JAN_2017, new_end).await;
    assert_eq!(timestamps.len(), ((new_end - JAN_2017) / STORAGE_PERIOD + 1) as usize);
    assert_contiguous(&timestamps, JAN_2017, new_end);
}

#[tokio::test]
async fn test_offline_store_keeps_existing_range() {
    let provider = Arc::new(FakeProvider::standard());
    let (repository, online, _) = data_sources(provider.clone(), true);
    let (start, end) = (JAN_2017, JAN_2017 + 86_400);
    online.ensure_range("ETH", start, end).await.unwrap();

    let offline = BarStore::new(repository.clone(), provider.clone(), BASE, false);
    let calls = provider.bar_calls();
    offline
        .ensure_range("ETH", start - 86_400, end + 86_400)
        .await
        .unwrap();

    assert_eq!(provider.bar_calls(), calls);
    assert_eq!(repository.row_count("ETH"), ((end - start) / STORAGE_PERIOD + 1) as usize);
}

#[tokio::test]
async fn test_reversed_asset_is_stored_inverted() {
    let provider = Arc::new(FakeProvider::standard());
    let (repository, store, _) = data_sources(provider.clone(), true);
    let (start, end) = (JAN_2017, JAN_2017 + 3_600);

    store.ensure_range("reversed_USDT", start, end).await.unwrap();

    let bars = repository
        .get_bars("reversed_USDT", TimeRange::new(start, end))
        .await
        .unwrap();
    assert_eq!(bars.len(), 13);
    for bar in &bars {
        let close = provider.price("USDT_BTC", bar.timestamp);
        assert!((bar.close - 1.0 / close).abs() < 1e-12);
        assert!(bar.high >= bar.low);
    }
}

#[tokio::test]
async fn test_query_feature_returns_one_value_per_period() {
    let provider = Arc::new(FakeProvider::standard());
    let (_, store, _) = data_sources(provider.clone(), true);
    let (start, end) = (JAN_2017, JAN_2017 + 86_400);
    store.ensure_range("ETH", start - 1_800, end).await.unwrap();

    let series = store
        .query_feature("ETH", Feature::Close, start, end, 1_800)
        .await
        .unwrap();

    assert_eq!(series.values.len(), 49);
    // 週期收盤價為週期內最後一條記錄
    let expected = provider.price("BTC_ETH", start - 300);
    assert!((series.values[0] - expected).abs() < 1e-12);
}
