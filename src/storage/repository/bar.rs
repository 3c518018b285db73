use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::domain_types::{AggregationOp, Bar, Feature};
use crate::storage::models::market_history::{BarRow, VolumeRank};
use crate::storage::repository::{DbExecutor, TimeRange};

/// 歷史行情存取接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BarRepository: Send + Sync {
    /// 資產已存儲的最早與最晚時間戳
    async fn time_bounds(&self, asset_id: &str) -> Result<Option<(i64, i64)>>;

    /// 以一個事務寫入，主鍵衝突時覆蓋，返回寫入行數
    async fn upsert_bars(&self, bars: &[Bar]) -> Result<u64>;

    /// 區間內的原始記錄，按時間升序
    async fn get_bars(&self, asset_id: &str, range: TimeRange) -> Result<Vec<Bar>>;

    /// 按週期聚合
    ///
    /// 結束於 `T` 的週期包含 `T - period <= ts < T` 的記錄，只返回有數據的週期，
    /// `T` 落在 `range` 之內。
    async fn bucketed(
        &self,
        asset_id: &str,
        feature: Feature,
        range: TimeRange,
        period: i64,
    ) -> Result<Vec<(i64, f64)>>;

    /// 區間內成交量總和最高的資產
    async fn volume_ranking(&self, range: TimeRange, limit: usize) -> Result<Vec<VolumeRank>>;
}

/// PostgreSQL 歷史行情存取實現
pub struct PgBarRepository {
    pool: Arc<PgPool>,
}

impl PgBarRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    fn aggregate_expr(op: AggregationOp) -> &'static str {
        match op {
            AggregationOp::First => "(ARRAY_AGG(v ORDER BY time ASC))[1]",
            AggregationOp::Last => "(ARRAY_AGG(v ORDER BY time DESC))[1]",
            AggregationOp::Max => "MAX(v)",
            AggregationOp::Min => "MIN(v)",
            AggregationOp::Sum => "SUM(v)",
        }
    }
}

impl DbExecutor for PgBarRepository {
    fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BarRepository for PgBarRepository {
    async fn time_bounds(&self, asset_id: &str) -> Result<Option<(i64, i64)>> {
        let (min_time, max_time): (Option<i64>, Option<i64>) = sqlx::query_as(
            r#"
            SELECT MIN(time) AS min_time, MAX(time) AS max_time
            FROM market_history
            WHERE asset_id = $1
            "#,
        )
        .bind(asset_id)
        .fetch_one(self.get_pool())
        .await?;

        Ok(min_time.zip(max_time))
    }

    async fn upsert_bars(&self, bars: &[Bar]) -> Result<u64> {
        if bars.is_empty() {
            return Ok(0);
        }

        let mut tx = self.get_pool().begin().await?;
        let mut written = 0;

        for bar in bars {
            let result = sqlx::query(
                r#"
                INSERT INTO market_history (
                    time, asset_id, high, low, open, close, volume, quote_volume, weighted_average
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (asset_id, time) DO UPDATE SET
                    high = EXCLUDED.high,
                    low = EXCLUDED.low,
                    open = EXCLUDED.open,
                    close = EXCLUDED.close,
                    volume = EXCLUDED.volume,
                    quote_volume = EXCLUDED.quote_volume,
                    weighted_average = EXCLUDED.weighted_average
                "#,
            )
            .bind(bar.timestamp)
            .bind(&bar.asset_id)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.open)
            .bind(bar.close)
            .bind(bar.volume)
            .bind(bar.quote_volume)
            .bind(bar.weighted_average)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn get_bars(&self, asset_id: &str, range: TimeRange) -> Result<Vec<Bar>> {
        let rows = sqlx::query_as::<_, BarRow>(
            r#"
            SELECT time, asset_id, high, low, open, close, volume, quote_volume, weighted_average
            FROM market_history
            WHERE asset_id = $1 AND time >= $2 AND time <= $3
            ORDER BY time ASC
            "#,
        )
        .bind(asset_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(self.get_pool())
        .await?;

        Ok(rows.into_iter().map(Bar::from).collect())
    }

    async fn bucketed(
        &self,
        asset_id: &str,
        feature: Feature,
        range: TimeRange,
        period: i64,
    ) -> Result<Vec<(i64, f64)>> {
        // 欄位名與特徵名一致
        let sql = format!(
            r#"
            SELECT bucket, {agg} AS value
            FROM (
                SELECT time - MOD(time, $2) + $2 AS bucket, time, {column} AS v
                FROM market_history
                WHERE asset_id = $1 AND time >= $3 AND time < $4
            ) x
            GROUP BY bucket
            ORDER BY bucket
            "#,
            agg = Self::aggregate_expr(feature.aggregation()),
            column = feature.as_str(),
        );

        let rows = sqlx::query_as::<_, (i64, f64)>(&sql)
            .bind(asset_id)
            .bind(period)
            .bind(range.start - period)
            .bind(range.end)
            .fetch_all(self.get_pool())
            .await?;

        Ok(rows)
    }

    async fn volume_ranking(&self, range: TimeRange, limit: usize) -> Result<Vec<VolumeRank>> {
        let rows = sqlx::query_as::<_, VolumeRank>(
            r#"
            SELECT asset_id, SUM(volume) AS total_volume
            FROM market_history
            WHERE time >= $1 AND time <= $2
            GROUP BY asset_id
            ORDER BY total_volume DESC, asset_id ASC
            LIMIT $3
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .bind(limit as i64)
        .fetch_all(self.get_pool())
        .await?;

        Ok(rows)
    }
}

/// 記憶體中的歷史行情存儲，用於離線實驗與測試
#[derive(Default)]
pub struct InMemoryBarRepository {
    bars: RwLock<HashMap<String, BTreeMap<i64, Bar>>>,
}

impl InMemoryBarRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 資產已存儲的記錄數
    pub fn row_count(&self, asset_id: &str) -> usize {
        self.bars.read().get(asset_id).map_or(0, BTreeMap::len)
    }

    /// 已存儲的資產
    pub fn assets(&self) -> Vec<String> {
        let mut assets: Vec<String> = self.bars.read().keys().cloned().collect();
        assets.sort();
        assets
    }
}

#[async_trait]
impl BarRepository for InMemoryBarRepository {
    async fn time_bounds(&self, asset_id: &str) -> Result<Option<(i64, i64)>> {
        let bars = self.bars.read();
        Ok(bars.get(asset_id).and_then(|series| {
            let first = series.keys().next()?;
            let last = series.keys().next_back()?;
            Some((*first, *last))
        }))
    }

    async fn upsert_bars(&self, bars: &[Bar]) -> Result<u64> {
        let mut store = self.bars.write();
        for bar in bars {
            store
                .entry(bar.asset_id.clone())
                .or_default()
                .insert(bar.timestamp, bar.clone());
        }
        Ok(bars.len() as u64)
    }

    async fn get_bars(&self, asset_id: &str, range: TimeRange) -> Result<Vec<Bar>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let store = self.bars.read();
        Ok(store
            .get(asset_id)
            .map(|series| series.range(range.start..=range.end).map(|(_, bar)| bar.clone()).collect())
            .unwrap_or_default())
    }

    async fn bucketed(
        &self,
        asset_id: &str,
        feature: Feature,
        range: TimeRange,
        period: i64,
    ) -> Result<Vec<(i64, f64)>> {
        if range.is_empty() || period <= 0 {
            return Ok(Vec::new());
        }
        let store = self.bars.read();
        let Some(series) = store.get(asset_id) else {
            return Ok(Vec::new());
        };

        let mut buckets: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
        for (ts, bar) in series.range((range.start - period)..range.end) {
            let bucket = ts - ts.rem_euclid(period) + period;
            buckets.entry(bucket).or_default().push(feature.value_of(bar));
        }

        let op = feature.aggregation();
        Ok(buckets
            .into_iter()
            .filter_map(|(bucket, values)| op.apply(values).map(|v| (bucket, v)))
            .collect())
    }

    async fn volume_ranking(&self, range: TimeRange, limit: usize) -> Result<Vec<VolumeRank>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let store = self.bars.read();
        let mut ranking: Vec<VolumeRank> = store
            .iter()
            .filter_map(|(asset_id, series)| {
                let mut rows = series.range(range.start..=range.end).peekable();
                rows.peek()?;
                Some(VolumeRank {
                    asset_id: asset_id.clone(),
                    total_volume: rows.map(|(_, bar)| bar.volume).sum(),
                })
            })
            .collect();

        ranking.sort_by(|a, b| {
            b.total_volume
                .total_cmp(&a.total_volume)
                .then_with(|| a.asset_id.cmp(&b.asset_id))
        });
        ranking.truncate(limit);
        Ok(ranking)
    }
}
