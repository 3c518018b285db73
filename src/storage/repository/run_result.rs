use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::PgPool;
use std::sync::Arc;

use crate::storage::models::run_result::RunResult;
use crate::storage::repository::DbExecutor;

/// 運行結果儲存庫特徵
#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// 保存一次運行的結果
    async fn save(&self, result: &RunResult) -> Result<()>;

    /// 根據鍵獲取結果
    async fn get(&self, key: &str) -> Result<Option<RunResult>>;

    /// 最近的結果，按時間倒序
    async fn list_recent(&self, limit: i64) -> Result<Vec<RunResult>>;
}

/// PostgreSQL 運行結果儲存庫實現
pub struct PgResultRepository {
    pool: Arc<PgPool>,
}

impl PgResultRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

impl DbExecutor for PgResultRepository {
    fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ResultRepository for PgResultRepository {
    async fn save(&self, result: &RunResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO run_results (
                key, package_index, test_pv, test_log_mean, test_log_mean_free, test_history,
                backtest_test_pv, backtest_test_history, backtest_test_log_mean,
                training_time_secs, input_params, training_params, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&result.key)
        .bind(result.package_index)
        .bind(result.test_pv)
        .bind(result.test_log_mean)
        .bind(result.test_log_mean_free)
        .bind(&result.test_history)
        .bind(result.backtest_test_pv)
        .bind(&result.backtest_test_history)
        .bind(result.backtest_test_log_mean)
        .bind(result.training_time_secs)
        .bind(&result.input_params)
        .bind(&result.training_params)
        .bind(result.created_at)
        .execute(self.get_pool())
        .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<RunResult>> {
        let result = sqlx::query_as::<_, RunResult>(
            r#"
            SELECT key, package_index, test_pv, test_log_mean, test_log_mean_free, test_history,
                   backtest_test_pv, backtest_test_history, backtest_test_log_mean,
                   training_time_secs, input_params, training_params, created_at
            FROM run_results
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(self.get_pool())
        .await?;

        Ok(result)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<RunResult>> {
        let results = sqlx::query_as::<_, RunResult>(
            r#"
            SELECT key, package_index, test_pv, test_log_mean, test_log_mean_free, test_history,
                   backtest_test_pv, backtest_test_history, backtest_test_log_mean,
                   training_time_secs, input_params, training_params, created_at
            FROM run_results
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.get_pool())
        .await?;

        Ok(results)
    }
}

/// 記憶體中的運行結果儲存庫
#[derive(Default)]
pub struct InMemoryResultRepository {
    results: RwLock<Vec<RunResult>>,
}

impl InMemoryResultRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.results.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.read().is_empty()
    }
}

#[async_trait]
impl ResultRepository for InMemoryResultRepository {
    async fn save(&self, result: &RunResult) -> Result<()> {
        let mut results = self.results.write();
        if results.iter().any(|r| r.key == result.key) {
            anyhow::bail!("運行結果鍵已存在: {}", result.key);
        }
        results.push(result.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<RunResult>> {
        Ok(self.results.read().iter().find(|r| r.key == key).cloned())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<RunResult>> {
        let mut results = self.results.read().clone();
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        results.truncate(limit.max(0) as usize);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use sqlx::types::Json;

    fn result(key: &str, offset_secs: i64) -> RunResult {
        RunResult {
            key: key.to_string(),
            package_index: 1,
            test_pv: 1.2,
            test_log_mean: 0.001,
            test_log_mean_free: 0.0012,
            test_history: Json(vec![1.0, 1.1, 1.2]),
            backtest_test_pv: 1.15,
            backtest_test_history: Json(vec![1.0, 1.15]),
            backtest_test_log_mean: 0.0009,
            training_time_secs: 42,
            input_params: Json(serde_json::json!({ "coin_number": 11 })),
            training_params: Json(serde_json::json!({ "steps": 100 })),
            created_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[tokio::test]
    async fn test_in_memory_save_and_list() {
        let repo = InMemoryResultRepository::new();
        repo.save(&result("a", 0)).await.unwrap();
        repo.save(&result("b", 10)).await.unwrap();

        assert_eq!(repo.len(), 2);
        assert!(repo.save(&result("a", 20)).await.is_err());

        let recent = repo.list_recent(1).await.unwrap();
        assert_eq!(recent[0].key, "b");
        assert_eq!(repo.get("a").await.unwrap().unwrap().training_time_secs, 42);
        assert!(repo.get("missing").await.unwrap().is_none());
    }
}
