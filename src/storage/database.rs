use crate::config::{self, DatabaseConfig};
use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::ConnectOptions;
use tokio::sync::OnceCell;
use tracing::info;

/// 全局資料庫連接池
static DB_POOL: OnceCell<PgPool> = OnceCell::const_new();

/// 初始化資料庫連接池
pub async fn init_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.username)
        .password(&config.password)
        .database(&config.database)
        .disable_statement_logging();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .max_lifetime(config.max_lifetime())
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout())
        .connect_with(options)
        .await
        .with_context(|| format!("無法連接資料庫 {}:{}", config.host, config.port))?;

    // 測試連接
    sqlx::query("SELECT 1").execute(&pool).await?;
    info!(host = %config.host, database = %config.database, "資料庫連接池已建立");

    Ok(pool)
}

/// 獲取全局資料庫連接池，首次調用時依全局配置建立
pub async fn get_pool() -> Result<&'static PgPool> {
    DB_POOL
        .get_or_try_init(|| async {
            let app_config = config::get_config().context("配置尚未初始化")?;
            init_pool(&app_config.database).await
        })
        .await
}

/// 健康檢查
pub async fn health_check(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").fetch_one(pool).await.is_ok()
}
