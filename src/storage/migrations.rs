use anyhow::{Context, Result};
use sqlx::{migrate::Migrator, PgPool};
use tracing::{debug, info};

// 編譯時嵌入專案根目錄的 migrations/
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// 嵌入的遷移：`(版本, 描述)`
pub fn embedded_migrations() -> Vec<(i64, String)> {
    MIGRATOR
        .iter()
        .map(|m| (m.version, m.description.to_string()))
        .collect()
}

/// 建立 market_history 與 run_results，已套用的版本會跳過
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    for (version, description) in embedded_migrations() {
        debug!(version, %description, "檢查遷移");
    }
    MIGRATOR.run(pool).await.context("遷移失敗")?;
    info!(count = MIGRATOR.iter().count(), "數據庫遷移完成");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_migrations_are_ordered() {
        let migrations = embedded_migrations();
        assert_eq!(migrations.len(), 2);
        assert!(migrations.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(migrations[0].1.contains("market history"));
    }
}
