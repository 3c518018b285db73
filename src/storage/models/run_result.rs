use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

/// 一次完成的運行結果
///
/// 失敗的運行不會產生此記錄。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RunResult {
    /// `<完成時間>_<訓練包編號>`
    pub key: String,
    pub package_index: i64,
    pub test_pv: f64,
    pub test_log_mean: f64,
    pub test_log_mean_free: f64,
    /// 測試集每步組合價值增長因子
    pub test_history: Json<Vec<f64>>,
    pub backtest_test_pv: f64,
    pub backtest_test_history: Json<Vec<f64>>,
    pub backtest_test_log_mean: f64,
    pub training_time_secs: i64,
    /// 運行所用的 input 配置區段
    pub input_params: Json<serde_json::Value>,
    /// 運行所用的 training 配置區段
    pub training_params: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl RunResult {
    /// 以逗號分隔的歷史序列，用於 CSV 匯總
    pub fn history_string(history: &[f64]) -> String {
        history
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
