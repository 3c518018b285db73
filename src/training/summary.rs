//! 運行結果整理與 CSV 匯總

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use parking_lot::Mutex;
use serde::Serialize;
use sqlx::types::Json;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, PipelineResult};
use crate::storage::RunResult;
use crate::training::packages::TrainingPackage;
use crate::training::session::SessionOutcome;
use crate::utils::result_key;

/// 由運行產出組裝結果記錄
pub fn build_result(
    package: &TrainingPackage,
    outcome: &SessionOutcome,
    finished_at: DateTime<Utc>,
) -> PipelineResult<RunResult> {
    let to_json = |value: serde_json::Result<serde_json::Value>| {
        value.map_err(|e| PipelineError::ResultStore(format!("無法序列化配置: {}", e)))
    };

    Ok(RunResult {
        key: result_key(finished_at, package.index),
        package_index: package.index as i64,
        test_pv: outcome.test.portfolio_value,
        test_log_mean: outcome.test.log_mean,
        test_log_mean_free: outcome.test.log_mean_free,
        test_history: Json(outcome.test.history.clone()),
        backtest_test_pv: outcome.backtest.final_value(),
        backtest_test_history: Json(outcome.backtest.factors.clone()),
        backtest_test_log_mean: outcome.backtest.log_mean,
        training_time_secs: outcome.training_time.as_secs() as i64,
        input_params: Json(to_json(serde_json::to_value(&package.config.input))?),
        training_params: Json(to_json(serde_json::to_value(&package.config.training))?),
        created_at: finished_at,
    })
}

/// CSV 匯總的一行
#[derive(Debug, Serialize)]
struct SummaryRecord<'a> {
    key: &'a str,
    package_index: i64,
    test_pv: f64,
    test_log_mean: f64,
    test_log_mean_free: f64,
    test_history: String,
    backtest_test_pv: f64,
    backtest_test_history: String,
    backtest_test_log_mean: f64,
    training_time: i64,
    input_params: String,
    training_params: String,
}

impl<'a> From<&'a RunResult> for SummaryRecord<'a> {
    fn from(result: &'a RunResult) -> Self {
        Self {
            key: &result.key,
            package_index: result.package_index,
            test_pv: result.test_pv,
            test_log_mean: result.test_log_mean,
            test_log_mean_free: result.test_log_mean_free,
            test_history: RunResult::history_string(&result.test_history),
            backtest_test_pv: result.backtest_test_pv,
            backtest_test_history: RunResult::history_string(&result.backtest_test_history),
            backtest_test_log_mean: result.backtest_test_log_mean,
            training_time: result.training_time_secs,
            input_params: result.input_params.0.to_string(),
            training_params: result.training_params.0.to_string(),
        }
    }
}

/// 只追加的 CSV 匯總文件，多個運行共用一個寫入者
#[derive(Debug)]
pub struct SummaryWriter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SummaryWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, result: &RunResult) -> Result<()> {
        let _guard = self.lock.lock();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("無法創建目錄 {}", parent.display()))?;
        }
        let file_has_data = fs::metadata(&self.path).map(|m| m.len() > 0).unwrap_or(false);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("無法打開匯總文件 {}", self.path.display()))?;

        let mut writer = WriterBuilder::new().has_headers(!file_has_data).from_writer(file);
        writer
            .serialize(SummaryRecord::from(result))
            .context("無法寫入匯總記錄")?;
        writer.flush().context("無法刷新匯總文件")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::PortfolioValuePath;
    use crate::config::ApplicationConfig;
    use crate::training::session::TestEvaluation;
    use chrono::TimeZone;
    use std::time::Duration;
    use tempfile::tempdir;

    fn outcome() -> SessionOutcome {
        SessionOutcome {
            test: TestEvaluation {
                portfolio_value: 1.21,
                log_mean: 0.0953,
                log_mean_free: 0.0953,
                history: vec![1.1, 1.1],
            },
            backtest: PortfolioValuePath {
                indices: vec![10, 11],
                pv: vec![1.0, 1.05],
                factors: vec![1.0, 1.05],
                growth: vec![1.0, 1.05],
                costs: vec![0.0, 0.0],
                log_mean: 0.0244,
                log_mean_free: 0.0244,
            },
            training_time: Duration::from_secs(42),
            best_step: None,
        }
    }

    #[test]
    fn test_build_result() {
        let package = TrainingPackage {
            index: 3,
            config: ApplicationConfig::default(),
        };
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let result = build_result(&package, &outcome(), at).unwrap();
        assert_eq!(result.key, "20240102030405_3");
        assert_eq!(result.backtest_test_pv, 1.05);
        assert_eq!(result.training_time_secs, 42);
        assert_eq!(result.input_params.0["window_size"], 31);
    }

    #[test]
    fn test_summary_appends_single_header() {
        let dir = tempdir().unwrap();
        let writer = SummaryWriter::new(dir.path().join("nested").join("summary.csv"));
        let package = TrainingPackage {
            index: 1,
            config: ApplicationConfig::default(),
        };
        let result = build_result(&package, &outcome(), Utc::now()).unwrap();
        writer.append(&result).unwrap();
        writer.append(&result).unwrap();

        let content = fs::read_to_string(writer.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("key,package_index,test_pv"));
    }
}
