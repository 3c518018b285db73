//! 單次訓練運行
//!
//! 一次運行擁有自己的張量、PVM 與回放緩衝區：抽樣、訓練、寫回權重，
//! 定期在測試集上評估，最後在測試集上逐步回測。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, instrument};

use crate::backtest::{BacktestEngine, PortfolioValuePath};
use crate::config::{ApplicationConfig, TrainingConfig};
use crate::data_provider::{AssetSelector, BarStore};
use crate::error::{PipelineError, PipelineResult, PolicyError};
use crate::market_data::{build, MatrixParams, SampleWindower, WindowerParams};
use crate::storage::{ResultRepository, RunResult};
use crate::training::agent::{agent_from_name, Agent};
use crate::training::events::{EventSink, RunEvent};
use crate::training::packages::TrainingPackage;
use crate::training::summary::SummaryWriter;

/// 測試集的批次評估結果
#[derive(Debug, Clone, PartialEq)]
pub struct TestEvaluation {
    pub portfolio_value: f64,
    pub log_mean: f64,
    pub log_mean_free: f64,
    /// 扣成本後的逐步因子
    pub history: Vec<f64>,
}

impl TestEvaluation {
    fn from_steps(factors: Vec<f64>, growth: &[f64]) -> Self {
        let mean_ln = |values: &[f64]| {
            if values.is_empty() {
                0.0
            } else {
                values.iter().map(|v| v.ln()).sum::<f64>() / values.len() as f64
            }
        };
        Self {
            portfolio_value: factors.iter().product(),
            log_mean: mean_ln(&factors),
            log_mean_free: mean_ln(growth),
            history: factors,
        }
    }
}

/// 一次運行的產出
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub test: TestEvaluation,
    pub backtest: PortfolioValuePath,
    pub training_time: Duration,
    /// 開啟快照時表現最好的步數，`test` 與 `backtest` 都來自該步的代理狀態
    pub best_step: Option<usize>,
}

/// 訓練會話
pub struct TrainingSession {
    package_index: usize,
    windower: SampleWindower,
    agent: Box<dyn Agent>,
    engine: BacktestEngine,
    config: TrainingConfig,
    events: EventSink,
}

impl TrainingSession {
    pub fn new(
        package_index: usize,
        windower: SampleWindower,
        agent: Box<dyn Agent>,
        engine: BacktestEngine,
        config: TrainingConfig,
        events: EventSink,
    ) -> Self {
        Self {
            package_index,
            windower,
            agent,
            engine,
            config,
            events,
        }
    }

    pub fn windower(&self) -> &SampleWindower {
        &self.windower
    }

    /// 抽樣、訓練並寫回一批權重
    pub fn train_step(&mut self) -> PipelineResult<()> {
        let (batch, token) = self.windower.sample()?;
        let weights = self.agent.train_batch(&batch)?;
        self.windower.commit(token, &weights)?;
        Ok(())
    }

    /// 以 PVM 中的上一期權重批次評估整個測試集，決策寫回 PVM
    pub fn evaluate_test(&mut self) -> PipelineResult<TestEvaluation> {
        let (batch, token) = self.windower.test_set()?;
        let weights = self.agent.decide_batch(&batch)?;
        let factors = self.engine.batch_factors(&weights, &batch.y);
        let growth: Vec<f64> = (0..weights.nrows())
            .map(|b| weights.row(b).dot(&batch.y.row(b)))
            .collect();
        self.windower.commit(token, &weights)?;
        Ok(TestEvaluation::from_steps(factors, &growth))
    }

    /// 訓練集上的批次評估，不寫回 PVM
    fn evaluate_training(&mut self) -> PipelineResult<f64> {
        let (batch, _token) = self.windower.training_set()?;
        let weights = self.agent.decide_batch(&batch)?;
        Ok(self.engine.batch_factors(&weights, &batch.y).iter().product())
    }

    #[instrument(skip(self), fields(package_index = self.package_index))]
    pub fn run(mut self) -> PipelineResult<SessionOutcome> {
        let started = Instant::now();
        let mut best: Option<(usize, f64, Box<dyn Agent>)> = None;

        for step in 0..self.config.steps {
            self.train_step()?;

            if (step + 1) % self.config.log_interval != 0 {
                continue;
            }
            let evaluation = self.evaluate_test()?;
            if !self.config.fast_train {
                let train_pv = self.evaluate_training()?;
                debug!(step, train_pv, "訓練集評估");
            }
            info!(
                step,
                test_pv = evaluation.portfolio_value,
                log_mean = evaluation.log_mean,
                "測試集評估"
            );
            self.events.emit(RunEvent::Progress {
                package_index: self.package_index,
                step,
                test_pv: evaluation.portfolio_value,
                test_log_mean: evaluation.log_mean,
            });

            if self.config.snap_shot
                && best
                    .as_ref()
                    .map_or(true, |(_, pv, _)| evaluation.portfolio_value > *pv)
            {
                best = Some((step, evaluation.portfolio_value, self.agent.snapshot()));
            }
        }
        let training_time = started.elapsed();

        let best_step = best.map(|(step, test_pv, agent)| {
            info!(step, test_pv, "還原最佳快照");
            self.agent = agent;
            step
        });
        let test = self.evaluate_test()?;
        let backtest = self.engine.run_test(&mut self.windower, self.agent.as_mut())?;

        Ok(SessionOutcome {
            test,
            backtest,
            training_time,
            best_step,
        })
    }
}

/// 運行共用的外部資源
#[derive(Clone)]
pub struct RunContext {
    pub store: Arc<BarStore>,
    pub selector: Arc<AssetSelector>,
    pub results: Arc<dyn ResultRepository>,
    pub summary: Option<Arc<SummaryWriter>>,
    pub events: EventSink,
}

/// 執行一個訓練包：建立張量、訓練、回測並保存結果
///
/// 失敗的運行只發送 `Failed` 事件，不保存任何部分結果。
pub async fn execute(package: TrainingPackage, context: RunContext) -> PipelineResult<RunResult> {
    let index = package.index;
    context.events.emit(RunEvent::Started { package_index: index });

    match execute_inner(&package, &context).await {
        Ok(result) => {
            context.events.emit(RunEvent::Completed {
                package_index: index,
                key: result.key.clone(),
                test_pv: result.test_pv,
                backtest_test_pv: result.backtest_test_pv,
            });
            Ok(result)
        }
        Err(e) => {
            error!(package_index = index, kind = e.kind().as_str(), "運行失敗: {}", e);
            context.events.emit(RunEvent::Failed {
                package_index: index,
                kind: e.kind(),
                message: e.to_string(),
            });
            Err(e)
        }
    }
}

async fn execute_inner(package: &TrainingPackage, context: &RunContext) -> PipelineResult<RunResult> {
    let config = &package.config;
    let params = MatrixParams::from_config(&config.input)?;
    let matrix = build(&context.store, &context.selector, &params).await?;

    let windower = SampleWindower::new(matrix.tensor, matrix.pvm, &WindowerParams::from_config(config))?;
    let session = new_session(package.index, windower, config, context.events.clone())?;

    let outcome = tokio::task::spawn_blocking(move || session.run())
        .await
        .map_err(|e| PipelineError::Policy(PolicyError::Failed(format!("運行任務異常結束: {}", e))))??;

    let result = crate::training::summary::build_result(package, &outcome, Utc::now())?;
    context
        .results
        .save(&result)
        .await
        .map_err(|e| PipelineError::ResultStore(e.to_string()))?;
    if let Some(summary) = &context.summary {
        summary
            .append(&result)
            .map_err(|e| PipelineError::ResultStore(e.to_string()))?;
    }

    info!(
        package_index = package.index,
        key = %result.key,
        test_pv = result.test_pv,
        backtest_test_pv = result.backtest_test_pv,
        "運行完成"
    );
    Ok(result)
}

/// 依配置建立會話
pub fn new_session(
    package_index: usize,
    windower: SampleWindower,
    config: &ApplicationConfig,
    events: EventSink,
) -> PipelineResult<TrainingSession> {
    let test = windower.test_indices();
    if test.is_empty() {
        return Err(PipelineError::ConfigMismatch("測試集沒有完整窗口".to_string()));
    }
    let window_size = windower.window_size();
    let hindsight = (test.start + window_size - 1, test.end - 1 + window_size);
    let agent = agent_from_name(&config.training.agent_name, windower.tensor(), hindsight)?;

    Ok(TrainingSession::new(
        package_index,
        windower,
        agent,
        BacktestEngine::from_config(&config.backtest),
        config.training.clone(),
        events,
    ))
}
