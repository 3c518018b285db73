use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, info};

use crate::backtest::indicators::PerformanceSummary;
use crate::backtest::policy::{benchmark, drift, Policy};
use crate::config::BacktestConfig;
use crate::error::BacktestError;
use crate::market_data::SampleWindower;

/// 權重和允許的誤差
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// 回測產生的組合價值路徑
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioValuePath {
    /// 每一步的狀態索引
    pub indices: Vec<usize>,
    /// 每一步結束時的組合價值，起始價值為 1
    pub pv: Vec<f64>,
    /// 扣除成本後的單步增長因子
    pub factors: Vec<f64>,
    /// 未扣成本的單步增長 `w · y`
    pub growth: Vec<f64>,
    pub costs: Vec<f64>,
    /// `mean(ln(factor))`
    pub log_mean: f64,
    /// `mean(ln(growth))`
    pub log_mean_free: f64,
}

impl PortfolioValuePath {
    fn from_steps(indices: Vec<usize>, growth: Vec<f64>, costs: Vec<f64>, factors: Vec<f64>) -> Self {
        let pv = factors
            .iter()
            .scan(1.0, |value, factor| {
                *value *= factor;
                Some(*value)
            })
            .collect();

        Self {
            log_mean: log_mean(&factors),
            log_mean_free: log_mean(&growth),
            indices,
            pv,
            factors,
            growth,
            costs,
        }
    }

    /// 最終組合價值
    pub fn final_value(&self) -> f64 {
        self.pv.last().copied().unwrap_or(1.0)
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn summary(&self) -> PerformanceSummary {
        PerformanceSummary::from_factors(&self.factors)
    }
}

fn log_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| v.ln()).sum::<f64>() / values.len() as f64
}

/// 回測引擎
#[derive(Debug, Clone)]
pub struct BacktestEngine {
    fee_rate: f64,
    pv_floor: f64,
}

impl BacktestEngine {
    pub fn new(fee_rate: f64, pv_floor: f64) -> Self {
        Self { fee_rate, pv_floor }
    }

    pub fn from_config(config: &BacktestConfig) -> Self {
        Self::new(config.trading_consumption, config.pv_floor)
    }

    pub fn fee_rate(&self) -> f64 {
        self.fee_rate
    }

    /// 單步的增長、成本與扣成本後的因子
    ///
    /// `drifted_previous` 為上一期權重隨其持有期價格漂移後的值。
    pub fn step(&self, weights: &Array1<f64>, relative: &Array1<f64>, drifted_previous: &Array1<f64>) -> (f64, f64, f64) {
        let growth = weights.dot(relative);
        let turnover: f64 = weights
            .iter()
            .zip(drifted_previous.iter())
            .map(|(w, p)| (w - p).abs())
            .sum();
        let cost = self.fee_rate * turnover;
        (growth, cost, (growth - cost).max(self.pv_floor))
    }

    fn check_weights(step: usize, weights: &Array1<f64>, columns: usize) -> Result<(), BacktestError> {
        let invalid = |reason: String| Err(BacktestError::InvalidWeights { step, reason });

        if weights.len() != columns {
            return invalid(format!("權重長度 {}，應為 {}", weights.len(), columns));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < -WEIGHT_SUM_TOLERANCE) {
            return invalid(format!("權重含負值或非有限值: {}", weights));
        }
        let total = weights.sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return invalid(format!("權重和為 {}", total));
        }
        Ok(())
    }

    /// 按時間順序回放 `range` 內的狀態索引
    ///
    /// 起始權重為 PVM 中第一個索引的上一行。每一步的決策在下一步之前寫回 PVM。
    pub fn run<P: Policy + ?Sized>(
        &self,
        windower: &mut SampleWindower,
        policy: &mut P,
        range: Range<usize>,
    ) -> Result<PortfolioValuePath, BacktestError> {
        if range.is_empty() {
            return Err(BacktestError::EmptyTestRange);
        }

        let columns = windower.pvm().num_columns();
        let mut previous = windower.pvm().previous(range.start)?;
        // 起始權重視為進場時的持倉，不做漂移
        let mut held: Option<Array1<f64>> = None;

        let steps = range.len();
        let mut indices = Vec::with_capacity(steps);
        let mut growth = Vec::with_capacity(steps);
        let mut costs = Vec::with_capacity(steps);
        let mut factors = Vec::with_capacity(steps);

        for (step, index) in range.enumerate() {
            let window = windower.window(index)?;
            let weights = policy.decide(&window, &previous)?;
            Self::check_weights(step, &weights, columns)?;
            windower.commit_step(index, &weights)?;

            let drifted = match &held {
                Some(relative) => drift(previous.view(), relative.view()),
                None => previous.clone(),
            };
            let (g, c, factor) = self.step(&weights, &window.y, &drifted);
            debug!(index, growth = g, cost = c, factor, "回測步驟");

            indices.push(index);
            growth.push(g);
            costs.push(c);
            factors.push(factor);

            previous = weights;
            held = Some(window.y);
        }

        let path = PortfolioValuePath::from_steps(indices, growth, costs, factors);
        info!(
            policy = policy.name(),
            steps = path.len(),
            final_pv = path.final_value(),
            log_mean = path.log_mean,
            "回測完成"
        );
        Ok(path)
    }

    /// 在測試集上回測
    pub fn run_test<P: Policy + ?Sized>(&self, windower: &mut SampleWindower, policy: &mut P) -> Result<PortfolioValuePath, BacktestError> {
        let range = windower.test_indices();
        self.run(windower, policy, range)
    }

    /// 依名稱建立基準策略並在測試集上回測
    pub fn run_benchmark(&self, windower: &mut SampleWindower, name: &str) -> Result<PortfolioValuePath, BacktestError> {
        let range = windower.test_indices();
        if range.is_empty() {
            return Err(BacktestError::EmptyTestRange);
        }
        // 事後最佳資產從第一個目標週期之前的收盤價看到最後一個目標週期
        let window_size = windower.window_size();
        let hindsight = (range.start + window_size - 1, range.end - 1 + window_size);
        let mut policy = benchmark(name, windower.tensor(), hindsight)?;
        self.run(windower, policy.as_mut(), range)
    }

    /// 批次形式的逐行因子
    ///
    /// 第 `b` 行的成本相對第 `b - 1` 行漂移後的權重計算，第一行不計成本。
    pub fn batch_factors(&self, weights: &Array2<f64>, relatives: &Array2<f64>) -> Vec<f64> {
        let mut factors = Vec::with_capacity(weights.nrows());
        for b in 0..weights.nrows() {
            let w = weights.row(b).to_owned();
            let y = relatives.row(b).to_owned();
            let drifted = if b == 0 {
                w.clone()
            } else {
                drift(weights.row(b - 1), relatives.row(b - 1))
            };
            factors.push(self.step(&w, &y, &drifted).2);
        }
        factors
    }
}
