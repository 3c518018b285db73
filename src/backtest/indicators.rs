//! 回測表現指標
//!
//! 所有指標都基於逐步的組合增長因子（每步組合價值的比值）。

use serde::{Deserialize, Serialize};

/// 以 30 分鐘週期計，一天與一週的步數
pub const STEPS_PER_DAY: usize = 48;
pub const STEPS_PER_WEEK: usize = 336;

/// 一次回測的表現摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub portfolio_value: f64,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: f64,
    pub positive_periods: usize,
    pub negative_periods: usize,
    pub positive_days: usize,
    pub negative_days: usize,
    pub positive_weeks: usize,
    pub negative_weeks: usize,
    pub average: f64,
}

impl PerformanceSummary {
    pub fn from_factors(factors: &[f64]) -> Self {
        let days = moving_accumulate(factors, STEPS_PER_DAY);
        let weeks = moving_accumulate(factors, STEPS_PER_WEEK);

        Self {
            portfolio_value: portfolio_value(factors),
            sharpe_ratio: sharpe_ratio(factors),
            max_drawdown: max_drawdown(factors),
            positive_periods: positive_count(factors),
            negative_periods: negative_count(factors),
            positive_days: positive_count(&days),
            negative_days: negative_count(&days),
            positive_weeks: positive_count(&weeks),
            negative_weeks: negative_count(&weeks),
            average: mean(factors).unwrap_or(1.0),
        }
    }
}

pub fn portfolio_value(factors: &[f64]) -> f64 {
    factors.iter().product()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// 每步收益 `factor - 1` 的均值除以總體標準差，不做年化
pub fn sharpe_ratio(factors: &[f64]) -> Option<f64> {
    let mean_return = mean(factors)? - 1.0;
    let variance = factors
        .iter()
        .map(|f| (f - 1.0 - mean_return).powi(2))
        .sum::<f64>()
        / factors.len() as f64;
    let std = variance.sqrt();
    (std > 0.0).then(|| mean_return / std)
}

/// 組合價值曲線上從峰值回落的最大比例
pub fn max_drawdown(factors: &[f64]) -> f64 {
    let mut value = 1.0;
    let mut peak = 1.0_f64;
    let mut drawdown = 0.0_f64;
    for factor in factors {
        value *= factor;
        peak = peak.max(value);
        if peak > 0.0 {
            drawdown = drawdown.max((peak - value) / peak);
        }
    }
    drawdown
}

/// `n` 步的滑動累乘，前 `n` 步為從起點開始的累乘
pub fn moving_accumulate(factors: &[f64], n: usize) -> Vec<f64> {
    let cumulative: Vec<f64> = factors
        .iter()
        .scan(1.0, |acc, f| {
            *acc *= f;
            Some(*acc)
        })
        .collect();

    cumulative
        .iter()
        .enumerate()
        .map(|(i, acc)| if i >= n { acc / cumulative[i - n] } else { *acc })
        .collect()
}

pub fn positive_count(factors: &[f64]) -> usize {
    factors.iter().filter(|f| **f > 1.0).count()
}

pub fn negative_count(factors: &[f64]) -> usize {
    factors.iter().filter(|f| **f < 1.0).count()
}
