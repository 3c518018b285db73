//! 回測系統模組
//!
//! 在測試區間上按時間順序回放決策策略，計算扣除交易成本後的組合價值，
//! 並提供基準策略與表現指標。

pub mod engine;
pub mod indicators;
pub mod policy;

// 重新導出主要類型和結構
pub use engine::{BacktestEngine, PortfolioValuePath};
pub use indicators::PerformanceSummary;
pub use policy::{
    benchmark, drift, held_relative, BestAsset, ExponentialGradient, Policy, UniformBuyAndHold,
    UniformConstantRebalanced,
};
