// 模組定義
pub mod backtest;
pub mod config;
pub mod data_provider;
pub mod domain_types;
pub mod error;
pub mod market_data;
pub mod storage;
pub mod training;
pub mod utils;

pub use error::{ErrorKind, PipelineError, PipelineResult};
