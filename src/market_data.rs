//! 訓練與回測使用的數據結構
//!
//! - `global_matrix`: 特徵張量與建立流程
//! - `pvm`: 組合權重記憶
//! - `replay_buffer`: 帶偏置的經驗回放
//! - `windower`: 窗口樣本、數據劃分與抽樣

pub mod global_matrix;
pub mod pvm;
pub mod replay_buffer;
pub mod windower;

pub use global_matrix::{build, volume_forward, FeatureTensor, GlobalMatrix, MatrixParams};
pub use pvm::PortfolioVectorMemory;
pub use replay_buffer::{sample_offset, Experience, ReplayBuffer};
pub use windower::{split, Batch, CommitToken, IndexPartition, SampleWindower, Window, WindowerParams};
