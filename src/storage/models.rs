pub mod market_history;
pub mod run_result;

// 重新匯出常用模型類型
pub use market_history::{BarRow, VolumeRank};
pub use run_result::RunResult;
