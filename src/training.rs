//! 訓練運行模組
//!
//! 包含決策代理介面、單次運行會話、運行事件、訓練包生成、
//! 有並行上限的運行池以及結果匯總。

pub mod agent;
pub mod events;
pub mod packages;
pub mod pool;
pub mod session;
pub mod summary;

pub use agent::{agent_from_name, Agent, StaticAgent};
pub use events::{EventSink, RunEvent, RunStatus};
pub use packages::{add_packages, clear_packages, generate_variants, load_packages, TrainingPackage};
pub use pool::RunPool;
pub use session::{execute, new_session, RunContext, SessionOutcome, TestEvaluation, TrainingSession};
pub use summary::{build_result, SummaryWriter};
