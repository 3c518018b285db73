//! 錯誤類型定義
//!
//! 數據獲取類錯誤（行情來源、存儲）會中止當前的 `ensure_range` / `build`，
//! 並向上傳遞至任務調度器；採樣與窗口錯誤屬於程式錯誤，一律立即失敗。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 歷史數據存取錯誤
#[derive(Error, Debug)]
pub enum DataError {
    /// 行情來源請求失敗（重試已在適配器內完成）
    #[error("行情來源不可用: {0}")]
    ProviderUnavailable(String),

    /// 寫入存儲失敗，整個 ensure_range 調用中止
    #[error("寫入歷史數據失敗: {0}")]
    StoreWriteFailed(String),

    /// 讀取存儲失敗
    #[error("讀取歷史數據失敗: {0}")]
    StoreReadFailed(String),

    /// 不支援的數據週期
    #[error("不支援的數據週期: {0} 秒，僅支援 5分鐘、15分鐘、30分鐘、2小時、4小時或1天")]
    UnsupportedPeriod(i64),

    /// 行情來源沒有此資產的交易對
    #[error("找不到資產對應的交易對: {0}")]
    UnknownAsset(String),
}

/// 資產篩選錯誤
#[derive(Error, Debug)]
pub enum SelectionError {
    /// 合格資產數量不足，下游張量寬度固定，不能返回較短的列表
    #[error("合格資產數量不足: 需要 {requested} 個，只有 {available} 個")]
    InsufficientAssets { requested: usize, available: usize },

    #[error(transparent)]
    Data(#[from] DataError),
}

/// 窗口切片錯誤
#[derive(Error, Debug, PartialEq)]
pub enum WindowError {
    /// 窗口超出張量的時間軸
    #[error("窗口越界: 索引 {index} + 窗口 {window_size} 超出 {num_periods} 個週期")]
    OutOfBounds {
        index: usize,
        window_size: usize,
        num_periods: usize,
    },

    /// 提交的權重形狀與 PVM 不一致
    #[error("權重形狀不符: 期望 {expected:?}，實際 {actual:?}")]
    WeightShape {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// 劃分後的訓練或測試區間為空
    #[error("數據劃分無效: {0}")]
    InvalidPartition(String),
}

/// 經驗回放緩衝區錯誤
#[derive(Error, Debug, PartialEq)]
pub enum BufferError {
    #[error("回放區間為空: start_index={start_index}, end_index={end_index}")]
    EmptyRange { start_index: usize, end_index: usize },

    #[error("批次大小 {batch_size} 超過可用經驗數 {available}")]
    BatchTooLarge { batch_size: usize, available: usize },
}

/// 決策代理錯誤
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("決策失敗: {0}")]
    Failed(String),

    #[error("權重維度不符: 期望 {expected}，實際 {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
}

/// 回測錯誤
#[derive(Error, Debug)]
pub enum BacktestError {
    #[error(transparent)]
    Window(#[from] WindowError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("測試區間為空")]
    EmptyTestRange,

    #[error("步驟 {step} 的權重無效: {reason}")]
    InvalidWeights { step: usize, reason: String },
}

/// 單次運行的錯誤匯總
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Backtest(#[from] BacktestError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// 配置與解析出的數據不一致，由調用者修正參數
    #[error("配置不一致: {0}")]
    ConfigMismatch(String),

    #[error("結果保存失敗: {0}")]
    ResultStore(String),
}

/// 失敗運行回報的錯誤種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "PROVIDER_UNAVAILABLE")]
    ProviderUnavailable,
    #[serde(rename = "STORE_WRITE_FAILED")]
    StoreWriteFailed,
    #[serde(rename = "STORE_READ_FAILED")]
    StoreReadFailed,
    #[serde(rename = "INSUFFICIENT_ASSETS")]
    InsufficientAssets,
    #[serde(rename = "EMPTY_BUFFER_RANGE")]
    EmptyBufferRange,
    #[serde(rename = "WINDOW_OUT_OF_BOUNDS")]
    WindowOutOfBounds,
    #[serde(rename = "CONFIG_MISMATCH")]
    ConfigMismatch,
    #[serde(rename = "POLICY_FAILED")]
    PolicyFailed,
    #[serde(rename = "RESULT_STORE_FAILED")]
    ResultStoreFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            ErrorKind::StoreWriteFailed => "STORE_WRITE_FAILED",
            ErrorKind::StoreReadFailed => "STORE_READ_FAILED",
            ErrorKind::InsufficientAssets => "INSUFFICIENT_ASSETS",
            ErrorKind::EmptyBufferRange => "EMPTY_BUFFER_RANGE",
            ErrorKind::WindowOutOfBounds => "WINDOW_OUT_OF_BOUNDS",
            ErrorKind::ConfigMismatch => "CONFIG_MISMATCH",
            ErrorKind::PolicyFailed => "POLICY_FAILED",
            ErrorKind::ResultStoreFailed => "RESULT_STORE_FAILED",
        }
    }
}

impl DataError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataError::ProviderUnavailable(_) | DataError::UnknownAsset(_) => {
                ErrorKind::ProviderUnavailable
            }
            DataError::StoreWriteFailed(_) => ErrorKind::StoreWriteFailed,
            DataError::StoreReadFailed(_) => ErrorKind::StoreReadFailed,
            DataError::UnsupportedPeriod(_) => ErrorKind::ConfigMismatch,
        }
    }
}

impl PipelineError {
    /// 轉換為結構化的錯誤種類
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Data(e) => e.kind(),
            PipelineError::Selection(SelectionError::InsufficientAssets { .. }) => {
                ErrorKind::InsufficientAssets
            }
            PipelineError::Selection(SelectionError::Data(e)) => e.kind(),
            PipelineError::Window(WindowError::OutOfBounds { .. }) => ErrorKind::WindowOutOfBounds,
            PipelineError::Window(_) => ErrorKind::ConfigMismatch,
            PipelineError::Buffer(BufferError::EmptyRange { .. }) => ErrorKind::EmptyBufferRange,
            // 批次大小來自配置
            PipelineError::Buffer(BufferError::BatchTooLarge { .. }) => ErrorKind::ConfigMismatch,
            PipelineError::Backtest(BacktestError::Window(WindowError::OutOfBounds { .. })) => {
                ErrorKind::WindowOutOfBounds
            }
            PipelineError::Backtest(BacktestError::EmptyTestRange) => ErrorKind::ConfigMismatch,
            PipelineError::Backtest(_) | PipelineError::Policy(_) => ErrorKind::PolicyFailed,
            PipelineError::ConfigMismatch(_) => ErrorKind::ConfigMismatch,
            PipelineError::ResultStore(_) => ErrorKind::ResultStoreFailed,
        }
    }
}

/// 運行結果類型別名
pub type PipelineResult<T> = Result<T, PipelineError>;
