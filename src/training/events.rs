//! 運行事件通道
//!
//! 運行任務只發送結構化事件，由外部的收集者訂閱，不依賴全局日誌處理器。

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::ErrorKind;

/// 單次運行的狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// 運行過程中的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        package_index: usize,
    },
    Progress {
        package_index: usize,
        step: usize,
        test_pv: f64,
        test_log_mean: f64,
    },
    Completed {
        package_index: usize,
        key: String,
        test_pv: f64,
        backtest_test_pv: f64,
    },
    Failed {
        package_index: usize,
        kind: ErrorKind,
        message: String,
    },
}

impl RunEvent {
    pub fn package_index(&self) -> usize {
        match self {
            RunEvent::Started { package_index }
            | RunEvent::Progress { package_index, .. }
            | RunEvent::Completed { package_index, .. }
            | RunEvent::Failed { package_index, .. } => *package_index,
        }
    }

    pub fn status(&self) -> RunStatus {
        match self {
            RunEvent::Started { .. } | RunEvent::Progress { .. } => RunStatus::Running,
            RunEvent::Completed { .. } => RunStatus::Completed,
            RunEvent::Failed { .. } => RunStatus::Failed,
        }
    }
}

/// 事件發送端，沒有訂閱者時事件被丟棄
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender: Some(sender) }, receiver)
    }

    /// 不訂閱事件
    pub fn discard() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: RunEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                warn!("事件接收端已關閉");
            }
        }
    }
}
