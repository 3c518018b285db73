// utils.rs - 公共工具模組
//
// 提供時間轉換與序列化輔助函數。

pub mod serde_helpers;
pub mod time_utils;

// 重新導出時間工具函數，使其可以通過 utils::function_name 直接訪問
pub use time_utils::{current_timestamp, format_timestamp, result_key, timestamp_to_datetime};
