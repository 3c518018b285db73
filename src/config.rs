/// 配置管理模組
///
/// 本模組負責加載、驗證和管理系統配置。
/// 配置分為數據庫、日誌、行情來源、輸入數據、訓練、回測與並行運行池幾個區段。
pub mod loader;
pub mod manager;
pub mod types;
pub mod validation;

// 重新導出常用組件
pub use loader::{ConfigExt, ConfigLoader, Environment};
pub use manager::{get_config, init_config};
pub use types::*;
pub use validation::{ValidationError, ValidationUtils, Validator};

#[cfg(test)]
mod tests {
    #[test]
    fn test_module_exports() {
        let _ = super::Environment::Development;
        let _ = super::ValidationUtils::not_empty("test", "field");

        fn _ensure_config_works(cfg: &super::ApplicationConfig) {
            let _ = &cfg.database;
            let _ = &cfg.input;
            let _ = &cfg.training;
            let _ = &cfg.backtest;
        }
    }
}
