use crate::config::loader::{ConfigLoader, Environment};
use crate::config::types::ApplicationConfig;
use crate::config::validation::Validator;
use config::ConfigError;
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

// 全局配置實例
static CONFIG: OnceCell<ApplicationConfig> = OnceCell::new();

/// 獲取應用程序配置實例，未初始化時返回 None
pub fn get_config() -> Option<&'static ApplicationConfig> {
    CONFIG.get()
}

/// 初始化配置（在應用程序啟動時調用）
pub fn init_config() -> Result<&'static ApplicationConfig, ConfigError> {
    CONFIG.get_or_try_init(|| {
        let config = ApplicationConfig::load_from_env()?;
        debug!("配置初始化成功，環境：{:?}", Environment::from_env());
        Ok(config)
    })
}

impl ApplicationConfig {
    /// 從環境變數指定的環境加載配置
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let env = Environment::from_env();
        debug!("從環境加載配置: {:?}", env);
        Self::load(env)
    }

    /// 從指定環境加載配置
    pub fn load(env: Environment) -> Result<Self, ConfigError> {
        let config_source = ConfigLoader::load(env)?;
        let app_config: ApplicationConfig = config_source.try_deserialize()?;

        // 驗證失敗直接拒絕，錯誤的配置不會自動修正
        if let Err(err) = app_config.validate() {
            warn!("配置驗證失敗: {}", err);
            return Err(ConfigError::Message(err.to_string()));
        }
        debug!("配置驗證通過");

        Ok(app_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_config_before_init() {
        // 單元測試不初始化全局配置
        if let Some(config) = get_config() {
            assert!(config.validate().is_ok());
        }
    }
}
