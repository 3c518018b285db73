use config::{Config, ConfigError, Environment as ConfigEnvironment, File};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// 環境變數前綴，例如 `PORTFOLIO__INPUT__COIN_NUMBER=5`
pub const ENV_PREFIX: &str = "PORTFOLIO";

/// 環境類型枚舉
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// 從環境變數取得當前環境設定
    pub fn from_env() -> Self {
        Self::parse(&env::var("PORTFOLIO_ENV").unwrap_or_else(|_| "development".into()))
    }

    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    /// 轉換為配置文件名
    pub fn as_filename(&self) -> &'static str {
        match self {
            Environment::Development => "development.toml",
            Environment::Production => "production.toml",
        }
    }
}

/// 配置加載器，負責根據環境加載適當的配置
pub struct ConfigLoader;

impl ConfigLoader {
    /// 配置目錄，預設為 `config`
    pub fn config_dir() -> PathBuf {
        PathBuf::from(env::var("CONFIG_DIR").unwrap_or_else(|_| "config".into()))
    }

    /// 載入指定環境的配置
    pub fn load(env: Environment) -> Result<Config, ConfigError> {
        Self::load_from(&Self::config_dir(), env)
    }

    /// 從指定目錄載入配置，文件不存在時只使用環境變數與預設值
    pub fn load_from(dir: &Path, env: Environment) -> Result<Config, ConfigError> {
        let config_path = dir.join(env.as_filename());

        Config::builder()
            .add_source(File::from(config_path).required(false))
            // 環境變數優先級高於文件配置
            .add_source(
                ConfigEnvironment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
    }

    /// 載入當前環境的配置
    pub fn load_current() -> Result<Config, ConfigError> {
        Self::load(Environment::from_env())
    }
}

/// 配置獲取輔助特性
pub trait ConfigExt {
    /// 從配置中獲取並反序列化指定部分
    fn get_section<'a, T: Deserialize<'a>>(&'a self, section: &str) -> Result<T, ConfigError>;
}

impl ConfigExt for Config {
    fn get_section<'a, T: Deserialize<'a>>(&'a self, section: &str) -> Result<T, ConfigError> {
        self.get(section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::InputConfig;
    use std::io::Write;

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("production"), Environment::Production);
        assert_eq!(Environment::parse("PROD"), Environment::Production);
        assert_eq!(Environment::parse("development"), Environment::Development);
        assert_eq!(Environment::parse("anything"), Environment::Development);
    }

    #[test]
    fn test_environment_as_filename() {
        assert_eq!(Environment::Development.as_filename(), "development.toml");
        assert_eq!(Environment::Production.as_filename(), "production.toml");
    }

    #[test]
    fn test_load_section_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("development.toml")).unwrap();
        writeln!(
            file,
            r#"
[input]
start_date = "2018/01/01"
end_date = "2018/03/01"
global_period = 1800
coin_number = 5
window_size = 31
feature_number = 3
test_portion = 0.1
portion_reversed = false
online = false
is_permed = false
volume_average_days = 30
dust_threshold = 0.000002
include_cash = true
"#
        )
        .unwrap();

        let config = ConfigLoader::load_from(dir.path(), Environment::Development).unwrap();
        let input: InputConfig = config.get_section("input").unwrap();
        assert_eq!(input.coin_number, 5);
        assert_eq!(input.global_period, 1800);
        assert!(!input.online);
    }
}
