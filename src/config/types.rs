use crate::config::validation::{ValidationError, ValidationUtils, Validator};
use crate::utils::serde_helpers::empty_string_as_none;
use serde::{Deserialize, Serialize};

/// 應用程序配置結構
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    /// 運行的隨機種子，由訓練包生成時寫入
    #[serde(default)]
    pub random_seed: u64,
}

impl Validator for ApplicationConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.log.validate()?;
        self.provider.validate()?;
        self.input.validate()?;
        self.training.validate()?;
        self.backtest.validate()?;
        self.pool.validate()?;

        // 線上模式必須有行情來源地址
        ValidationUtils::check_dependency(
            self.input.online,
            !self.provider.base_url.trim().is_empty(),
            "input.online",
            "provider.base_url",
        )?;

        Ok(())
    }
}

/// 數據庫配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime_secs: u64,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "portfolio_lab".to_string(),
            max_connections: 10,
            min_connections: 1,
            max_lifetime_secs: 1800,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}

impl Validator for DatabaseConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::not_empty(&self.host, "database.host")?;
        ValidationUtils::not_empty(&self.username, "database.username")?;
        ValidationUtils::not_empty(&self.database, "database.database")?;
        ValidationUtils::in_range(self.port, 1, 65535, "database.port")?;
        ValidationUtils::in_range(
            self.max_connections,
            self.min_connections,
            1000,
            "database.max_connections",
        )?;

        Ok(())
    }
}

impl DatabaseConfig {
    /// 連接字串
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }

    pub fn max_lifetime(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.max_lifetime_secs)
    }

    pub fn acquire_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.idle_timeout_secs)
    }
}

/// 日誌配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
    /// 設定時額外按日輪替寫入此目錄
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub directory: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            directory: None,
        }
    }
}

impl Validator for LogConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::one_of(
            &self.level.to_lowercase().as_str(),
            &["trace", "debug", "info", "warn", "error"],
            "log.level",
        )?;
        ValidationUtils::one_of(&self.format.to_lowercase().as_str(), &["pretty", "json"], "log.format")?;

        Ok(())
    }
}

/// 行情來源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    /// 計價貨幣，所有交易對都以此報價
    pub base_currency: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://poloniex.com/public".to_string(),
            base_currency: "BTC".to_string(),
            request_timeout_secs: 30,
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

impl Validator for ProviderConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::not_empty(&self.base_currency, "provider.base_currency")?;
        ValidationUtils::in_range(self.request_timeout_secs, 1, 600, "provider.request_timeout_secs")?;
        ValidationUtils::in_range(self.max_retries, 0, 10, "provider.max_retries")?;

        Ok(())
    }
}

/// 輸入數據配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// 數據起始日期，格式 YYYY/MM/DD
    pub start_date: String,
    pub end_date: String,
    /// 張量的時間粒度（秒）
    pub global_period: i64,
    /// 選取的資產數量
    pub coin_number: usize,
    pub window_size: usize,
    pub feature_number: usize,
    pub test_portion: f64,
    pub portion_reversed: bool,
    /// 是否允許向行情來源補齊數據
    pub online: bool,
    pub is_permed: bool,
    pub volume_average_days: i64,
    /// 價格低於此值的資產視為塵埃並排除
    pub dust_threshold: f64,
    /// PVM 是否包含現金欄
    pub include_cash: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            start_date: "2016/05/01".to_string(),
            end_date: "2017/04/27".to_string(),
            global_period: 1800,
            coin_number: 11,
            window_size: 31,
            feature_number: 3,
            test_portion: 0.08,
            portion_reversed: false,
            online: true,
            is_permed: false,
            volume_average_days: 30,
            dust_threshold: 2e-6,
            include_cash: true,
        }
    }
}

impl Validator for InputConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let start = ValidationUtils::parse_date(&self.start_date, "input.start_date")?;
        let end = ValidationUtils::parse_date(&self.end_date, "input.end_date")?;
        if end <= start {
            return Err(ValidationError::InvalidValue(format!(
                "input.end_date ({}) 必須晚於 input.start_date ({})",
                self.end_date, self.start_date
            )));
        }

        ValidationUtils::one_of(
            &self.global_period,
            &crate::domain_types::period::SUPPORTED_PERIODS,
            "input.global_period",
        )?;
        ValidationUtils::in_range(self.coin_number, 1, 200, "input.coin_number")?;
        ValidationUtils::in_range(self.window_size, 2, 1000, "input.window_size")?;
        ValidationUtils::in_range(self.feature_number, 1, 4, "input.feature_number")?;
        ValidationUtils::fraction(self.test_portion, "input.test_portion")?;
        ValidationUtils::in_range(self.volume_average_days, 1, 365, "input.volume_average_days")?;

        if !(self.dust_threshold >= 0.0) {
            return Err(ValidationError::InvalidValue(
                "input.dust_threshold 不可為負數".to_string(),
            ));
        }

        Ok(())
    }
}

impl InputConfig {
    pub fn start_timestamp(&self) -> Result<i64, ValidationError> {
        ValidationUtils::parse_date(&self.start_date, "input.start_date")
    }

    pub fn end_timestamp(&self) -> Result<i64, ValidationError> {
        ValidationUtils::parse_date(&self.end_date, "input.end_date")
    }
}

/// 訓練配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub steps: usize,
    pub batch_size: usize,
    /// 回放緩衝區的幾何偏置，0 只取最新，1 為均勻
    pub buffer_biased: f64,
    /// 只保留測試集表現最好的一次
    pub snap_shot: bool,
    /// 跳過訓練集評估
    pub fast_train: bool,
    pub log_interval: usize,
    /// 決策代理：eg（指數梯度）或任一基準策略
    pub agent_name: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            steps: 80_000,
            batch_size: 109,
            buffer_biased: 0.99995,
            snap_shot: false,
            fast_train: true,
            log_interval: 1000,
            agent_name: "eg".to_string(),
        }
    }
}

impl Validator for TrainingConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::in_range(self.batch_size, 1, 100_000, "training.batch_size")?;
        ValidationUtils::in_range(self.buffer_biased, 0.0, 1.0, "training.buffer_biased")?;
        ValidationUtils::in_range(self.log_interval, 1, usize::MAX, "training.log_interval")?;
        ValidationUtils::not_empty(&self.agent_name, "training.agent_name")?;
        ValidationUtils::one_of(
            &self.agent_name.to_lowercase().as_str(),
            &["eg", "ucrp", "ubah", "best"],
            "training.agent_name",
        )?;

        Ok(())
    }
}

/// 回測配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// 單邊交易成本率
    pub trading_consumption: f64,
    /// 單步組合價值增長因子的下限
    pub pv_floor: f64,
    pub policy: String,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            trading_consumption: 0.0025,
            pv_floor: 1e-8,
            policy: "ucrp".to_string(),
        }
    }
}

impl Validator for BacktestConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::in_range(self.trading_consumption, 0.0, 0.5, "backtest.trading_consumption")?;
        ValidationUtils::in_range(self.pv_floor, 0.0, 1.0, "backtest.pv_floor")?;
        ValidationUtils::one_of(
            &self.policy.to_lowercase().as_str(),
            &["ucrp", "ubah", "best"],
            "backtest.policy",
        )?;

        Ok(())
    }
}

/// 並行運行池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// 同時執行的運行數，0 代表使用 CPU 核心數
    pub max_concurrency: usize,
    /// 結果匯總 CSV 路徑
    pub summary_path: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 0,
            summary_path: "train_package/train_summary.csv".to_string(),
        }
    }
}

impl Validator for PoolConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::in_range(self.max_concurrency, 0, 256, "pool.max_concurrency")?;
        ValidationUtils::not_empty(&self.summary_path, "pool.summary_path")?;

        Ok(())
    }
}

impl PoolConfig {
    /// 實際生效的並行數
    pub fn effective_concurrency(&self) -> usize {
        if self.max_concurrency == 0 {
            num_cpus::get().max(1)
        } else {
            self.max_concurrency
        }
    }
}
