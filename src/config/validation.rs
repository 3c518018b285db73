use chrono::NaiveDate;
use thiserror::Error;

/// 配置中日期字串的格式，例如 `2018/01/01`
pub const DATE_FORMAT: &str = "%Y/%m/%d";

/// 配置驗證錯誤
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("缺少必要配置項: {0}")]
    MissingField(String),

    #[error("無效的配置值: {0}")]
    InvalidValue(String),

    #[error("配置範圍錯誤: {field} 的值 {value} 不在範圍 {min}..{max} 內")]
    RangeError {
        field: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("依賴錯誤: {dependent} 依賴於 {dependency} 的配置")]
    DependencyError {
        dependent: String,
        dependency: String,
    },

    #[error("日期格式錯誤: {field} 的值 {value} 不符合 YYYY/MM/DD")]
    DateFormat { field: String, value: String },
}

/// 配置驗證器trait
pub trait Validator {
    /// 驗證配置
    fn validate(&self) -> Result<(), ValidationError>;
}

/// 驗證工具函數
pub struct ValidationUtils;

impl ValidationUtils {
    /// 驗證配置值是否在指定範圍內（閉區間）
    pub fn in_range<T>(value: T, min: T, max: T, field_name: &str) -> Result<(), ValidationError>
    where
        T: PartialOrd + ToString,
    {
        if value < min || value > max {
            return Err(ValidationError::RangeError {
                field: field_name.to_string(),
                value: value.to_string(),
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        Ok(())
    }

    /// 驗證比例值位於開區間 (0, 1)
    pub fn fraction(value: f64, field_name: &str) -> Result<(), ValidationError> {
        if !(value > 0.0 && value < 1.0) {
            return Err(ValidationError::RangeError {
                field: field_name.to_string(),
                value: value.to_string(),
                min: "0 (不含)".to_string(),
                max: "1 (不含)".to_string(),
            });
        }
        Ok(())
    }

    /// 驗證一個選項是否為某些值中的一個
    pub fn one_of<T>(value: &T, options: &[T], field_name: &str) -> Result<(), ValidationError>
    where
        T: PartialEq + ToString,
    {
        if !options.contains(value) {
            return Err(ValidationError::InvalidValue(format!(
                "{} 的值 {} 不是有效選項: {:?}",
                field_name,
                value.to_string(),
                options.iter().map(ToString::to_string).collect::<Vec<_>>()
            )));
        }
        Ok(())
    }

    /// 檢查必要的字串欄位是否有值
    pub fn not_empty(value: &str, field_name: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::MissingField(field_name.to_string()));
        }
        Ok(())
    }

    /// 檢查兩個欄位的依賴關係
    pub fn check_dependency(
        has_dependent: bool,
        has_dependency: bool,
        dependent_name: &str,
        dependency_name: &str,
    ) -> Result<(), ValidationError> {
        if has_dependent && !has_dependency {
            return Err(ValidationError::DependencyError {
                dependent: dependent_name.to_string(),
                dependency: dependency_name.to_string(),
            });
        }
        Ok(())
    }

    /// 解析 `YYYY/MM/DD` 日期為當日 00:00 UTC 的 Unix 秒數
    pub fn parse_date(value: &str, field_name: &str) -> Result<i64, ValidationError> {
        NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc().timestamp())
            .ok_or_else(|| ValidationError::DateFormat {
                field: field_name.to_string(),
                value: value.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_in_range() {
        assert!(ValidationUtils::in_range(50, 2, 500, "input.window_size").is_ok());

        let err = ValidationUtils::in_range(1, 2, 500, "input.window_size").unwrap_err();
        match err {
            ValidationError::RangeError { field, value, min, max } => {
                assert_eq!(field, "input.window_size");
                assert_eq!(value, "1");
                assert_eq!(min, "2");
                assert_eq!(max, "500");
            }
            _ => panic!("Expected RangeError"),
        }
    }

    #[test]
    fn test_fraction() {
        assert!(ValidationUtils::fraction(0.08, "input.test_portion").is_ok());
        assert!(ValidationUtils::fraction(0.0, "input.test_portion").is_err());
        assert!(ValidationUtils::fraction(1.0, "input.test_portion").is_err());
        assert!(ValidationUtils::fraction(f64::NAN, "input.test_portion").is_err());
    }

    #[test]
    fn test_one_of() {
        assert!(ValidationUtils::one_of(&"ucrp", &["ucrp", "ubah", "best"], "backtest.policy").is_ok());
        assert!(ValidationUtils::one_of(&"olmar", &["ucrp", "ubah", "best"], "backtest.policy").is_err());
    }

    #[test]
    fn test_not_empty() {
        assert!(ValidationUtils::not_empty("BTC", "provider.base_currency").is_ok());
        assert!(ValidationUtils::not_empty("", "provider.base_currency").is_err());
        assert!(ValidationUtils::not_empty("   ", "provider.base_currency").is_err());
    }

    #[test]
    fn test_check_dependency() {
        assert!(ValidationUtils::check_dependency(true, true, "input.online", "provider.base_url").is_ok());
        assert!(ValidationUtils::check_dependency(false, false, "input.online", "provider.base_url").is_ok());
        assert!(ValidationUtils::check_dependency(true, false, "input.online", "provider.base_url").is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(ValidationUtils::parse_date("2017/01/01", "input.start_date").unwrap(), 1_483_228_800);
        assert_matches!(
            ValidationUtils::parse_date("2017-01-01", "input.start_date"),
            Err(ValidationError::DateFormat { .. })
        );
    }
}
