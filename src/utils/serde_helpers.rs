// utils/serde_helpers.rs - 序列化與反序列化輔助函數
use serde::{Deserialize, Deserializer};

/// 將空字符串反序列化為None
///
/// 環境變數無法表達「未設定」，以空字符串代替。
///
/// ```
/// use serde::Deserialize;
/// use portfolio_lab::utils::serde_helpers::empty_string_as_none;
///
/// #[derive(Deserialize)]
/// struct Section {
///     #[serde(default, deserialize_with = "empty_string_as_none")]
///     directory: Option<String>,
/// }
///
/// let section: Section = serde_json::from_str(r#"{"directory": ""}"#).unwrap();
/// assert!(section.directory.is_none());
/// ```
pub fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Section {
        #[serde(default, deserialize_with = "empty_string_as_none")]
        directory: Option<String>,
    }

    #[test]
    fn test_empty_and_null_become_none() {
        let parse = |json: &str| serde_json::from_str::<Section>(json).unwrap().directory;
        assert_eq!(parse(r#"{"directory": ""}"#), None);
        assert_eq!(parse(r#"{"directory": null}"#), None);
        assert_eq!(parse(r#"{}"#), None);
        assert_eq!(parse(r#"{"directory": "logs"}"#), Some("logs".to_string()));
    }
}
