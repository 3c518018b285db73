use std::path::Path;

use assert_matches::assert_matches;
use portfolio_lab::config::{ApplicationConfig, ConfigLoader, Environment, ValidationError, Validator};
use rstest::rstest;

fn shipped(env: Environment) -> ApplicationConfig {
    ConfigLoader::load_from(Path::new("config"), env)
        .unwrap()
        .try_deserialize()
        .unwrap()
}

#[rstest]
#[case::development(Environment::Development)]
#[case::production(Environment::Production)]
fn test_shipped_configs_are_valid(#[case] env: Environment) {
    let config = shipped(env);
    assert!(config.validate().is_ok());
    assert_eq!(config.provider.base_currency, "BTC");
    assert!(config.input.window_size >= 2);
}

#[test]
fn test_production_logs_to_files() {
    let config = shipped(Environment::Production);
    assert_eq!(config.log.format, "json");
    assert!(config.log.directory.is_some());
}

#[test]
fn test_default_config_is_valid() {
    assert!(ApplicationConfig::default().validate().is_ok());
}

#[test]
fn test_reversed_dates_are_rejected() {
    let mut config = ApplicationConfig::default();
    config.input.start_date = "2017/04/27".to_string();
    config.input.end_date = "2016/05/01".to_string();
    assert_matches!(config.validate(), Err(ValidationError::InvalidValue(_)));
}

#[test]
fn test_malformed_date_is_rejected() {
    let mut config = ApplicationConfig::default();
    config.input.start_date = "2017-01-01".to_string();
    assert_matches!(config.validate(), Err(ValidationError::DateFormat { .. }));
}

#[rstest]
#[case::test_portion(|c: &mut ApplicationConfig| c.input.test_portion = 1.5)]
#[case::window_size(|c: &mut ApplicationConfig| c.input.window_size = 1)]
#[case::buffer_bias(|c: &mut ApplicationConfig| c.training.buffer_biased = 1.2)]
#[case::fee(|c: &mut ApplicationConfig| c.backtest.trading_consumption = 0.9)]
#[case::agent(|c: &mut ApplicationConfig| c.training.agent_name = "lstm".to_string())]
fn test_out_of_range_values_are_rejected(#[case] mutate: fn(&mut ApplicationConfig)) {
    let mut config = ApplicationConfig::default();
    mutate(&mut config);
    assert!(config.validate().is_err());
}

#[test]
fn test_package_config_round_trips_through_json() {
    let mut config = ApplicationConfig::default();
    config.random_seed = 7;
    config.log.directory = None;

    let json = serde_json::to_string(&config).unwrap();
    let restored: ApplicationConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.random_seed, 7);
    assert!(restored.log.directory.is_none());
    assert_eq!(restored.input.coin_number, config.input.coin_number);
}
