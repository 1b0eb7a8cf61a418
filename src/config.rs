use crate::error::AppError;
use crate::market::binance::{BINANCE_REST_BASE_URL, BINANCE_STREAM_BASE_URL};
use crate::market::controller::{FeedSettings, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RECONNECT_DELAY_MS};
use crate::market::types::{normalize_symbol, MarketTimeframe, DEFAULT_SYMBOL, DEFAULT_TIMEFRAME};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DASHBOARD_API_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_DB_FILENAME: &str = "app.db";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub dashboard_api_url: String,
    pub exchange_rest_url: String,
    pub exchange_stream_url: String,
    pub data_dir: PathBuf,
    pub db_filename: String,
    pub default_symbol: String,
    pub default_timeframe: MarketTimeframe,
    pub reconnect_delay_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dashboard_api_url: DEFAULT_DASHBOARD_API_URL.to_string(),
            exchange_rest_url: BINANCE_REST_BASE_URL.to_string(),
            exchange_stream_url: BINANCE_STREAM_BASE_URL.to_string(),
            data_dir: PathBuf::from("."),
            db_filename: DEFAULT_DB_FILENAME.to_string(),
            default_symbol: DEFAULT_SYMBOL.to_string(),
            default_timeframe: DEFAULT_TIMEFRAME,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_millis(key: &str, value: &str) -> Result<u64, AppError> {
    let millis: u64 = value
        .parse()
        .map_err(|_| AppError::Config(format!("{key} must be a whole number of milliseconds")))?;
    if millis == 0 {
        return Err(AppError::Config(format!("{key} must be greater than zero")));
    }
    Ok(millis)
}

fn parse_url(key: &str, value: String) -> Result<String, AppError> {
    let valid_scheme = ["http://", "https://", "ws://", "wss://"]
        .iter()
        .any(|scheme| value.starts_with(scheme));
    if !valid_scheme {
        return Err(AppError::Config(format!("{key} is not a valid url: {value}")));
    }
    Ok(value.trim_end_matches('/').to_string())
}

impl Config {
    /// Reads the process environment. `.env` is expected to be loaded already.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| non_empty(lookup(key));

        if let Some(value) = get("DASHBOARD_API_URL") {
            config.dashboard_api_url = parse_url("DASHBOARD_API_URL", value)?;
        }
        if let Some(value) = get("EXCHANGE_REST_URL") {
            config.exchange_rest_url = parse_url("EXCHANGE_REST_URL", value)?;
        }
        if let Some(value) = get("EXCHANGE_STREAM_URL") {
            config.exchange_stream_url = parse_url("EXCHANGE_STREAM_URL", value)?;
        }
        if let Some(value) = get("APP_DATA_DIR") {
            config.data_dir = PathBuf::from(value);
        }
        if let Some(value) = get("APP_DB_FILENAME") {
            config.db_filename = value;
        }
        if let Some(value) = get("DEFAULT_SYMBOL") {
            config.default_symbol = normalize_symbol(&value)
                .map_err(|error| AppError::Config(format!("DEFAULT_SYMBOL: {error}")))?;
        }
        if let Some(value) = get("DEFAULT_TIMEFRAME") {
            config.default_timeframe = MarketTimeframe::parse_str(&value)
                .map_err(|error| AppError::Config(format!("DEFAULT_TIMEFRAME: {error}")))?;
        }
        if let Some(value) = get("RECONNECT_DELAY_MS") {
            config.reconnect_delay_ms = parse_millis("RECONNECT_DELAY_MS", &value)?;
        }
        if let Some(value) = get("FALLBACK_POLL_INTERVAL_MS") {
            config.poll_interval_ms = parse_millis("FALLBACK_POLL_INTERVAL_MS", &value)?;
        }

        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_filename)
    }

    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, AppError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).expect("defaults are valid");
        assert_eq!(config, Config::default());
        assert_eq!(config.db_path(), PathBuf::from("./app.db"));
        assert_eq!(config.feed_settings(), FeedSettings::default());
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("DASHBOARD_API_URL", "https://desk.example.com/"),
            ("DEFAULT_SYMBOL", " ethusdt "),
            ("DEFAULT_TIMEFRAME", "4h"),
            ("RECONNECT_DELAY_MS", "1500"),
            ("APP_DATA_DIR", "/tmp/desk"),
            ("APP_DB_FILENAME", "   "),
        ])
        .expect("overrides are valid");

        assert_eq!(config.dashboard_api_url, "https://desk.example.com");
        assert_eq!(config.default_symbol, "ETHUSDT");
        assert_eq!(config.default_timeframe, MarketTimeframe::H4);
        assert_eq!(config.reconnect_delay_ms, 1500);
        assert_eq!(config.db_path(), PathBuf::from("/tmp/desk/app.db"));
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for pairs in [
            [("RECONNECT_DELAY_MS", "soon")],
            [("FALLBACK_POLL_INTERVAL_MS", "0")],
            [("DEFAULT_TIMEFRAME", "7m")],
            [("DASHBOARD_API_URL", "localhost:5000")],
        ] {
            let error = config_from(&pairs).expect_err("value must be rejected");
            assert!(matches!(error, AppError::Config(_)), "{error}");
        }
    }
}
