use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::forecast::retry::RetryConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub api_key: String,
    pub bot_token: Option<String>,
    pub openweather_base_url: String,
    pub openweather_geocode_direct_path: String,
    pub openweather_weather_path: String,
    pub openweather_forecast_path: String,
    pub openweather_air_pollution_path: String,
    pub openweather_lang: String,
    pub geocode_limit: u32,
    pub data_dir: PathBuf,
    pub api_cache_dir: PathBuf,
    pub retry_max_attempts: u32,
    pub retry_initial_backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub notify_interval_hours: u64,
    pub telegram_base_url: String,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = env::var("API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("API_KEY not set"))?;

        let defaults = Self::new(api_key, "https://api.openweathermap.org");

        Ok(Config {
            bot_token: env::var("BOT_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            openweather_base_url: env::var("OPENWEATHER_BASE_URL")
                .unwrap_or(defaults.openweather_base_url),
            openweather_geocode_direct_path: env::var("OPENWEATHER_GEOCODE_DIRECT_PATH")
                .unwrap_or(defaults.openweather_geocode_direct_path),
            openweather_weather_path: env::var("OPENWEATHER_WEATHER_PATH")
                .unwrap_or(defaults.openweather_weather_path),
            openweather_forecast_path: env::var("OPENWEATHER_FORECAST_PATH")
                .unwrap_or(defaults.openweather_forecast_path),
            openweather_air_pollution_path: env::var("OPENWEATHER_AIR_POLLUTION_PATH")
                .unwrap_or(defaults.openweather_air_pollution_path),
            openweather_lang: env::var("OPENWEATHER_LANG").unwrap_or(defaults.openweather_lang),
            geocode_limit: parse_var("GEOCODE_LIMIT", defaults.geocode_limit)?,
            data_dir: env::var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            api_cache_dir: env::var("API_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.api_cache_dir),
            retry_max_attempts: parse_var("RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts)?,
            retry_initial_backoff_ms: parse_var(
                "RETRY_INITIAL_BACKOFF_MS",
                defaults.retry_initial_backoff_ms,
            )?,
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            notify_interval_hours: parse_var("NOTIFY_INTERVAL_HOURS", defaults.notify_interval_hours)?,
            telegram_base_url: env::var("TELEGRAM_BASE_URL").unwrap_or(defaults.telegram_base_url),
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            api_key: defaults.api_key,
        })
    }

    /// Defaults for everything except the credential and provider host.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Config {
            api_key: api_key.into(),
            bot_token: None,
            openweather_base_url: base_url.into(),
            openweather_geocode_direct_path: "/geo/1.0/direct".to_string(),
            openweather_weather_path: "/data/2.5/weather".to_string(),
            openweather_forecast_path: "/data/2.5/forecast".to_string(),
            openweather_air_pollution_path: "/data/2.5/air_pollution".to_string(),
            openweather_lang: "ru".to_string(),
            geocode_limit: 3,
            data_dir: PathBuf::from("database"),
            api_cache_dir: PathBuf::from(".cache"),
            retry_max_attempts: 3,
            retry_initial_backoff_ms: 1000,
            request_timeout_secs: 10,
            notify_interval_hours: 2,
            telegram_base_url: "https://api.telegram.org".to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_max_attempts,
            initial_backoff: Duration::from_millis(self.retry_initial_backoff_ms),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn fallback_path(&self) -> PathBuf {
        self.data_dir.join("weather_cache.json")
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join("bot_users_data.json")
    }

    pub fn notify_interval(&self) -> Duration {
        Duration::from_secs(self.notify_interval_hours.max(1).saturating_mul(3600))
    }

    pub fn require_bot_token(&self) -> anyhow::Result<&str> {
        self.bot_token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("BOT_TOKEN not set"))
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value {:?}: {}", name, raw, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_provider_contract() {
        let config = Config::new("key", "http://localhost:1");
        assert_eq!(config.retry_max_attempts, 3);
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.notify_interval(), Duration::from_secs(2 * 3600));
        assert_eq!(config.fallback_path(), PathBuf::from("database/weather_cache.json"));
        assert_eq!(config.users_path(), PathBuf::from("database/bot_users_data.json"));
    }

    #[test]
    fn test_retry_config_from_settings() {
        let mut config = Config::new("key", "http://localhost:1");
        config.retry_initial_backoff_ms = 250;
        let retry = config.retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_backoff, Duration::from_millis(250));
        assert_eq!(retry.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_notify_interval_clamps_extremes() {
        let mut config = Config::new("key", "http://localhost:1");
        config.notify_interval_hours = 0;
        assert_eq!(config.notify_interval(), Duration::from_secs(3600));

        config.notify_interval_hours = u64::MAX;
        assert_eq!(config.notify_interval(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_bot_token_required_for_serve() {
        let mut config = Config::new("key", "http://localhost:1");
        assert!(config.require_bot_token().is_err());
        config.bot_token = Some("123:abc".to_string());
        assert_eq!(config.require_bot_token().ok(), Some("123:abc"));
    }
}
