//! Pipeline configuration.
//!
//! Resolution order: built-in defaults, then an optional TOML file, then
//! environment variables (after loading `.env`). The result is validated once
//! before any run starts.

use dataverse_core::domain::Source;
use dataverse_core::extract::{self, CryptoApi, ForexApi, SourceApi, StockApi};
use dataverse_core::http::{Jitter, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("environment variable {key}={value:?} is not valid")]
    InvalidEnv { key: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per HTTP call, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Proportional jitter in `[0, 1]`; zero disables jitter.
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 10_000,
            jitter_fraction: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CryptoConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
    pub vs_currency: String,
    pub per_page: u32,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: extract::crypto::DEFAULT_BASE_URL.to_string(),
            api_key: None,
            vs_currency: "usd".to_string(),
            per_page: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StockConfig {
    pub enabled: bool,
    pub base_url: String,
    /// Required at run time; a run without it fails and is logged.
    pub api_key: Option<String>,
    pub symbols: Vec<String>,
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: extract::stock::DEFAULT_BASE_URL.to_string(),
            api_key: None,
            symbols: ["AAPL", "MSFT", "GOOGL", "AMZN", "NVDA"]
                .map(String::from)
                .to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForexConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
    pub base_currency: String,
    pub symbols: Vec<String>,
}

impl Default for ForexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: extract::forex::DEFAULT_BASE_URL.to_string(),
            api_key: None,
            base_currency: "USD".to_string(),
            symbols: ["EUR", "GBP", "JPY", "CHF", "CAD"].map(String::from).to_vec(),
        }
    }
}

/// Longest accepted daemon cadence: one week.
pub const MAX_SCHEDULE_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub storage_root: PathBuf,
    pub log_dir: PathBuf,
    pub retry: RetryConfig,
    pub http_timeout_secs: u64,
    /// Daemon cadence; 360 minutes is every six hours.
    pub schedule_interval_minutes: u64,
    pub crypto: CryptoConfig,
    pub stock: StockConfig,
    pub forex: ForexConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("data"),
            log_dir: PathBuf::from("logs"),
            retry: RetryConfig::default(),
            http_timeout_secs: 10,
            schedule_interval_minutes: 360,
            crypto: CryptoConfig::default(),
            stock: StockConfig::default(),
            forex: ForexConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        Self::from_toml(&text)
    }

    /// Defaults or `path`, then `.env` and the process environment, validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from variables returned by `lookup`.
    ///
    /// Blank values are ignored; unparsable values are an error rather than a
    /// silent fallback.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DATAVERSE_STORAGE_ROOT") {
            self.storage_root = PathBuf::from(v);
        }
        if let Some(v) = get("DATAVERSE_LOG_DIR") {
            self.log_dir = PathBuf::from(v);
        }
        env_parse(&get, "DATAVERSE_RETRY_MAX_ATTEMPTS", &mut self.retry.max_attempts)?;
        env_parse(&get, "DATAVERSE_RETRY_BASE_DELAY_MS", &mut self.retry.base_delay_ms)?;
        env_parse(&get, "DATAVERSE_RETRY_MAX_DELAY_MS", &mut self.retry.max_delay_ms)?;
        env_parse(&get, "DATAVERSE_RETRY_JITTER", &mut self.retry.jitter_fraction)?;
        env_parse(&get, "DATAVERSE_HTTP_TIMEOUT_SECS", &mut self.http_timeout_secs)?;
        env_parse(
            &get,
            "DATAVERSE_SCHEDULE_INTERVAL_MINUTES",
            &mut self.schedule_interval_minutes,
        )?;

        env_parse(&get, "CRYPTO_ENABLED", &mut self.crypto.enabled)?;
        if let Some(v) = get("COINGECKO_API_KEY") {
            self.crypto.api_key = Some(v);
        }
        if let Some(v) = get("COINGECKO_BASE_URL") {
            self.crypto.base_url = v;
        }
        if let Some(v) = get("CRYPTO_VS_CURRENCY") {
            self.crypto.vs_currency = v;
        }
        env_parse(&get, "CRYPTO_PER_PAGE", &mut self.crypto.per_page)?;

        env_parse(&get, "STOCK_ENABLED", &mut self.stock.enabled)?;
        if let Some(v) = get("STOCK_API_KEY") {
            self.stock.api_key = Some(v);
        }
        if let Some(v) = get("STOCK_BASE_URL") {
            self.stock.base_url = v;
        }
        if let Some(v) = get("STOCK_SYMBOLS") {
            self.stock.symbols = split_list(&v);
        }

        env_parse(&get, "FOREX_ENABLED", &mut self.forex.enabled)?;
        if let Some(v) = get("FOREX_API_KEY") {
            self.forex.api_key = Some(v);
        }
        if let Some(v) = get("FOREX_BASE_URL") {
            self.forex.base_url = v;
        }
        if let Some(v) = get("FOREX_BASE_CURRENCY") {
            self.forex.base_currency = v;
        }
        if let Some(v) = get("FOREX_SYMBOLS") {
            self.forex.symbols = split_list(&v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(msg.to_string()))
        };
        let r = &self.retry;

        if r.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if r.base_delay_ms > r.max_delay_ms {
            return invalid("retry.base_delay_ms must not exceed retry.max_delay_ms");
        }
        if !(0.0..=1.0).contains(&r.jitter_fraction) {
            return invalid("retry.jitter_fraction must be within [0, 1]");
        }
        if self.http_timeout_secs == 0 {
            return invalid("http_timeout_secs must be positive");
        }
        if self.schedule_interval_minutes == 0 {
            return invalid("schedule_interval_minutes must be positive");
        }
        if self.schedule_interval_minutes > MAX_SCHEDULE_INTERVAL_MINUTES {
            return invalid("schedule_interval_minutes must not exceed one week (10080)");
        }
        if self.crypto.enabled && self.crypto.per_page == 0 {
            return invalid("crypto.per_page must be at least 1");
        }
        if self.stock.enabled && self.stock.symbols.is_empty() {
            return invalid("stock.symbols is empty");
        }
        if self.forex.enabled && self.forex.symbols.is_empty() {
            return invalid("forex.symbols is empty");
        }
        if self.forex.enabled && self.forex.base_currency.trim().is_empty() {
            return invalid("forex.base_currency is empty");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let jitter = if self.retry.jitter_fraction > 0.0 {
            Jitter::Proportional(self.retry.jitter_fraction)
        } else {
            Jitter::None
        };
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
        )
        .with_max_delay(Duration::from_millis(self.retry.max_delay_ms))
        .with_jitter(jitter)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_minutes.saturating_mul(60))
    }

    pub fn is_enabled(&self, source: Source) -> bool {
        match source {
            Source::Crypto => self.crypto.enabled,
            Source::Stock => self.stock.enabled,
            Source::Forex => self.forex.enabled,
        }
    }

    pub fn enabled_sources(&self) -> Vec<Source> {
        Source::ALL
            .into_iter()
            .filter(|s| self.is_enabled(*s))
            .collect()
    }

    /// API addressing for `source`, built from this configuration.
    pub fn source_api(&self, source: Source) -> Box<dyn SourceApi> {
        match source {
            Source::Crypto => Box::new(
                CryptoApi::new(&self.crypto.base_url)
                    .with_vs_currency(&self.crypto.vs_currency)
                    .with_per_page(self.crypto.per_page)
                    .with_api_key(self.crypto.api_key.clone()),
            ),
            Source::Stock => Box::new(
                StockApi::new(&self.stock.base_url, self.stock.symbols.clone())
                    .with_api_key(self.stock.api_key.clone()),
            ),
            Source::Forex => Box::new(
                ForexApi::new(
                    &self.forex.base_url,
                    &self.forex.base_currency,
                    self.forex.symbols.clone(),
                )
                .with_api_key(self.forex.api_key.clone()),
            ),
        }
    }
}

fn env_parse<T, G>(get: &G, key: &str, slot: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        *slot = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            key: key.to_string(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
