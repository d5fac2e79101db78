// Configuration management for the grid bot

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub const API_KEY_ENV: &str = "BITKUB_API_KEY";
pub const API_SECRET_ENV: &str = "BITKUB_API_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_price_precision")]
    pub price_precision: usize,
    #[serde(default = "default_amount_precision")]
    pub amount_precision: usize,
    #[serde(default = "default_ticker_max_age")]
    pub ticker_max_age_secs: u64,
}

/// Immutable grid parameters handed to the engine at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub symbol: String,           // quote first, e.g. THB_BTC
    pub grid_levels: usize,
    pub grid_spacing: f64,        // percent per level
    pub trade_balance: f64,       // quote currency deployed across the whole grid
    pub price_threshold: f64,     // fraction, e.g. 0.002 = 0.2%
    #[serde(default = "default_trading_fee")]
    pub trading_fee: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_fetch_attempts")]
    pub fetch_retry_attempts: u32,
    #[serde(default = "default_fetch_delay")]
    pub fetch_retry_delay_ms: u64,
    #[serde(default = "default_cancel_attempts")]
    pub cancel_max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    pub grid: GridConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub journal: JournalConfig,
}

fn default_rest_url() -> String { "https://api.bitkub.com".to_string() }
fn default_ws_url() -> String { "wss://api.bitkub.com/websocket-api".to_string() }
fn default_request_timeout() -> u64 { 10 }
fn default_price_precision() -> usize { 2 }
fn default_amount_precision() -> usize { 8 }
fn default_ticker_max_age() -> u64 { 5 }
fn default_trading_fee() -> f64 { 0.0025 }
fn default_check_interval() -> u64 { 2 }
fn default_fetch_attempts() -> u32 { 3 }
fn default_fetch_delay() -> u64 { 1000 }
fn default_cancel_attempts() -> u32 { 5 }
fn default_log_level() -> String { "info".to_string() }
fn default_true() -> bool { true }
fn default_db_path() -> String { "data/grid_journal.db".to_string() }

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            ws_url: default_ws_url(),
            api_key: String::new(),
            api_secret: String::new(),
            request_timeout_secs: default_request_timeout(),
            price_precision: default_price_precision(),
            amount_precision: default_amount_precision(),
            ticker_max_age_secs: default_ticker_max_age(),
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            symbol: "THB_BTC".to_string(),
            grid_levels: 5,
            grid_spacing: 0.3,        // 0.3%
            trade_balance: 10000.0,   // THB
            price_threshold: 0.002,   // 0.2%
            trading_fee: default_trading_fee(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            fetch_retry_attempts: default_fetch_attempts(),
            fetch_retry_delay_ms: default_fetch_delay(),
            cancel_max_attempts: default_cancel_attempts(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: default_db_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig::default(),
            grid: GridConfig::default(),
            engine: EngineConfig::default(),
            logging: LoggingConfig::default(),
            journal: JournalConfig::default(),
        }
    }
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_levels == 0 {
            return Err(ConfigError::Validation("grid_levels must be greater than 0".to_string()));
        }

        if !(self.grid_spacing > 0.0) {
            return Err(ConfigError::Validation("grid_spacing must be positive".to_string()));
        }

        // The lowest buy rung must stay above zero
        if self.grid_spacing * self.grid_levels as f64 >= 100.0 {
            return Err(ConfigError::Validation(
                "grid_spacing * grid_levels must be below 100%".to_string(),
            ));
        }

        if !(self.trade_balance > 0.0) {
            return Err(ConfigError::Validation("trade_balance must be positive".to_string()));
        }

        if self.price_threshold < 0.0 {
            return Err(ConfigError::Validation("price_threshold must be non-negative".to_string()));
        }

        if !(0.0..1.0).contains(&self.trading_fee) {
            return Err(ConfigError::Validation("trading_fee must be in [0, 1)".to_string()));
        }

        if !self.symbol.contains('_') {
            return Err(ConfigError::Validation(format!(
                "symbol '{}' must look like QUOTE_BASE (e.g. THB_BTC)",
                self.symbol
            )));
        }

        Ok(())
    }
}

impl EngineConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn fetch_retry_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_retry_delay_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(e.to_string()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.to_file(&path)?;
            info!("📁 Created default config file: {}", path.as_ref().display());
            Ok(config)
        }
    }

    /// Replace API credentials with environment values when present
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                self.exchange.api_key = key;
            }
        }
        if let Ok(secret) = std::env::var(API_SECRET_ENV) {
            if !secret.is_empty() {
                self.exchange.api_secret = secret;
            }
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.exchange.api_key.is_empty() && !self.exchange.api_secret.is_empty()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid.validate()?;

        if self.engine.fetch_retry_attempts == 0 {
            return Err(ConfigError::Validation("fetch_retry_attempts must be at least 1".to_string()));
        }

        if self.engine.cancel_max_attempts == 0 {
            return Err(ConfigError::Validation("cancel_max_attempts must be at least 1".to_string()));
        }

        if self.engine.check_interval_secs == 0 {
            return Err(ConfigError::Validation("check_interval_secs must be greater than 0".to_string()));
        }

        if self.exchange.request_timeout_secs == 0 {
            return Err(ConfigError::Validation("request_timeout_secs must be greater than 0".to_string()));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
