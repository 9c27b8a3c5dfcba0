use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-merchant engine knobs and run-to-run state. Passed into and
/// returned from each run; there is no module-level merchant state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MerchantSettings {
    pub merchant_id: String,
    /// Assumed shipping cost per order, in currency units.
    pub shipping_cost: Decimal,
    /// Merchant-configured minimum monthly impact; the engine still
    /// enforces its own floor on top of this.
    pub min_impact: Decimal,
    pub currency: String,
    pub order_count: u32,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl MerchantSettings {
    pub fn new(merchant_id: impl Into<String>, defaults: &EngineDefaults) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            shipping_cost: defaults.shipping_cost,
            min_impact: defaults.min_impact,
            currency: defaults.currency.clone(),
            order_count: 0,
            last_run_at: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineDefaults {
    pub shipping_cost: Decimal,
    pub min_impact: Decimal,
    pub currency: String,
    pub window_days: u32,
    pub outcome_window_days: u32,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            shipping_cost: Decimal::new(350, 2),
            min_impact: Decimal::new(1_000, 2),
            currency: "GBP".to_string(),
            window_days: 90,
            outcome_window_days: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub engine: EngineDefaults,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://marginscout.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string() },
            engine: EngineDefaults::default(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub shipping_cost: Option<Decimal>,
    pub min_impact: Option<Decimal>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

fn env_decimal(key: &str) -> Result<Option<Decimal>, ConfigError> {
    match env::var(key) {
        Ok(value) => Decimal::from_str(value.trim())
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value }),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration: defaults, then the optional TOML file, then
    /// `MARGINSCOUT_*` environment variables, then explicit overrides.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = AppConfig::default();

        let path = options
            .config_path
            .or_else(|| env::var("MARGINSCOUT_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("marginscout.toml"));

        match fs::read_to_string(&path) {
            Ok(raw) => {
                config = toml::from_str(&raw)
                    .map_err(|source| ConfigError::ParseFile { path: path.clone(), source })?;
            }
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                if options.require_file {
                    return Err(ConfigError::MissingConfigFile(path));
                }
            }
            Err(source) => return Err(ConfigError::ReadFile { path, source }),
        }

        if let Ok(url) = env::var("MARGINSCOUT_DATABASE_URL") {
            config.database.url = url;
        }
        if let Ok(level) = env::var("MARGINSCOUT_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(shipping) = env_decimal("MARGINSCOUT_SHIPPING_COST")? {
            config.engine.shipping_cost = shipping;
        }
        if let Some(min_impact) = env_decimal("MARGINSCOUT_MIN_IMPACT")? {
            config.engine.min_impact = min_impact;
        }

        let overrides = options.overrides;
        if let Some(url) = overrides.database_url {
            config.database.url = url;
        }
        if let Some(level) = overrides.log_level {
            config.logging.level = level;
        }
        if let Some(shipping) = overrides.shipping_cost {
            config.engine.shipping_cost = shipping;
        }
        if let Some(min_impact) = overrides.min_impact {
            config.engine.min_impact = min_impact;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.engine.shipping_cost < Decimal::ZERO {
            return Err(ConfigError::Validation(
                "engine.shipping_cost must not be negative".to_string(),
            ));
        }
        if self.engine.window_days == 0 {
            return Err(ConfigError::Validation("engine.window_days must be positive".to_string()));
        }
        if self.engine.outcome_window_days == 0 {
            return Err(ConfigError::Validation(
                "engine.outcome_window_days must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
