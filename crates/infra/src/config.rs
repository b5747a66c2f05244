//! Ledger configuration.
//!
//! Loaded in layers:
//! 1. Default values in code
//! 2. An optional configuration file (`config/stockledger.{toml,yaml,json}` or an explicit path)
//! 3. Environment variable overrides with the `STOCKLEDGER__` prefix
//!    (e.g. `STOCKLEDGER__RETRY__MAX_ATTEMPTS=8`)

use std::path::Path;
use std::time::Duration;

use config::{ConfigError, Environment, File};
use serde::Deserialize;

use stockledger_inventory::{LocationType, NewLocation};

use crate::retry::{BackoffStrategy, RetryPolicy};

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LedgerConfig {
    pub retry: RetrySettings,

    /// Reject movements whose product is missing, or whose locations are
    /// unknown or inactive. When off, a missing product only disables its
    /// low-stock threshold.
    pub strict_catalog: bool,

    /// Default page size for movement history.
    pub history_limit: usize,

    /// Locations created by `Catalog::ensure_default_locations`.
    #[serde(default = "default_locations")]
    pub default_locations: Vec<DefaultLocation>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RetrySettings {
    /// Total attempts per movement, the first one included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub strategy: BackoffStrategy,
    pub jitter: f64,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DefaultLocation {
    pub name: String,
    #[serde(rename = "type")]
    pub location_type: LocationType,
}

impl DefaultLocation {
    pub fn new(name: impl Into<String>, location_type: LocationType) -> Self {
        Self {
            name: name.into(),
            location_type,
        }
    }

    pub fn to_new_location(&self) -> NewLocation {
        NewLocation::new(self.name.clone(), self.location_type)
    }
}

fn default_locations() -> Vec<DefaultLocation> {
    vec![
        DefaultLocation::new("Almacén Principal", LocationType::Almacen),
        DefaultLocation::new("Camioneta 1", LocationType::Vehiculo),
        DefaultLocation::new("Camioneta 2", LocationType::Vehiculo),
    ]
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms.max(self.base_delay_ms)),
            strategy: self.strategy,
            jitter: self.jitter.clamp(0.0, 1.0),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 10,
            max_delay_ms: 250,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.25,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            strict_catalog: false,
            history_limit: 50,
            default_locations: default_locations(),
        }
    }
}

impl LedgerConfig {
    /// Load from `config/stockledger.*` (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load with an explicit configuration file, which must then exist.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name("config/stockledger").required(false),
        };

        let config = config::Config::builder()
            // Start with default values
            .set_default("retry.max_attempts", 5_i64)?
            .set_default("retry.base_delay_ms", 10_i64)?
            .set_default("retry.max_delay_ms", 250_i64)?
            .set_default("retry.strategy", "exponential")?
            .set_default("retry.jitter", 0.25_f64)?
            .set_default("strict_catalog", false)?
            .set_default("history_limit", 50_i64)?
            .add_source(file)
            // Override with environment variables (STOCKLEDGER__ prefix)
            .add_source(
                Environment::with_prefix("STOCKLEDGER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
