//! Job configuration.
//!
//! Aggregates the source, transform and destination sections into a single
//! Config struct that can be loaded from YAML files or environment variables.

mod destination;
mod source;

pub use destination::{Backend, DestinationConfig};
pub use source::{SourceConfig, TransformConfig};

use serde::Deserialize;

use crate::sink::DestinationTable;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "gold-etl.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "GOLD_ETL_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "GOLD_ETL";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "GOLD_ETL_LOG";
/// Environment variable selecting the log format (`json` or plain).
pub const LOG_FORMAT_ENV_VAR: &str = "GOLD_ETL_LOG_FORMAT";
/// Environment variable for the destination database URL.
pub const DATABASE_URL_ENV_VAR: &str = "DATABASE_URL";

/// Errors that can occur loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main job configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source table in the warehouse catalog.
    pub source: SourceConfig,
    /// Column names used by the transform.
    pub transform: TransformConfig,
    /// Destination database and table.
    pub destination: DestinationConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `gold-etl.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `GOLD_ETL_CONFIG` environment variable (if set)
    /// 4. Environment variables with `GOLD_ETL` prefix, e.g.
    ///    `GOLD_ETL__DESTINATION__HOST`
    /// 5. `DATABASE_URL` for the destination URL
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = config.try_deserialize()?;

        if let Ok(url) = std::env::var(DATABASE_URL_ENV_VAR) {
            if !url.trim().is_empty() {
                config.destination.url = Some(url);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check values the type system cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.table.trim().is_empty() {
            return Err(ConfigError::Invalid("source.table is empty".into()));
        }
        if self.source.warehouse.trim().is_empty() {
            return Err(ConfigError::Invalid("source.warehouse is empty".into()));
        }
        for (key, value) in [
            ("transform.amount_column", &self.transform.amount_column),
            ("transform.timestamp_column", &self.transform.timestamp_column),
            ("transform.order_date_column", &self.transform.order_date_column),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} is empty", key)));
            }
        }
        let table = DestinationTable::parse(&self.destination.table).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "destination.table '{}' is not 'table' or 'schema.table'",
                self.destination.table
            ))
        })?;
        if self.destination.backend == Backend::Sqlite {
            if let Some(schema) = &table.schema {
                if !["main", "temp"].iter().any(|s| schema.eq_ignore_ascii_case(s)) {
                    return Err(ConfigError::Invalid(format!(
                        "destination.table '{}': sqlite has no schema '{}'",
                        self.destination.table, schema
                    )));
                }
            }
        }
        if self.destination.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "destination.batch_size must be at least 1".into(),
            ));
        }
        if self.destination.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "destination.max_connections must be at least 1".into(),
            ));
        }
        if self.destination.backend == Backend::Sqlite && self.destination.url.is_none() {
            return Err(ConfigError::Invalid(
                "destination.url is required for the sqlite backend".into(),
            ));
        }
        Ok(())
    }
}
