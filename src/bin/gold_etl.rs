//! gold-etl: silver-to-gold batch stage
//!
//! Runs the stage once and exits. The exit status tells which step failed:
//! 2 configuration, 3 source lookup, 4 source read, 5 destination connection,
//! 6 destination schema mismatch, 7 destination write.
//!
//! ## Configuration
//! - `--config <path>`: YAML configuration file
//! - GOLD_ETL_CONFIG: YAML configuration file (overrides `--config`)
//! - GOLD_ETL__<SECTION>__<KEY>: individual settings, e.g.
//!   `GOLD_ETL__DESTINATION__PASSWORD`
//! - DATABASE_URL: destination connection URL
//! - GOLD_ETL_LOG: log filter (default: info)

use std::process::ExitCode;

use tracing::{error, info};

use gold_etl::catalog::WarehouseCatalog;
use gold_etl::config::{Backend, Config, ConfigError};
use gold_etl::sink::SinkConnector;
use gold_etl::utils::bootstrap::{init_tracing, parse_config_path};
use gold_etl::{run_stage, StageConfig, StageError};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, exit_code = e.exit_code(), "gold-etl failed");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), StageError> {
    let config_path = parse_config_path(std::env::args().skip(1));
    let config = Config::load(config_path.as_deref())?;
    info!(?config, "Configuration loaded");

    let catalog = WarehouseCatalog::from_location(&config.source.warehouse)
        .map_err(|e| ConfigError::Invalid(format!("source.warehouse: {}", e)))?;
    let connector = connector(&config)?;

    run_stage(
        &StageConfig::from_config(&config),
        &catalog,
        connector.as_ref(),
    )
    .await?;

    Ok(())
}

fn connector(config: &Config) -> Result<Box<dyn SinkConnector>, ConfigError> {
    match config.destination.backend {
        #[cfg(feature = "postgres")]
        Backend::Postgres => Ok(Box::new(
            gold_etl::sink::sql::postgres::PostgresConnector::new(config.destination.clone())?,
        )),
        #[cfg(feature = "sqlite")]
        Backend::Sqlite => Ok(Box::new(
            gold_etl::sink::sql::sqlite::SqliteConnector::new(config.destination.clone())?,
        )),
        #[allow(unreachable_patterns)]
        backend => Err(ConfigError::Invalid(format!(
            "destination backend {:?} is not enabled in this build",
            backend
        ))),
    }
}
