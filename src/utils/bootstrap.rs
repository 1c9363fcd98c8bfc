//! Bootstrap utilities for the gold-etl binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LOG_ENV_VAR, LOG_FORMAT_ENV_VAR};

/// Initialize tracing with GOLD_ETL_LOG environment variable.
///
/// Defaults to "info" level if GOLD_ETL_LOG is not set. Emits JSON lines
/// when GOLD_ETL_LOG_FORMAT is `json`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var(LOG_FORMAT_ENV_VAR)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Extract the value of `--config <path>` or `--config=<path>` from
/// command-line arguments (program name excluded).
pub fn parse_config_path<I>(args: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_config_path() {
        assert_eq!(
            parse_config_path(args(&["--config", "job.yaml"])),
            Some("job.yaml".to_string())
        );
        assert_eq!(
            parse_config_path(args(&["-v", "--config=/etc/gold.yaml"])),
            Some("/etc/gold.yaml".to_string())
        );
        assert_eq!(parse_config_path(args(&["-c", "a.yaml"])), Some("a.yaml".to_string()));
        assert_eq!(parse_config_path(args(&[])), None);
        assert_eq!(parse_config_path(args(&["--config"])), None);
    }
}
