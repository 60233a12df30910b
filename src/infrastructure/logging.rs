//! Logging setup.
//!
//! Builds the tracing subscriber from [`LoggingConfig`]: an env-filter
//! seeded from the configured level (overridable via `RUST_LOG`),
//! pretty or JSON output on stderr, and an optional non-blocking file
//! appender. Keep the returned [`LogGuard`] alive for the life of the
//! process or buffered file output is lost.

use std::io;
use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::domain::models::LoggingConfig;

/// Keeps the file appender's worker thread alive.
pub struct LogGuard {
    _guard: Option<WorkerGuard>,
}

/// Initialize the global subscriber. Call once, from the binary.
pub fn init(config: &LoggingConfig) -> Result<LogGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let guard = if let Some(ref file) = config.file {
        let path = Path::new(file);
        let directory = path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .map_or_else(|| "conveyor.log".to_string(), |n| n.to_string_lossy().into_owned());
        let appender = tracing_appender::rolling::never(directory, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        // File output is always JSON for structured post-processing.
        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true);

        init_with_stderr(config, env_filter, Some(file_layer.boxed()))?;
        Some(guard)
    } else {
        init_with_stderr(config, env_filter, None)?;
        None
    };

    tracing::debug!(
        level = %config.level,
        format = %config.format,
        file_output = config.file.is_some(),
        "Logging initialized"
    );

    Ok(LogGuard { _guard: guard })
}

fn init_with_stderr(
    config: &LoggingConfig,
    env_filter: EnvFilter,
    file_layer: Option<Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>>,
) -> Result<()> {
    let registry = tracing_subscriber::registry().with(file_layer);

    if config.format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(io::stderr)
                    .with_target(true),
            )
            .with(env_filter)
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(true),
            )
            .with(env_filter)
            .try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent_failure() {
        // The first init in the process wins; later inits must surface
        // an error rather than panic.
        let config = LoggingConfig::default();
        let first = init(&config);
        let second = init(&config);
        assert!(first.is_ok() || second.is_err());
    }

    #[test]
    fn test_file_config_shape() {
        let config = LoggingConfig {
            file: Some(".conveyor/logs/conveyor.log".to_string()),
            ..LoggingConfig::default()
        };
        let path = Path::new(config.file.as_deref().unwrap());
        assert_eq!(path.file_name().unwrap(), "conveyor.log");
    }
}
