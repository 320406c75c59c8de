//! Logging setup
//!
//! Installs a `tracing-subscriber` stack from a [`LoggingConfig`]: console and/or file
//! output, plain or JSON lines. `RUST_LOG` directives override the configured level.

use crate::config::LoggingConfig;
use crate::error::{ArchiveError, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::{info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Filter from `directives` when they parse, otherwise everything at `level` and above
fn build_filter(level: Level, directives: Option<&str>) -> EnvFilter {
    let builder = EnvFilter::builder().with_default_directive(LevelFilter::from_level(level).into());
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| builder.parse(d).ok())
        .unwrap_or_else(|| builder.parse_lossy(""))
}

/// Install the global subscriber.
///
/// Fails if the configuration is invalid, the log file cannot be opened, or a global
/// subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ArchiveError::ConfigError(errors.join("; ")));
    }

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.log_to_console {
        layers.push(if config.json_format {
            fmt::layer().json().with_target(false).boxed()
        } else {
            fmt::layer().with_target(false).boxed()
        });
    }

    if config.log_to_file {
        if let Some(path) = &config.log_file_path {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let writer = Mutex::new(file);
            layers.push(if config.json_format {
                fmt::layer().json().with_ansi(false).with_writer(writer).boxed()
            } else {
                fmt::layer().with_ansi(false).with_writer(writer).boxed()
            });
        }
    }

    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(config.log_level, directives.as_deref());

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| ArchiveError::ConfigError(format!("Failed to install subscriber: {e}")))?;

    info!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_rejected_before_install() {
        let config = LoggingConfig {
            log_to_console: false,
            log_to_file: false,
            ..Default::default()
        };
        assert!(matches!(init_logging(&config), Err(ArchiveError::ConfigError(_))));
    }

    #[test]
    fn test_filter_defaults_to_configured_level() {
        assert_eq!(build_filter(Level::WARN, None).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(build_filter(Level::WARN, Some("  ")).max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn test_filter_directives_override_level() {
        assert_eq!(
            build_filter(Level::INFO, Some("debug")).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
        // unparseable directives fall back
        assert_eq!(
            build_filter(Level::INFO, Some("replica_archive=loud")).max_level_hint(),
            Some(LevelFilter::INFO)
        );
    }

    #[test]
    fn test_second_install_fails() {
        let config = LoggingConfig::default();
        // Another test may have installed a subscriber first
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
