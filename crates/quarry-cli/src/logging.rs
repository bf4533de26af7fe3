//! Logging and tracing setup for the `quarry` binary
//!
//! stdout carries protocol traffic, so console output always goes to stderr.
//! An optional daily-rolling JSON file log can be enabled alongside it.

use std::path::PathBuf;

use anyhow::Context;
use clap::ValueEnum;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Console log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,

    /// Directory for the JSON file log; no file is written when unset
    pub log_dir: Option<PathBuf>,

    /// Whether to include file/line information in console output
    pub include_location: bool,

    /// Filter used when `RUST_LOG` is not set
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            log_dir: None,
            include_location: false,
            default_filter: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Debug output for the connection layer, file locations on the console
    pub fn verbose() -> Self {
        Self {
            include_location: true,
            default_filter: "info,quarry_connection=debug".to_string(),
            ..Self::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file log; keep it alive until exit.
pub fn init(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let mut layers = Vec::new();

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location);
    let console = match config.format {
        LogFormat::Pretty => console.with_ansi(true).pretty().with_filter(config.filter()).boxed(),
        LogFormat::Json => console.with_ansi(false).json().with_filter(config.filter()).boxed(),
    };
    layers.push(console);

    let mut guard = None;
    if let Some(dir) = &config.log_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;

        let file_appender = tracing_appender::rolling::daily(dir, "quarry.log");
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(config.filter())
            .boxed();
        layers.push(json_layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("logging was already initialized")?;

    tracing::debug!(
        log_dir = ?config.log_dir,
        format = ?config.format,
        "Logging system initialized"
    );

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.log_dir.is_none());
        assert_eq!(config.default_filter, "info");
    }

    #[test]
    fn test_verbose_config() {
        let config = LoggingConfig::verbose();
        assert!(config.include_location);
        assert!(config.default_filter.contains("quarry_connection=debug"));
    }

    #[test]
    fn test_init_creates_log_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_dir = dir.path().join("logs");
        let config = LoggingConfig {
            log_dir: Some(log_dir.clone()),
            ..LoggingConfig::default()
        };

        let guard = init(&config).expect("first init");
        assert!(guard.is_some());
        assert!(log_dir.is_dir());
        assert!(init(&LoggingConfig::default()).is_err());
    }
}
