//! Command line and environment configuration

use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use clap::{Parser, ValueEnum};
use quarry_connection::PoolConfig;
use quarry_core::{ConnectionConfig, Protocol};

use crate::logging::{LogFormat, LoggingConfig};

/// Query engine driver dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DriverKind {
    Trino,
    Presto,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Trino => "trino",
            DriverKind::Presto => "presto",
        }
    }
}

/// Quarry - pooled Trino/Presto access over a stdio tool server
#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Engine coordinator host
    #[arg(long, env = "QUARRY_HOST", default_value = "localhost")]
    pub host: String,

    /// Engine coordinator port
    #[arg(long, env = "QUARRY_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Transport protocol (http or https)
    #[arg(long, env = "QUARRY_PROTOCOL", default_value = "https", value_parser = parse_protocol)]
    pub protocol: Protocol,

    #[arg(long, env = "QUARRY_USERNAME")]
    pub username: String,

    #[arg(long, env = "QUARRY_PASSWORD", hide_env_values = true)]
    pub password: String,

    #[arg(long, env = "QUARRY_CATALOG", default_value = "hive")]
    pub catalog: String,

    /// Default schema for tools that do not name one
    #[arg(long, env = "QUARRY_SCHEMA", default_value = "default")]
    pub schema: String,

    /// Client source identifier; `{username}` is replaced with the username
    #[arg(long, env = "QUARRY_SOURCE", default_value = "quarry")]
    pub source: String,

    /// Resource group (queue) for every query
    #[arg(long, env = "QUARRY_RESOURCE_GROUP")]
    pub resource_group: Option<String>,

    /// Session property applied to every connection (repeatable)
    #[arg(
        long = "session",
        value_name = "KEY=VALUE",
        env = "QUARRY_SESSION",
        value_delimiter = ',',
        value_parser = parse_session_property
    )]
    pub session: Vec<(String, String)>,

    #[arg(long, value_enum, env = "QUARRY_DRIVER", default_value_t = DriverKind::Trino)]
    pub driver: DriverKind,

    /// Connection timeout in seconds
    #[arg(long, env = "QUARRY_CONNECT_TIMEOUT", default_value_t = 10)]
    pub connect_timeout: u64,

    /// Per-request timeout in seconds
    #[arg(long, env = "QUARRY_QUERY_TIMEOUT", default_value_t = 300)]
    pub query_timeout: u64,

    /// Connections kept open while idle
    #[arg(long, env = "QUARRY_POOL_MIN", default_value_t = 2)]
    pub pool_min: usize,

    /// Upper bound on open connections
    #[arg(long, env = "QUARRY_POOL_MAX", default_value_t = 10)]
    pub pool_max: usize,

    /// Seconds an idle connection may sit before it is closed
    #[arg(long, env = "QUARRY_IDLE_TIMEOUT", default_value_t = 600)]
    pub idle_timeout: u64,

    /// Seconds between maintenance sweeps
    #[arg(long, env = "QUARRY_VALIDATE_INTERVAL", default_value_t = 30)]
    pub validate_interval: u64,

    /// Seconds to wait for a free connection; fail immediately when unset
    #[arg(long, env = "QUARRY_ACQUIRE_TIMEOUT")]
    pub acquire_timeout: Option<u64>,

    /// Log timeouts, source and resource group at startup and enable debug logs
    #[arg(short, long, env = "QUARRY_VERBOSE")]
    pub verbose: bool,

    #[arg(long, value_enum, env = "QUARRY_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Also write a daily-rolling JSON log into this directory
    #[arg(long, env = "QUARRY_LOG_DIR", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

fn parse_protocol(s: &str) -> Result<Protocol, String> {
    s.parse::<Protocol>().map_err(|e| e.to_string())
}

fn parse_session_property(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.trim().to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

impl Cli {
    pub fn connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(self.driver.as_str(), &self.host, self.port)
            .with_protocol(self.protocol)
            .with_credentials(&self.username, &self.password)
            .with_catalog(&self.catalog)
            .with_schema(&self.schema)
            .with_source(&self.source)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout))
            .with_query_timeout(Duration::from_secs(self.query_timeout));
        if let Some(group) = &self.resource_group {
            config = config.with_resource_group(group);
        }
        for (key, value) in &self.session {
            config = config.with_session_property(key, value);
        }
        config
    }

    /// Checked before [`PoolConfig::new`], which panics on these
    pub fn pool_config(&self) -> anyhow::Result<PoolConfig> {
        if self.pool_max == 0 {
            bail!("--pool-max must be at least 1");
        }
        if self.pool_min > self.pool_max {
            bail!(
                "--pool-min ({}) cannot exceed --pool-max ({})",
                self.pool_min,
                self.pool_max
            );
        }

        let mut config = PoolConfig::new(self.pool_min, self.pool_max)
            .with_idle_timeout_ms(self.idle_timeout.saturating_mul(1000))
            .with_validate_interval_ms(self.validate_interval.saturating_mul(1000));
        if let Some(secs) = self.acquire_timeout {
            config = config.with_acquire_timeout_ms(secs.saturating_mul(1000));
        }
        Ok(config)
    }

    pub fn logging_config(&self) -> LoggingConfig {
        let base = if self.verbose {
            LoggingConfig::verbose()
        } else {
            LoggingConfig::default()
        };
        LoggingConfig {
            format: self.log_format,
            log_dir: self.log_dir.clone(),
            ..base
        }
    }

    /// Log the effective configuration with the password masked
    pub fn log_summary(&self) {
        tracing::info!(
            driver = self.driver.as_str(),
            host = %self.host,
            port = self.port,
            protocol = %self.protocol,
            username = %self.username,
            catalog = %self.catalog,
            schema = %self.schema,
            pool_min = self.pool_min,
            pool_max = self.pool_max,
            "Quarry configuration"
        );
        if self.verbose {
            tracing::info!(
                connect_timeout_s = self.connect_timeout,
                query_timeout_s = self.query_timeout,
                source = %self.connection_config().resolved_source().unwrap_or_default(),
                resource_group = ?self.resource_group,
                password = %"*".repeat(self.password.len()),
                session = ?self.session,
                "Quarry configuration (verbose)"
            );
        }
    }
}
