//! Quarry - pooled Trino/Presto access behind a stdio tool server
//!
//! Parses configuration from flags and `QUARRY_*` variables, opens the
//! connection pool and serves JSON-RPC on stdin/stdout until EOF or a signal.

mod config;
mod logging;
mod rpc;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use quarry_connection::{ConnectionPool, EngineConnectionFactory};
use quarry_drivers::DriverRegistry;
use quarry_services::QueryService;
use tokio::io::BufReader;

use crate::config::Cli;
use crate::server::{Handler, ResourceInfo, Server};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(&cli.logging_config())?;
    cli.log_summary();

    let pool_config = cli.pool_config()?;
    let connection = cli.connection_config();
    connection.validate().context("invalid connection settings")?;

    let registry = DriverRegistry::with_defaults();
    let driver = registry
        .get(cli.driver.as_str())
        .with_context(|| format!("driver '{}' is not available in this build", cli.driver.as_str()))?;

    let factory = EngineConnectionFactory::new(driver, connection);
    let pool = ConnectionPool::new(pool_config, factory).await;
    let stats = pool.stats();
    tracing::info!(
        open = stats.total(),
        min = pool.config().min_size(),
        max = pool.config().max_size(),
        healthy = pool.is_healthy(),
        "connection pool ready"
    );

    let resource = ResourceInfo {
        host: cli.host.clone(),
        port: cli.port,
        schema: cli.schema.clone(),
    };
    let handler = Handler::new(QueryService::new(pool.clone(), cli.schema.clone()), resource);
    let served = Server::new(handler)
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), shutdown_signal())
        .await;

    pool.shutdown().await;
    tracing::info!("quarry stopped");
    served
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
