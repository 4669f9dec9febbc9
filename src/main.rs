//! slirc-relay - IRC connection relay daemon.

use slirc_relay::config::Config;
use slirc_relay::pool::ConnectionPool;
use slirc_relay::telemetry::Observer;
use slirc_relay::upstream::TcpConnector;
use slirc_relay::{http, metrics};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).map_err(|e| {
            error!(path = %path, error = %e, "Failed to load config");
            e
        })?,
        None => {
            info!("No config file given, using defaults");
            Config::default()
        }
    };

    if config.http.metrics {
        metrics::init();
    }

    let settings = config.link_settings();
    info!(
        listen = %config.http.listen,
        read_timeout = ?settings.heartbeat.read_timeout,
        missed_deadline_limit = settings.heartbeat.missed_deadline_limit,
        "Starting slirc-relay"
    );

    let connector = Arc::new(TcpConnector::new(Observer::tracing()));
    let pool = Arc::new(ConnectionPool::new(connector, settings));

    let listener = tokio::net::TcpListener::bind(config.http.listen).await?;
    let app = http::router(pool, config.http.metrics);

    tokio::select! {
        result = http::serve(listener, app) => {
            if let Err(e) = &result {
                error!(error = %e, "Registration API failed");
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }
    Ok(())
}
