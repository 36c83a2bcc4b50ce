//! Request shield server.
//!
//! Runs a demo application behind the security interceptor. Real deployments
//! embed [`request_shield::ShieldServer`] around their own router.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{http::StatusCode, routing::get, Json, Router};
use clap::Parser;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use request_shield::audit::TracingSink;
use request_shield::config::{load_config, watcher::ConfigWatcher, ShieldConfig};
use request_shield::lifecycle::{init_encryption, spawn_signal_handler, Shutdown};
use request_shield::observability::logging::init_logging;
use request_shield::ShieldServer;

#[derive(Parser)]
#[command(name = "request-shield")]
#[command(about = "HTTP security interceptor", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ShieldConfig::default(),
    };
    init_logging(&config.observability)?;

    tracing::info!("request-shield v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        requests_per_window = config.rate_limit.requests_per_window,
        endpoint_classes = config.rate_limit.endpoints.len(),
        "Configuration loaded"
    );

    init_encryption(&config.encryption)?;

    // Keep the watcher handle alive for the life of the server.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    let server_shutdown = shutdown.subscribe();
    spawn_signal_handler(shutdown.clone());

    let server = ShieldServer::new(config, demo_app(), Arc::new(TracingSink))?;
    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn demo_app() -> Router {
    Router::new()
        .route("/api/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .fallback(|| async { (StatusCode::OK, Json(json!({ "status": "accepted" }))) })
}
