//! Binary entry point: boots the graph store connection, the status sink,
//! and the Trigger API server that drives ingestion on demand.

use std::sync::Arc;

use repograph::config::Config;
use repograph::graph::BoltGraphStore;
use repograph::parse::{ExtractionEngine, TreeSitterFacade};
use repograph::server::{router, AppState};
use repograph::status::build_status_sink;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("repograph=info")))
        .init();

    let config = Config::from_env();

    tracing::info!(uri = %config.graph.uri, "connecting to graph store");
    let store = Arc::new(BoltGraphStore::connect(&config.graph).await?);
    let status = Arc::from(build_status_sink(&config.status));
    let extraction = ExtractionEngine::new(TreeSitterFacade::new());

    let state = Arc::new(AppState {
        store,
        status,
        extraction,
        config,
        in_flight: dashmap::DashSet::new(),
    });

    let addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "trigger API listening");
    axum::serve(listener, router(state)).await?;

    Ok(())
}
