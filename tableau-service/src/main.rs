use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{info, warn};

mod api;
mod audio;
mod codec;
mod config;
mod error;
mod gateway;
mod orchestrator;

use crate::api::AppState;
use crate::config::{ConfigStore, load_static_config};
use crate::gateway::{Backends, ModelGateway};
use crate::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!(
        "Starting Tableau service v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Static configuration (server binding, config file location)
    let static_config = load_static_config()?;
    info!(
        host = %static_config.server.host,
        port = static_config.server.port,
        "Static configuration loaded"
    );

    // Persisted generation settings; created from defaults on first run
    let store = Arc::new(ConfigStore::open(&static_config.storage.config_path)?);

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder unavailable, /metrics will be empty");
            None
        }
    };

    let backends = Backends::http(&static_config)?;
    let gateway = ModelGateway::new(store.clone(), backends);

    let state = AppState {
        orchestrator: Orchestrator::new(gateway, store.clone()),
        store,
        start_time: Instant::now(),
        metrics,
    };
    let app = api::router(state, &static_config);

    // Start the server
    let addr = format!(
        "{}:{}",
        static_config.server.host, static_config.server.port
    );
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tableau_service=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
