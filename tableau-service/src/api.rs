//! HTTP API for the Tableau service.
//!
//! - `/generate`: image + optional voice in, image + background music out
//! - `/config`: read and patch the persisted configuration
//! - `/health` and `/metrics` for monitoring

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{ConfigStore, StaticConfig};
use crate::orchestrator::Orchestrator;

pub mod config;
pub mod generate;
use config::{get_config_handler, update_config_handler};
use generate::generate_handler;

/// Application state
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub store: Arc<ConfigStore>,
    pub start_time: Instant,
    /// Absent when no global recorder was installed (tests)
    pub metrics: Option<PrometheusHandle>,
}

/// Build the API router
pub fn router(state: AppState, static_config: &StaticConfig) -> Router {
    let state = Arc::new(state);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Base64 images and voice clips make request bodies large
    let max_body_size = static_config.limits.max_request_bytes;

    Router::new()
        .route("/generate", post(generate_handler))
        .route(
            "/config",
            get(get_config_handler).post(update_config_handler),
        )
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Health & Metrics ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        config_path: state.store.path().display().to_string(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    config_path: String,
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::gateway::ModelGateway;
    use crate::gateway::testing::{StubBackends, test_store};

    /// Router over stub backends and a temp config file
    pub fn test_router(stubs: &StubBackends) -> (tempfile::TempDir, Arc<ConfigStore>, Router) {
        let (dir, store) = test_store();
        let gateway = ModelGateway::new(store.clone(), stubs.backends());
        let state = AppState {
            orchestrator: Orchestrator::new(gateway, store.clone()),
            store: store.clone(),
            start_time: Instant::now(),
            metrics: None,
        };
        let router = router(state, &StaticConfig::default());
        (dir, store, router)
    }
}
