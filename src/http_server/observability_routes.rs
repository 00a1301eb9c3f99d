//! Observability HTTP Routes
//!
//! Health check and per mirror service counters.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::observability::MetricsSnapshot;
use crate::service::Registry;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: usize,
}

/// Create observability routes
pub fn observability_routes(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(registry)
}

/// Health check handler
async fn health_handler(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services: registry.len(),
    };

    (StatusCode::OK, Json(response))
}

/// Counter snapshot of every mirror service, keyed by name
async fn metrics_handler(
    State(registry): State<Arc<Registry>>,
) -> Json<BTreeMap<String, MetricsSnapshot>> {
    Json(
        registry
            .mirror_services()
            .map(|(name, mirror)| (name.to_string(), mirror.metrics().snapshot()))
            .collect(),
    )
}
