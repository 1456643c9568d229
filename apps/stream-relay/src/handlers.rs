use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::{protocol::PeerId, registry::RegistryStats, AppState};

#[derive(Debug, Serialize)]
pub struct StreamersResponse {
    pub streamers: Vec<PeerId>,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    status: &'static str,
}

/// GET /streamers - Identifiers of every registered streamer
pub async fn list_streamers(State(state): State<AppState>) -> Json<StreamersResponse> {
    Json(StreamersResponse {
        streamers: state.hub.streamers(),
    })
}

/// GET /stats - Registry counters
pub async fn stats(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(state.hub.stats())
}

/// GET /health - Health check endpoint
pub async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus { status: "ok" })
}

/// GET /metrics - Prometheus exposition
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
