pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod pairing;
pub mod protocol;
pub mod registry;
pub mod status;
pub mod telemetry;
pub mod websocket;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::hub::SignalingHub;

#[derive(Clone)]
pub struct AppState {
    pub hub: SignalingHub,
    pub metrics: Option<PrometheusHandle>,
}

/// HTTP routes plus the `/ws` signaling endpoint.
///
/// Serve with `into_make_service_with_connect_info::<SocketAddr>()`; the
/// websocket handler reads the peer address.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/streamers", get(handlers::list_streamers))
        .route("/stats", get(handlers::stats))
        .route("/metrics", get(handlers::metrics))
        .route("/ws", get(websocket::websocket_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
