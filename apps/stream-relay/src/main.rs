use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;

use stream_relay::{
    auth::JwtVerifier,
    cli::Cli,
    config::Config,
    hub::SignalingHub,
    router,
    status::{DisabledStatusService, HttpStatusService, StatusNotifier, StatusService},
    telemetry::Telemetry,
    AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let telemetry = Telemetry::init()?;

    let cli = Cli::parse();
    let config = Config::try_from(cli)?;
    info!(
        listen_addr = %config.listen_addr,
        status_enabled = config.status_enabled(),
        status_queue_depth = config.status_queue_depth,
        "starting stream-relay"
    );

    let status: Arc<dyn StatusService> = match &config.status_url {
        Some(url) => Arc::new(
            HttpStatusService::new(url, config.service_token.clone(), config.status_timeout)
                .context("failed to build status service client")?,
        ),
        None => Arc::new(DisabledStatusService),
    };
    let (notifier, status_worker) = StatusNotifier::spawn(status, config.status_queue_depth);

    let verifier = Arc::new(JwtVerifier::new(
        config.jwt_secret.as_bytes(),
        config.jwt_issuer.as_deref(),
        config.jwt_audience.as_deref(),
    ));
    let hub = SignalingHub::new(verifier, notifier);

    let app = router(AppState {
        hub,
        metrics: Some(telemetry.metrics_handle()),
    });

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!("stream-relay listening on {}", config.listen_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server shutdown with error")?;

    info!(
        grace_seconds = config.shutdown_grace.as_secs(),
        "shutdown signal received; draining status updates"
    );
    let _ = tokio::time::timeout(config.shutdown_grace, status_worker).await;
    info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}
