use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use metrics::counter;
use reqwest::{Client, Method};
use serde_json::json;
use thiserror::Error;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::protocol::PeerId;

pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// Availability change for one streamer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub peer_id: PeerId,
    pub available: bool,
}

impl StatusUpdate {
    pub fn available(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            available: true,
        }
    }

    pub fn unavailable(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            available: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid http method: {0}")]
    Method(#[from] axum::http::method::InvalidMethod),
    #[error("status service rejected update: {0}")]
    Rejected(String),
}

/// Downstream service told when a streamer comes or goes.
#[async_trait]
pub trait StatusService: Send + Sync {
    async fn notify(&self, update: &StatusUpdate) -> Result<(), StatusError>;
}

/// Used when no status service is configured.
pub struct DisabledStatusService;

#[async_trait]
impl StatusService for DisabledStatusService {
    async fn notify(&self, update: &StatusUpdate) -> Result<(), StatusError> {
        debug!(
            peer_id = %update.peer_id,
            available = update.available,
            "status service disabled; dropping update"
        );
        Ok(())
    }
}

pub struct HttpStatusService {
    client: Client,
    method: Method,
    endpoint: String,
    service_token: Option<String>,
}

impl HttpStatusService {
    pub fn new(
        base_url: &str,
        service_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StatusError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            method: Method::from_bytes(b"UPDATE")?,
            endpoint: format!("{}/car", base_url.trim_end_matches('/')),
            service_token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl StatusService for HttpStatusService {
    async fn notify(&self, update: &StatusUpdate) -> Result<(), StatusError> {
        let mut request = self
            .client
            .request(self.method.clone(), &self.endpoint)
            .json(&json!({ "id": update.peer_id, "is_one": update.available }));
        if let Some(token) = &self.service_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StatusError::Rejected(format!("status {status}")));
        }
        debug!(
            peer_id = %update.peer_id,
            available = update.available,
            %status,
            "status service acknowledged update"
        );
        Ok(())
    }
}

/// Bounded hand-off between the signaling path and the status service.
///
/// `publish` never waits: when the queue is full the update is dropped and
/// logged, so a stalled downstream cannot hold up registration or cleanup.
#[derive(Clone)]
pub struct StatusNotifier {
    tx: mpsc::Sender<StatusUpdate>,
}

impl StatusNotifier {
    pub fn spawn(service: Arc<dyn StatusService>, depth: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<StatusUpdate>(depth.max(1));
        let worker = tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                if let Err(err) = service.notify(&update).await {
                    warn!(
                        peer_id = %update.peer_id,
                        available = update.available,
                        error = %err,
                        "status update failed"
                    );
                    counter!("stream_relay_status_updates_failed_total", 1);
                }
            }
            debug!("status worker stopped");
        });
        (Self { tx }, worker)
    }

    pub fn publish(&self, update: StatusUpdate) {
        match self.tx.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(update)) => {
                warn!(
                    peer_id = %update.peer_id,
                    available = update.available,
                    "status queue full; dropping update"
                );
                counter!("stream_relay_status_updates_dropped_total", 1, "reason" => "full");
            }
            Err(TrySendError::Closed(update)) => {
                warn!(
                    peer_id = %update.peer_id,
                    available = update.available,
                    "status worker gone; dropping update"
                );
                counter!("stream_relay_status_updates_dropped_total", 1, "reason" => "closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::{mpsc::UnboundedSender, Notify};

    struct Recording(UnboundedSender<StatusUpdate>);

    #[async_trait]
    impl StatusService for Recording {
        async fn notify(&self, update: &StatusUpdate) -> Result<(), StatusError> {
            let _ = self.0.send(update.clone());
            Ok(())
        }
    }

    struct Stalled(Arc<Notify>);

    #[async_trait]
    impl StatusService for Stalled {
        async fn notify(&self, _update: &StatusUpdate) -> Result<(), StatusError> {
            self.0.notified().await;
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl StatusService for Failing {
        async fn notify(&self, _update: &StatusUpdate) -> Result<(), StatusError> {
            Err(StatusError::Rejected("status 503 Service Unavailable".into()))
        }
    }

    fn peer(raw: &str) -> PeerId {
        PeerId::parse(raw).unwrap()
    }

    #[test_timeout::tokio_timeout_test]
    async fn delivers_updates_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (notifier, _worker) = StatusNotifier::spawn(Arc::new(Recording(tx)), 8);
        let id = peer("0b7f8f3e-1c2d-4e5f-8a9b-0c1d2e3f4a5b");

        notifier.publish(StatusUpdate::available(id.clone()));
        notifier.publish(StatusUpdate::unavailable(id.clone()));

        assert_eq!(rx.recv().await, Some(StatusUpdate::available(id.clone())));
        assert_eq!(rx.recv().await, Some(StatusUpdate::unavailable(id)));
    }

    #[test_timeout::tokio_timeout_test]
    async fn full_queue_drops_instead_of_blocking() {
        let gate = Arc::new(Notify::new());
        let (notifier, _worker) = StatusNotifier::spawn(Arc::new(Stalled(gate.clone())), 1);
        let id = peer("0b7f8f3e-1c2d-4e5f-8a9b-0c1d2e3f4a5b");

        for _ in 0..32 {
            notifier.publish(StatusUpdate::available(id.clone()));
        }
        // Reaching this point at all is the assertion: publish never awaited.
        gate.notify_waiters();
    }

    #[test_timeout::tokio_timeout_test]
    async fn failures_do_not_stop_the_worker() {
        let (notifier, worker) = StatusNotifier::spawn(Arc::new(Failing), 4);
        let id = peer("0b7f8f3e-1c2d-4e5f-8a9b-0c1d2e3f4a5b");
        notifier.publish(StatusUpdate::available(id.clone()));
        notifier.publish(StatusUpdate::unavailable(id));
        drop(notifier);
        worker.await.unwrap();
    }

    #[derive(Debug)]
    struct Captured {
        method: String,
        path: String,
        authorization: Option<String>,
        body: serde_json::Value,
    }

    async fn capture_server(
        reply: axum::http::StatusCode,
    ) -> (String, mpsc::UnboundedReceiver<Captured>) {
        use axum::{extract::State, http::HeaderMap, routing::any, Router};

        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new()
            .route(
                "/car",
                any(
                    move |State(tx): State<UnboundedSender<Captured>>,
                          method: axum::http::Method,
                          uri: axum::http::Uri,
                          headers: HeaderMap,
                          body: String| async move {
                        let _ = tx.send(Captured {
                            method: method.to_string(),
                            path: uri.path().to_string(),
                            authorization: headers
                                .get(axum::http::header::AUTHORIZATION)
                                .and_then(|value| value.to_str().ok())
                                .map(str::to_string),
                            body: serde_json::from_str(&body).unwrap_or_default(),
                        });
                        reply
                    },
                ),
            )
            .with_state(tx);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), rx)
    }

    #[test_timeout::tokio_timeout_test]
    async fn http_service_sends_update_with_bearer_token() {
        let (base, mut requests) = capture_server(axum::http::StatusCode::OK).await;
        let service = HttpStatusService::new(
            &base,
            Some("service-token".into()),
            Duration::from_secs(2),
        )
        .unwrap();
        let id = peer("0b7f8f3e-1c2d-4e5f-8a9b-0c1d2e3f4a5b");

        service.notify(&StatusUpdate::unavailable(id)).await.unwrap();

        let request = requests.recv().await.unwrap();
        assert_eq!(request.method, "UPDATE");
        assert_eq!(request.path, "/car");
        assert_eq!(request.authorization.as_deref(), Some("Bearer service-token"));
        assert_eq!(
            request.body,
            json!({ "id": "0b7f8f3e-1c2d-4e5f-8a9b-0c1d2e3f4a5b", "is_one": false })
        );
    }

    #[test_timeout::tokio_timeout_test]
    async fn http_service_treats_non_success_as_rejection() {
        let (base, mut requests) =
            capture_server(axum::http::StatusCode::SERVICE_UNAVAILABLE).await;
        let service = HttpStatusService::new(&base, None, Duration::from_secs(2)).unwrap();
        let id = peer("0b7f8f3e-1c2d-4e5f-8a9b-0c1d2e3f4a5b");

        let err = service.notify(&StatusUpdate::available(id)).await.unwrap_err();
        assert!(matches!(err, StatusError::Rejected(_)), "unexpected error {err}");
        let request = requests.recv().await.unwrap();
        assert_eq!(request.authorization, None);
        assert_eq!(request.body["is_one"], true);
    }

    #[test_timeout::timeout]
    fn http_service_targets_car_endpoint() {
        let service =
            HttpStatusService::new("http://status.local/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(service.endpoint(), "http://status.local/car");
    }
}
