use std::sync::Arc;

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    auth::{AuthError, IdentityVerifier},
    error::SignalError,
    pairing::{self, Relay},
    protocol::{self, ClientMessage, PeerId, Register},
    registry::{Cleanup, ConnectionHandle, PeerRegistry, RegistryStats},
    status::StatusNotifier,
};

/// Entry point the transport talks to: one call per inbound frame and one
/// per closed connection.
///
/// All registry reads and writes happen under a single lock that is never
/// held across an await. Token verification runs before the lock is taken.
/// Status updates are queued while the lock is held, so the status service
/// sees them in registry order; frames go out after it is released.
#[derive(Clone)]
pub struct SignalingHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    registry: Mutex<PeerRegistry>,
    verifier: Arc<dyn IdentityVerifier>,
    status: StatusNotifier,
}

impl SignalingHub {
    pub fn new(verifier: Arc<dyn IdentityVerifier>, status: StatusNotifier) -> Self {
        Self {
            inner: Arc::new(HubInner {
                registry: Mutex::new(PeerRegistry::new()),
                verifier,
                status,
            }),
        }
    }

    /// Handle one text frame received on `connection`.
    pub async fn handle_text(&self, connection: &ConnectionHandle, text: &str) {
        let message = match protocol::parse(text) {
            Ok(message) => message,
            Err(err) => {
                debug!(connection_id = %connection.id(), error = %err, "rejecting frame");
                self.reject(connection, SignalError::from(err));
                return;
            }
        };
        counter!("stream_relay_messages_total", 1, "type" => message.kind());
        debug!(
            connection_id = %connection.id(),
            peer_id = %message.sender(),
            kind = message.kind(),
            "received message"
        );

        match message {
            ClientMessage::Register(register) => {
                if let Err(err) = self.register(connection, register).await {
                    self.reject(connection, err);
                }
            }
            ClientMessage::Offer(desc) => {
                let result = {
                    let mut registry = self.inner.registry.lock();
                    pairing::offer(&mut registry, connection.id(), &desc, text)
                };
                if result.is_ok() {
                    info!(viewer = %desc.uuid, streamer = %desc.to, "viewer paired with streamer");
                }
                self.deliver(connection, "offer", result);
            }
            ClientMessage::Answer(desc) => {
                let result = {
                    let registry = self.inner.registry.lock();
                    pairing::answer(&registry, connection.id(), &desc, text)
                };
                self.deliver(connection, "answer", result);
            }
            ClientMessage::IceCandidate(candidate) => {
                let outcome = {
                    let registry = self.inner.registry.lock();
                    pairing::ice_candidate(&registry, connection.id(), &candidate, text)
                };
                if let Some(err) = outcome.sender_error {
                    self.reject(connection, err);
                }
                self.deliver(connection, "ice-candidate", outcome.relay);
            }
        }
    }

    /// Tear down whatever `connection` registered. Safe to call for
    /// connections that never registered or were superseded.
    pub fn disconnect(&self, connection: &ConnectionHandle) {
        let cleanup = {
            let mut registry = self.inner.registry.lock();
            let mut cleanup = registry.release(connection.id());
            record_gauges(&registry);
            self.publish_status(&mut cleanup);
            cleanup
        };

        if cleanup.is_empty() {
            debug!(connection_id = %connection.id(), "connection closed without registration");
            return;
        }
        for (peer_id, role) in &cleanup.removed {
            info!(
                connection_id = %connection.id(),
                %peer_id,
                %role,
                "peer disconnected"
            );
        }
        self.apply(cleanup);
    }

    /// Currently registered streamer identifiers.
    pub fn streamers(&self) -> Vec<PeerId> {
        self.inner.registry.lock().streamer_ids()
    }

    pub fn stats(&self) -> RegistryStats {
        self.inner.registry.lock().stats()
    }

    async fn register(
        &self,
        connection: &ConnectionHandle,
        register: Register,
    ) -> Result<(), SignalError> {
        let identity = self.inner.verifier.verify(&register.jwt).await?;
        if identity.subject != register.uuid.as_str() {
            return Err(AuthError::SubjectMismatch.into());
        }

        let cleanup = {
            let mut registry = self.inner.registry.lock();
            let mut cleanup =
                registry.register(connection.clone(), register.uuid.clone(), register.role);
            record_gauges(&registry);
            self.publish_status(&mut cleanup);
            cleanup
        };

        info!(
            connection_id = %connection.id(),
            peer_id = %register.uuid,
            role = %register.role,
            "peer registered"
        );
        self.apply(cleanup);
        Ok(())
    }

    fn deliver(&self, connection: &ConnectionHandle, kind: &'static str, result: Result<Relay, SignalError>) {
        match result {
            Ok(relay) => {
                counter!("stream_relay_relayed_total", 1, "type" => kind);
                relay.to.send(relay.frame);
            }
            Err(err) => self.reject(connection, err),
        }
    }

    fn reject(&self, connection: &ConnectionHandle, err: SignalError) {
        warn!(
            connection_id = %connection.id(),
            kind = ?err.kind(),
            error = %err,
            "message rejected"
        );
        counter!("stream_relay_rejections_total", 1, "reason" => err.metric_label());
        connection.send_message(&err.to_message());
    }

    /// Only call with the registry lock held. `publish` never waits.
    fn publish_status(&self, cleanup: &mut Cleanup) {
        for update in cleanup.status.drain(..) {
            self.inner.status.publish(update);
        }
    }

    fn apply(&self, cleanup: Cleanup) {
        for notice in cleanup.notices {
            debug!(connection_id = %notice.to.id(), "notifying partner of teardown");
            notice.to.send_message(&notice.message);
        }
    }
}

fn record_gauges(registry: &PeerRegistry) {
    let stats = registry.stats();
    gauge!("stream_relay_streamers_registered", stats.streamers as f64);
    gauge!("stream_relay_viewers_registered", stats.viewers as f64);
    gauge!("stream_relay_pairings_active", stats.pairings as f64);
}
