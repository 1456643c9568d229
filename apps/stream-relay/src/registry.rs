use std::{collections::HashMap, fmt};

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    protocol::{PeerId, Role, ServerMessage},
    status::StatusUpdate,
};

pub const VIEWER_DISCONNECTED: &str = "Viewer disconnected";
pub const STREAMER_DISCONNECTED: &str = "Streamer disconnected";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Send side of one client connection.
///
/// The transport owns the socket and the receiving end; the registry only
/// keeps this handle to look peers up and push text frames at them.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<String>,
}

impl ConnectionHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: ConnectionId::new(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame; a connection that already went away is skipped.
    pub fn send(&self, text: String) {
        if self.tx.send(text).is_err() {
            debug!(connection_id = %self.id, "dropping frame for closed connection");
        }
    }

    pub fn send_message(&self, message: &ServerMessage) {
        match message.to_text() {
            Ok(text) => self.send(text),
            Err(err) => warn!(connection_id = %self.id, error = %err, "failed to encode reply"),
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionHandle").field(&self.id).finish()
    }
}

#[derive(Debug, Clone)]
pub struct StreamerRecord {
    pub id: PeerId,
    pub connection: ConnectionHandle,
    pub paired_viewer: Option<PeerId>,
}

#[derive(Debug, Clone)]
pub struct ViewerRecord {
    pub id: PeerId,
    pub connection: ConnectionHandle,
    pub paired_streamer: Option<PeerId>,
}

/// Frame owed to a surviving partner after a teardown.
#[derive(Debug, Clone)]
pub struct Notice {
    pub to: ConnectionHandle,
    pub message: ServerMessage,
}

/// Side effects of removing records. The caller queues `status` before it
/// releases the registry and sends `notices` afterwards.
#[derive(Debug, Default)]
pub struct Cleanup {
    pub notices: Vec<Notice>,
    pub status: Vec<StatusUpdate>,
    pub removed: Vec<(PeerId, Role)>,
}

impl Cleanup {
    pub fn is_empty(&self) -> bool {
        self.notices.is_empty() && self.status.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RegistryStats {
    pub streamers: usize,
    pub viewers: usize,
    pub pairings: usize,
    pub connections: usize,
}

/// Live streamers and viewers plus the connection that owns each of them.
///
/// Every pairing is stored on both records; mutations go through methods
/// that set or clear both sides together.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    bindings: HashMap<ConnectionId, PeerId>,
    streamers: HashMap<PeerId, StreamerRecord>,
    viewers: HashMap<PeerId, ViewerRecord>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn streamer(&self, id: &PeerId) -> Option<&StreamerRecord> {
        self.streamers.get(id)
    }

    pub fn viewer(&self, id: &PeerId) -> Option<&ViewerRecord> {
        self.viewers.get(id)
    }

    /// Streamer record for `id` if it belongs to `connection`.
    pub fn owned_streamer(&self, connection: ConnectionId, id: &PeerId) -> Option<&StreamerRecord> {
        self.streamers
            .get(id)
            .filter(|record| record.connection.id() == connection)
    }

    /// Viewer record for `id` if it belongs to `connection`.
    pub fn owned_viewer(&self, connection: ConnectionId, id: &PeerId) -> Option<&ViewerRecord> {
        self.viewers
            .get(id)
            .filter(|record| record.connection.id() == connection)
    }

    /// Connection currently registered under `id`, as either role.
    pub fn connection_for(&self, id: &PeerId) -> Option<&ConnectionHandle> {
        self.streamers
            .get(id)
            .map(|record| &record.connection)
            .or_else(|| self.viewers.get(id).map(|record| &record.connection))
    }

    pub fn bound_peer(&self, connection: ConnectionId) -> Option<&PeerId> {
        self.bindings.get(&connection)
    }

    pub fn streamer_ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.streamers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            streamers: self.streamers.len(),
            viewers: self.viewers.len(),
            pairings: self
                .streamers
                .values()
                .filter(|record| record.paired_viewer.is_some())
                .count(),
            connections: self.bindings.len(),
        }
    }

    /// Pair an idle viewer with an idle streamer. Returns false, changing
    /// nothing, unless both exist and both are unpaired.
    pub fn pair(&mut self, viewer: &PeerId, streamer: &PeerId) -> bool {
        let idle_viewer = self
            .viewers
            .get(viewer)
            .is_some_and(|record| record.paired_streamer.is_none());
        let idle_streamer = self
            .streamers
            .get(streamer)
            .is_some_and(|record| record.paired_viewer.is_none());
        if !(idle_viewer && idle_streamer) {
            return false;
        }

        if let Some(record) = self.viewers.get_mut(viewer) {
            record.paired_streamer = Some(streamer.clone());
        }
        if let Some(record) = self.streamers.get_mut(streamer) {
            record.paired_viewer = Some(viewer.clone());
        }
        true
    }

    /// Register `id` under `role` for `connection`, replacing whatever was
    /// there before.
    ///
    /// Any record for `id` held by a different connection is torn down and
    /// that connection is unbound, so its eventual close cannot touch the
    /// new owner. A connection that switches identifiers releases its old
    /// one first.
    pub fn register(&mut self, connection: ConnectionHandle, id: PeerId, role: Role) -> Cleanup {
        let mut cleanup = Cleanup::default();
        let conn_id = connection.id();

        if self.bindings.get(&conn_id).is_some_and(|bound| *bound != id) {
            cleanup = self.release(conn_id);
        }

        let stale_streamer = self
            .streamers
            .get(&id)
            .is_some_and(|record| role == Role::Streamer || record.connection.id() != conn_id);
        if stale_streamer {
            self.evict_streamer(&id, &mut cleanup);
        }
        let stale_viewer = self
            .viewers
            .get(&id)
            .is_some_and(|record| role == Role::Viewer || record.connection.id() != conn_id);
        if stale_viewer {
            self.evict_viewer(&id, &mut cleanup);
        }

        let orphaned: Vec<ConnectionId> = self
            .bindings
            .iter()
            .filter(|(bound_conn, bound_id)| **bound_conn != conn_id && **bound_id == id)
            .map(|(bound_conn, _)| *bound_conn)
            .collect();
        for stale in orphaned {
            debug!(peer_id = %id, connection_id = %stale, "unbinding superseded connection");
            self.bindings.remove(&stale);
        }

        self.bindings.insert(conn_id, id.clone());
        match role {
            Role::Streamer => {
                self.streamers.insert(
                    id.clone(),
                    StreamerRecord {
                        id: id.clone(),
                        connection,
                        paired_viewer: None,
                    },
                );
                cleanup.status.retain(|update| update.peer_id != id);
                cleanup.status.push(StatusUpdate::available(id));
            }
            Role::Viewer => {
                self.viewers.insert(
                    id.clone(),
                    ViewerRecord {
                        id,
                        connection,
                        paired_streamer: None,
                    },
                );
            }
        }

        cleanup
    }

    /// Drop everything `connection` registered. Unknown connections are a
    /// no-op.
    pub fn release(&mut self, connection: ConnectionId) -> Cleanup {
        let mut cleanup = Cleanup::default();
        let Some(id) = self.bindings.remove(&connection) else {
            return cleanup;
        };

        if self.owned_viewer(connection, &id).is_some() {
            self.evict_viewer(&id, &mut cleanup);
        }
        if self.owned_streamer(connection, &id).is_some() {
            self.evict_streamer(&id, &mut cleanup);
        }
        cleanup
    }

    fn evict_viewer(&mut self, id: &PeerId, cleanup: &mut Cleanup) {
        let Some(viewer) = self.viewers.remove(id) else {
            return;
        };
        cleanup.removed.push((viewer.id.clone(), Role::Viewer));

        let Some(partner_id) = viewer.paired_streamer else {
            return;
        };
        if let Some(streamer) = self.streamers.get_mut(&partner_id) {
            if streamer.paired_viewer.as_ref() == Some(id) {
                streamer.paired_viewer = None;
                cleanup.notices.push(Notice {
                    to: streamer.connection.clone(),
                    message: ServerMessage::error(VIEWER_DISCONNECTED),
                });
            }
        }
    }

    fn evict_streamer(&mut self, id: &PeerId, cleanup: &mut Cleanup) {
        let Some(streamer) = self.streamers.remove(id) else {
            return;
        };
        cleanup.removed.push((streamer.id.clone(), Role::Streamer));
        cleanup.status.push(StatusUpdate::unavailable(streamer.id.clone()));

        let Some(partner_id) = streamer.paired_viewer else {
            return;
        };
        if let Some(viewer) = self.viewers.get_mut(&partner_id) {
            if viewer.paired_streamer.as_ref() == Some(id) {
                viewer.paired_streamer = None;
                cleanup.notices.push(Notice {
                    to: viewer.connection.clone(),
                    message: ServerMessage::error(STREAMER_DISCONNECTED),
                });
            }
        }
    }
}
