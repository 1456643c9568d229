#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use jsonwebtoken::{encode, get_current_timestamp, Algorithm, EncodingKey, Header};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use stream_relay::{
    auth::JwtVerifier,
    hub::SignalingHub,
    registry::ConnectionHandle,
    status::{StatusError, StatusNotifier, StatusService, StatusUpdate},
};

pub const SECRET: &[u8] = b"integration-secret";

pub const S1: &str = "0b7f8f3e-1c2d-4e5f-8a9b-0c1d2e3f4a5b";
pub const V1: &str = "6f1c9d9e-3a52-4d0b-9a55-0a9a3f4d2b11";
pub const V2: &str = "9a0e5c8d-7b6a-4f3e-9d2c-1b0a9f8e7d6c";
pub const GHOST: &str = "00000000-0000-4000-8000-000000000000";

#[derive(Serialize)]
struct Claims<'a> {
    sub: &'a str,
    exp: u64,
}

pub fn token(subject: &str) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        &Claims {
            sub: subject,
            exp: get_current_timestamp() + 600,
        },
        &EncodingKey::from_secret(SECRET),
    )
    .expect("sign token")
}

pub fn register_frame(uuid: &str, role: &str) -> String {
    register_frame_with_token(uuid, role, &token(uuid))
}

pub fn register_frame_with_token(uuid: &str, role: &str, jwt: &str) -> String {
    json!({ "type": "register", "uuid": uuid, "jwt": jwt, "role": role }).to_string()
}

pub fn offer_frame(from: &str, to: &str, sdp: &str) -> String {
    json!({ "type": "offer", "uuid": from, "to": to, "sdp": sdp }).to_string()
}

pub fn answer_frame(from: &str, to: &str, sdp: &str) -> String {
    json!({ "type": "answer", "uuid": from, "to": to, "sdp": sdp }).to_string()
}

pub fn ice_frame(from: &str, to: &str, candidate: Value) -> String {
    json!({ "type": "ice-candidate", "uuid": from, "to": to, "candidate": candidate }).to_string()
}

pub struct RecordingStatus(pub UnboundedSender<StatusUpdate>);

#[async_trait]
impl StatusService for RecordingStatus {
    async fn notify(&self, update: &StatusUpdate) -> Result<(), StatusError> {
        let _ = self.0.send(update.clone());
        Ok(())
    }
}

pub struct Harness {
    pub hub: SignalingHub,
    pub status: UnboundedReceiver<StatusUpdate>,
}

/// Hub backed by the real JWT verifier and a status service that records
/// every update it is sent. Must be called inside a Tokio runtime.
pub fn harness() -> Harness {
    let (tx, status) = mpsc::unbounded_channel();
    let (notifier, _worker) = StatusNotifier::spawn(Arc::new(RecordingStatus(tx)), 64);
    let hub = SignalingHub::new(Arc::new(JwtVerifier::new(SECRET, None, None)), notifier);
    Harness { hub, status }
}

impl Harness {
    pub async fn next_status(&mut self) -> StatusUpdate {
        tokio::time::timeout(Duration::from_secs(2), self.status.recv())
            .await
            .expect("status update timed out")
            .expect("status channel closed")
    }
}

pub struct Peer {
    pub conn: ConnectionHandle,
    pub rx: UnboundedReceiver<String>,
}

impl Peer {
    pub fn new() -> Self {
        let (conn, rx) = ConnectionHandle::channel();
        Self { conn, rx }
    }

    pub async fn send(&self, hub: &SignalingHub, frame: &str) {
        hub.handle_text(&self.conn, frame).await;
    }

    pub async fn recv(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(2), self.rx.recv())
            .await
            .expect("frame timed out")
            .expect("connection channel closed")
    }

    pub async fn recv_json(&mut self) -> Value {
        serde_json::from_str(&self.recv().await).expect("frame is JSON")
    }

    pub async fn expect_error(&mut self, msg: &str) {
        let frame = self.recv_json().await;
        assert_eq!(frame["type"], "error", "unexpected frame {frame}");
        assert_eq!(frame["msg"], msg, "unexpected frame {frame}");
    }

    pub fn assert_silent(&mut self) {
        if let Ok(frame) = self.rx.try_recv() {
            panic!("expected no frame, got {frame}");
        }
    }
}
