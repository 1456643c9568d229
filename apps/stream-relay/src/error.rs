use thiserror::Error;

use crate::{
    auth::AuthError,
    protocol::{ServerMessage, ValidationError},
};

/// Broad class of a rejected message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Auth,
    Lookup,
    StateConflict,
}

/// Everything that can go wrong with a single inbound message. Each variant
/// is reported back to the sender; none of them affect other connections.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Invalid JWT: {0}")]
    Auth(#[from] AuthError),
    #[error("No viewer found")]
    NoViewer,
    #[error("Viewer is busy")]
    ViewerBusy,
    #[error("Streamer not found")]
    StreamerNotFound,
    #[error("Streamer is busy")]
    StreamerBusy,
    #[error("Unregistered sender")]
    UnregisteredSender,
    #[error("Recipient not found")]
    RecipientNotFound,
}

impl SignalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SignalError::Validation(_) => ErrorKind::Validation,
            SignalError::Auth(_) => ErrorKind::Auth,
            SignalError::NoViewer
            | SignalError::StreamerNotFound
            | SignalError::UnregisteredSender
            | SignalError::RecipientNotFound => ErrorKind::Lookup,
            SignalError::ViewerBusy | SignalError::StreamerBusy => ErrorKind::StateConflict,
        }
    }

    pub fn metric_label(&self) -> &'static str {
        match self {
            SignalError::Validation(_) => "invalid_message",
            SignalError::Auth(err) => err.metric_label(),
            SignalError::NoViewer => "no_viewer",
            SignalError::ViewerBusy => "viewer_busy",
            SignalError::StreamerNotFound => "streamer_not_found",
            SignalError::StreamerBusy => "streamer_busy",
            SignalError::UnregisteredSender => "unregistered_sender",
            SignalError::RecipientNotFound => "recipient_not_found",
        }
    }

    pub fn to_message(&self) -> ServerMessage {
        match self {
            SignalError::Validation(err) => err.to_message(),
            other => ServerMessage::error(other.to_string()),
        }
    }
}
