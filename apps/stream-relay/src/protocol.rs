use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

const HYPHENATED_LEN: usize = 36;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a hyphenated UUID: {0}")]
pub struct InvalidPeerId(String);

/// Identifier a peer registers under.
///
/// Always UUID-formatted, but kept exactly as the client sent it so relayed
/// envelopes and token subjects compare byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Accepts only the hyphenated 8-4-4-4-12 form. Simple, braced and URN
    /// spellings of the same UUID are rejected so one UUID maps to one peer.
    pub fn parse(raw: &str) -> Result<Self, InvalidPeerId> {
        if raw.len() != HYPHENATED_LEN || Uuid::try_parse(raw).is_err() {
            return Err(InvalidPeerId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Streamer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Streamer => "streamer",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "viewer" => Some(Role::Viewer),
            "streamer" => Some(Role::Streamer),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Messages sent from a peer to the relay
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Register(Register),
    Offer(SessionDescription),
    Answer(SessionDescription),
    IceCandidate(IceCandidate),
}

impl ClientMessage {
    /// Wire discriminant, also used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Register(_) => "register",
            ClientMessage::Offer(_) => "offer",
            ClientMessage::Answer(_) => "answer",
            ClientMessage::IceCandidate(_) => "ice-candidate",
        }
    }

    /// Identifier the sender claims to be.
    pub fn sender(&self) -> &PeerId {
        match self {
            ClientMessage::Register(register) => &register.uuid,
            ClientMessage::Offer(desc) | ClientMessage::Answer(desc) => &desc.uuid,
            ClientMessage::IceCandidate(candidate) => &candidate.uuid,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Register {
    pub uuid: PeerId,
    pub jwt: String,
    pub role: Role,
}

/// Body shared by `offer` and `answer`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDescription {
    pub uuid: PeerId,
    pub to: PeerId,
    pub sdp: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IceCandidate {
    pub uuid: PeerId,
    pub to: PeerId,
    pub candidate: Value,
}

/// Messages sent from the relay to a peer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Error {
        msg: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
}

impl ServerMessage {
    pub fn error(msg: impl Into<String>) -> Self {
        ServerMessage::Error {
            msg: msg.into(),
            field: None,
        }
    }

    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A frame that does not match any known message shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Offending field, `None` when the frame as a whole is unusable.
    pub path: Option<String>,
    pub message: String,
}

impl ValidationError {
    fn frame(message: impl Into<String>) -> Self {
        Self {
            path: None,
            message: message.into(),
        }
    }

    fn field(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: Some(path.to_string()),
            message: message.into(),
        }
    }

    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::Error {
            msg: self.to_string(),
            field: self.path.clone(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "invalid message: `{}` {}", path, self.message),
            None => write!(f, "invalid message: {}", self.message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Parse and validate one inbound text frame.
pub fn parse(text: &str) -> Result<ClientMessage, ValidationError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| ValidationError::frame(format!("is not valid JSON ({err})")))?;
    let Value::Object(object) = value else {
        return Err(ValidationError::frame("must be a JSON object"));
    };
    let fields = Fields(&object);

    match fields.string("type")? {
        "register" => Ok(ClientMessage::Register(Register {
            uuid: fields.peer_id("uuid")?,
            jwt: fields.jwt("jwt")?,
            role: fields.role("role")?,
        })),
        "offer" => Ok(ClientMessage::Offer(fields.session_description()?)),
        "answer" => Ok(ClientMessage::Answer(fields.session_description()?)),
        "ice-candidate" => Ok(ClientMessage::IceCandidate(IceCandidate {
            uuid: fields.peer_id("uuid")?,
            to: fields.peer_id("to")?,
            candidate: fields.present("candidate")?.clone(),
        })),
        other => Err(ValidationError::field(
            "type",
            format!(
                "has unknown value `{other}`, expected one of: register, offer, answer, ice-candidate"
            ),
        )),
    }
}

struct Fields<'a>(&'a Map<String, Value>);

impl<'a> Fields<'a> {
    fn present(&self, name: &str) -> Result<&'a Value, ValidationError> {
        self.0
            .get(name)
            .ok_or_else(|| ValidationError::field(name, "is required"))
    }

    fn string(&self, name: &str) -> Result<&'a str, ValidationError> {
        self.present(name)?
            .as_str()
            .ok_or_else(|| ValidationError::field(name, "must be a string"))
    }

    fn peer_id(&self, name: &str) -> Result<PeerId, ValidationError> {
        let raw = self.string(name)?;
        PeerId::parse(raw).map_err(|_| ValidationError::field(name, "must be a UUID"))
    }

    fn role(&self, name: &str) -> Result<Role, ValidationError> {
        let raw = self.string(name)?;
        Role::parse(raw).ok_or_else(|| {
            ValidationError::field(name, "must be one of: viewer, streamer")
        })
    }

    fn jwt(&self, name: &str) -> Result<String, ValidationError> {
        let raw = self.string(name)?;
        if looks_like_jwt(raw) {
            Ok(raw.to_string())
        } else {
            Err(ValidationError::field(name, "must be a compact JWT"))
        }
    }

    fn session_description(&self) -> Result<SessionDescription, ValidationError> {
        Ok(SessionDescription {
            uuid: self.peer_id("uuid")?,
            to: self.peer_id("to")?,
            sdp: self.string("sdp")?.to_string(),
        })
    }
}

fn looks_like_jwt(raw: &str) -> bool {
    let segments: Vec<&str> = raw.split('.').collect();
    segments.len() == 3
        && segments.iter().all(|segment| {
            !segment.is_empty()
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        })
}
