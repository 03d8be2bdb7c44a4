use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{connection_id::ConnectionId, role::Role};

const STREAMER_TARGET: &str = "streamer";

/// Destination of a relayed handshake artifact.
///
/// Viewers only ever address `"streamer"`; the streamer addresses individual
/// viewers by the identifier it learned from `viewer-joined`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SignalTarget {
    Streamer,
    Connection(ConnectionId),
}

impl From<String> for SignalTarget {
    fn from(target: String) -> Self {
        if target == STREAMER_TARGET {
            SignalTarget::Streamer
        } else {
            SignalTarget::Connection(ConnectionId::new(target))
        }
    }
}

impl From<SignalTarget> for String {
    fn from(target: SignalTarget) -> Self {
        match target {
            SignalTarget::Streamer => STREAMER_TARGET.to_string(),
            SignalTarget::Connection(id) => id.as_str().to_string(),
        }
    }
}

impl fmt::Display for SignalTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalTarget::Streamer => f.write_str(STREAMER_TARGET),
            SignalTarget::Connection(id) => write!(f, "{}", id),
        }
    }
}

/// Events a browser sends to the server, one per WebSocket text frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Join {
        room: String,
        role: Role,
    },
    Signal {
        to: SignalTarget,
        signal: Value,
        room: String,
    },
    Leave {
        room: String,
    },
}

impl ClientEvent {
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Join { .. } => "join",
            ClientEvent::Signal { .. } => "signal",
            ClientEvent::Leave { .. } => "leave",
        }
    }
}
