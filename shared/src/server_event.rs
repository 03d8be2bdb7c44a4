use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connection_id::ConnectionId;

/// Events the server pushes to a browser, one per WebSocket text frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// First frame on every socket: the identifier the server assigned to it.
    Connected { id: ConnectionId },
    StreamerJoined,
    ViewerJoined {
        #[serde(rename = "viewerId")]
        viewer_id: ConnectionId,
    },
    /// A viewer's handshake artifact, delivered to the streamer.
    Signal { from: ConnectionId, signal: Value },
    /// The streamer's handshake artifact, delivered to one viewer.
    StreamerSignal(Value),
    ViewerDisconnected {
        #[serde(rename = "viewerId")]
        viewer_id: ConnectionId,
    },
    StreamerDisconnected,
    Error(String),
}

impl ServerEvent {
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::StreamerJoined => "streamer-joined",
            ServerEvent::ViewerJoined { .. } => "viewer-joined",
            ServerEvent::Signal { .. } => "signal",
            ServerEvent::StreamerSignal(_) => "streamer-signal",
            ServerEvent::ViewerDisconnected { .. } => "viewer-disconnected",
            ServerEvent::StreamerDisconnected => "streamer-disconnected",
            ServerEvent::Error(_) => "error",
        }
    }
}
