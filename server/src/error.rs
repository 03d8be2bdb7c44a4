use thiserror::Error;

/// Failures of a room operation. None of them is fatal to the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("Room {room} already has a streamer.")]
    RoleConflict { room: String },

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Never surfaced to clients; the recipient most likely left a moment earlier.
    #[error("No route to {target} in room {room}")]
    UnroutableSignal { room: String, target: String },
}
