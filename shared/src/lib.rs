pub mod client_event;
pub mod connection_id;
pub mod role;
pub mod server_event;

pub const SIGNAL_PORT: u16 = 8040;

pub const MAX_ROOM_CODE_LENGTH: usize = 64;

/// Checks a caller-supplied room code, returning a message fit for the client on failure.
///
/// Codes are opaque: any non-empty text up to the length limit is accepted.
pub fn validate_room_code(room: &str) -> Result<(), String> {
    if room.is_empty() {
        return Err("Room code must not be empty.".to_string());
    }

    if room.chars().count() > MAX_ROOM_CODE_LENGTH {
        return Err(format!(
            "Room code must be less than or equal to {} characters.",
            MAX_ROOM_CODE_LENGTH
        ));
    }

    Ok(())
}
