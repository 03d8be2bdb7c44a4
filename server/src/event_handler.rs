use core::error::Error;

use log::{debug, info};
use shared::{client_event::ClientEvent, connection_id::ConnectionId, server_event::ServerEvent};

use crate::{coordinator_task::CoordinatorHandle, error::CoordinatorError};

pub struct EventHandler {}

impl EventHandler {
    /// Parses one text frame and forwards it to the coordinator.
    ///
    /// Returns the reply owed to the sender when the frame is rejected before
    /// reaching the room table.
    pub async fn handle_text(
        text: &str,
        connection_id: &ConnectionId,
        coordinator: &CoordinatorHandle,
    ) -> Result<Option<ServerEvent>, Box<dyn Error + Send + Sync>> {
        let incoming_event = match ClientEvent::from_text(text) {
            Ok(event) => event,
            Err(e) => {
                info!("{} sent a malformed request: {}", connection_id, e);

                let error = CoordinatorError::MalformedRequest(e.to_string());
                return Ok(Some(ServerEvent::Error(error.to_string())));
            }
        };

        debug!("{} sent {}", connection_id, incoming_event.name());

        match incoming_event {
            ClientEvent::Join { room, role } => {
                coordinator.join(connection_id, room, role).await?;
            }
            ClientEvent::Signal { to, signal, room } => {
                coordinator.signal(connection_id, room, to, signal).await?;
            }
            ClientEvent::Leave { room } => {
                coordinator.leave(connection_id, room).await?;
            }
        }

        Ok(None)
    }
}
