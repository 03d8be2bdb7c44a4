use core::error::Error;

use futures::{SinkExt, StreamExt};
use log::{debug, info};
use shared::{connection_id::ConnectionId, server_event::ServerEvent};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};

use crate::{coordinator_task::CoordinatorHandle, event_handler::EventHandler};

pub struct WsHandler;

impl WsHandler {
    /// Serves one browser tab until its socket closes.
    ///
    /// `current_connection_option` is filled as soon as the coordinator assigns an
    /// identifier, so the caller can report the disconnect however this returns.
    pub async fn handle_stream(
        stream: TcpStream,
        current_connection_option: &mut Option<ConnectionId>,
        coordinator: CoordinatorHandle,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let ws_stream = accept_async(stream).await?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerEvent>();

        let connection_id = coordinator.connect(outbound_tx).await?;
        *current_connection_option = Some(connection_id.clone());
        info!("{} has connected!", connection_id);

        loop {
            tokio::select! {

                incoming = ws_rx.next() => {

                    let message = match incoming {
                        None => return Ok(()),
                        Some(message) => message?,
                    };

                    let reply = match message {
                        Message::Text(text) => {
                            EventHandler::handle_text(&text, &connection_id, &coordinator).await?
                        }
                        Message::Binary(_) => Some(ServerEvent::Error(
                            "Malformed request: binary frames are not supported".to_string(),
                        )),
                        Message::Close(_) => return Ok(()),
                        _ => None,
                    };

                    if let Some(reply) = reply {
                        ws_tx.send(Message::Text(reply.to_text()?)).await?;
                    }
                }

                outgoing = outbound_rx.recv() => {

                    let outgoing_event = match outgoing {
                        Some(event) => event,
                        None => return Ok(()),
                    };

                    debug!("Sending {} to {}", outgoing_event.name(), connection_id);
                    ws_tx.send(Message::Text(outgoing_event.to_text()?)).await?;
                }
            }
        }
    }
}
