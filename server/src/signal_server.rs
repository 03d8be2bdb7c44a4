use core::error::Error;
use std::{net::SocketAddr, time::Duration};

use log::{error, info, warn};
use tokio::net::TcpListener;

use crate::{
    coordinator::CoordinatorOptions,
    coordinator_task::{CoordinatorHandle, CoordinatorTask},
    ws_handler::WsHandler,
};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub options: CoordinatorOptions,
    pub queue_capacity: usize,
    pub stats_interval: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            options: CoordinatorOptions::default(),
            queue_capacity: 1024,
            stats_interval: None,
        }
    }
}

pub struct SignalServer {
    tcp_listener: TcpListener,
    coordinator: CoordinatorHandle,
}

impl SignalServer {
    pub async fn bind(addr: String, config: ServerConfig) -> Result<Self, Box<dyn Error>> {
        let tcp_listener = TcpListener::bind(addr).await?;

        let coordinator =
            CoordinatorTask::spawn(config.options, config.queue_capacity, config.stats_interval);

        Ok(Self {
            tcp_listener,
            coordinator,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.tcp_listener.local_addr()
    }

    /// Accepts connections until Ctrl-C.
    pub async fn listen(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        loop {
            tokio::select! {

                _ = tokio::signal::ctrl_c() => {

                    info!("Shutting down");
                    return Ok(());
                }

                result = self.tcp_listener.accept() => {

                    let (tcp_socket, peer_addr) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("Error accepting connection: {}", e);
                            continue;
                        }
                    };

                    let coordinator = self.coordinator.clone();

                    tokio::spawn(async move {

                        let mut current_connection_option = None;

                        if let Err(e) = WsHandler::handle_stream(tcp_socket, &mut current_connection_option, coordinator.clone()).await {

                            error!("Error handling connection from {}: {}", peer_addr, e);
                        }

                        if let Some(connection_id) = current_connection_option.take() {

                            if let Err(e) = coordinator.disconnect(&connection_id).await {
                                error!("Error cleaning up {}: {}", connection_id, e);
                            }
                            info!("{} has disconnected", connection_id);
                        }
                    });
                }
            }
        }
    }
}
