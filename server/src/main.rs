mod coordinator;
mod coordinator_task;
mod error;
mod event_handler;
mod room;
mod signal_server;
mod ws_handler;

use std::time::Duration;

use log::{error, info};
use shared::SIGNAL_PORT;

use clap::Parser;

use crate::{
    coordinator::CoordinatorOptions,
    signal_server::{ServerConfig, SignalServer},
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(short, long, default_value_t = SIGNAL_PORT)]
    port: u16,

    /// Do not send a new streamer the viewers already waiting in its room
    #[arg(long)]
    skip_waiting_viewers: bool,

    /// Keep a room and its viewers alive after the streamer leaves
    #[arg(long)]
    keep_viewers_on_streamer_leave: bool,

    #[arg(long, default_value_t = 1024)]
    queue_capacity: usize,

    /// Seconds between room statistics log lines, 0 disables them
    #[arg(long, default_value_t = 60)]
    stats_interval: u64,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            options: CoordinatorOptions {
                announce_waiting_viewers: !self.skip_waiting_viewers,
                keep_viewers_on_streamer_leave: self.keep_viewers_on_streamer_leave,
            },
            queue_capacity: self.queue_capacity,
            stats_interval: match self.stats_interval {
                0 => None,
                seconds => Some(Duration::from_secs(seconds)),
            },
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let addr = format!("{}:{}", args.host, args.port);

    let server = match SignalServer::bind(addr.clone(), args.server_config()).await {
        Ok(signal_server) => signal_server,
        Err(e) => {
            error!("Error binding: {}", e);
            return;
        }
    };

    match server.local_addr() {
        Ok(local_addr) => info!("Signaling server listening on ws://{}", local_addr),
        Err(_) => info!("Signaling server listening on ws://{}", addr),
    }

    match server.listen().await {
        Ok(_) => (),
        Err(e) => {
            error!("{}", e);
            return;
        }
    };
}
