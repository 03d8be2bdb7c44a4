use core::error::Error;
use std::{collections::HashMap, time::Duration};

use log::{debug, info, warn};
use rand::{Rng, distr::Alphanumeric, rng};
use serde_json::Value;
use shared::{
    client_event::SignalTarget, connection_id::ConnectionId, role::Role,
    server_event::ServerEvent,
};
use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, Interval, MissedTickBehavior, interval_at},
};

use crate::coordinator::{CoordinatorOptions, Delivery, RoomCoordinator};

const CONNECTION_ID_LENGTH: usize = 16;

pub type Outbound = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub streamer: Option<ConnectionId>,
    pub viewers: Vec<ConnectionId>,
}

pub enum Command {
    Connect {
        outbound: Outbound,
        reply: oneshot::Sender<ConnectionId>,
    },
    Join {
        connection_id: ConnectionId,
        room: String,
        role: Role,
    },
    Signal {
        connection_id: ConnectionId,
        room: String,
        to: SignalTarget,
        signal: Value,
    },
    Leave {
        connection_id: ConnectionId,
        room: String,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    Inspect {
        room: String,
        reply: oneshot::Sender<Option<RoomSnapshot>>,
    },
}

/// Cloneable front door to the task that owns the room table.
#[derive(Clone)]
pub struct CoordinatorHandle {
    command_tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    /// Registers a live connection and returns the identifier assigned to it.
    pub async fn connect(
        &self,
        outbound: Outbound,
    ) -> Result<ConnectionId, Box<dyn Error + Send + Sync>> {
        let (reply, reply_rx) = oneshot::channel();

        self.send(Command::Connect { outbound, reply }).await?;

        Ok(reply_rx.await?)
    }

    pub async fn join(
        &self,
        connection_id: &ConnectionId,
        room: String,
        role: Role,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.send(Command::Join {
            connection_id: connection_id.clone(),
            room,
            role,
        })
        .await
    }

    pub async fn signal(
        &self,
        connection_id: &ConnectionId,
        room: String,
        to: SignalTarget,
        signal: Value,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.send(Command::Signal {
            connection_id: connection_id.clone(),
            room,
            to,
            signal,
        })
        .await
    }

    pub async fn leave(
        &self,
        connection_id: &ConnectionId,
        room: String,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.send(Command::Leave {
            connection_id: connection_id.clone(),
            room,
        })
        .await
    }

    pub async fn disconnect(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.send(Command::Disconnect {
            connection_id: connection_id.clone(),
        })
        .await
    }

    /// Answers only after every command queued before it has been applied.
    pub async fn inspect(
        &self,
        room: &str,
    ) -> Result<Option<RoomSnapshot>, Box<dyn Error + Send + Sync>> {
        let (reply, reply_rx) = oneshot::channel();

        self.send(Command::Inspect {
            room: room.to_string(),
            reply,
        })
        .await?;

        Ok(reply_rx.await?)
    }

    async fn send(&self, command: Command) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| "Room coordinator has stopped".into())
    }
}

pub struct CoordinatorTask {
    coordinator: RoomCoordinator,
    outbound: HashMap<ConnectionId, Outbound>,
    command_rx: mpsc::Receiver<Command>,
    stats_interval: Option<Duration>,
}

impl CoordinatorTask {
    pub fn spawn(
        options: CoordinatorOptions,
        queue_capacity: usize,
        stats_interval: Option<Duration>,
    ) -> CoordinatorHandle {
        let (command_tx, command_rx) = mpsc::channel(queue_capacity.max(1));

        let task = Self {
            coordinator: RoomCoordinator::new(options),
            outbound: HashMap::new(),
            command_rx,
            stats_interval,
        };

        tokio::spawn(task.run());

        CoordinatorHandle { command_tx }
    }

    async fn run(mut self) {
        let mut stats_timer = self.stats_interval.and_then(|period| {
            let Some(start) = Instant::now().checked_add(period) else {
                warn!("Stats interval {:?} is out of range, stats disabled", period);
                return None;
            };

            let mut timer = interval_at(start, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(timer)
        });

        loop {
            tokio::select! {

                command = self.command_rx.recv() => {

                    match command {
                        Some(command) => self.handle_command(command),
                        None => break,
                    }
                }

                _ = Self::next_tick(&mut stats_timer) => {

                    info!(
                        "{} rooms, {} members, {} connections",
                        self.coordinator.room_count(),
                        self.coordinator.member_count(),
                        self.outbound.len()
                    );
                }
            }
        }

        info!("Room coordinator stopped");
    }

    async fn next_tick(timer: &mut Option<Interval>) {
        match timer {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending().await,
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { outbound, reply } => {
                let connection_id = self.generate_connection_id();

                if outbound
                    .send(ServerEvent::Connected {
                        id: connection_id.clone(),
                    })
                    .is_err()
                {
                    debug!("{} closed before registering, dropping it", connection_id);
                    return;
                }

                self.outbound.insert(connection_id.clone(), outbound);

                if reply.send(connection_id.clone()).is_err() {
                    self.outbound.remove(&connection_id);
                }
            }
            Command::Join {
                connection_id,
                room,
                role,
            } => match self.coordinator.join(&room, role, &connection_id) {
                Ok(deliveries) => self.dispatch(deliveries),
                Err(e) => self.dispatch(vec![Delivery {
                    to: connection_id,
                    event: ServerEvent::Error(e.to_string()),
                }]),
            },
            Command::Signal {
                connection_id,
                room,
                to,
                signal,
            } => {
                let deliveries = self.coordinator.signal(&room, &to, signal, &connection_id);
                self.dispatch(deliveries);
            }
            Command::Leave {
                connection_id,
                room,
            } => {
                let deliveries = self.coordinator.leave(&room, &connection_id);
                self.dispatch(deliveries);
            }
            Command::Disconnect { connection_id } => {
                self.outbound.remove(&connection_id);
                let deliveries = self.coordinator.disconnect(&connection_id);
                self.dispatch(deliveries);
            }
            Command::Inspect { room, reply } => {
                let snapshot = self.coordinator.room(&room).map(|room| RoomSnapshot {
                    streamer: room.streamer().cloned(),
                    viewers: room.viewers().cloned().collect(),
                });

                let _ = reply.send(snapshot);
            }
        }
    }

    fn dispatch(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            let event_name = delivery.event.name();

            match self.outbound.get(&delivery.to) {
                Some(outbound) => {
                    if outbound.send(delivery.event).is_err() {
                        debug!("{} is gone, dropping {}", delivery.to, event_name);
                    }
                }
                None => debug!("{} is not connected, dropping {}", delivery.to, event_name),
            }
        }
    }

    fn generate_connection_id(&self) -> ConnectionId {
        loop {
            let id: String = rng()
                .sample_iter(&Alphanumeric)
                .take(CONNECTION_ID_LENGTH)
                .map(char::from)
                .collect();

            let connection_id = ConnectionId::new(id);

            if !self.outbound.contains_key(&connection_id) {
                return connection_id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn connect(
        handle: &CoordinatorHandle,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (outbound, mut events) = mpsc::unbounded_channel();
        let connection_id = handle.connect(outbound).await.unwrap();

        assert_eq!(
            events.recv().await,
            Some(ServerEvent::Connected {
                id: connection_id.clone()
            })
        );

        (connection_id, events)
    }

    #[tokio::test]
    async fn assigns_distinct_identifiers() {
        let handle = CoordinatorTask::spawn(CoordinatorOptions::default(), 16, None);

        let (first, _first_events) = connect(&handle).await;
        let (second, _second_events) = connect(&handle).await;

        assert_ne!(first, second);
        assert_eq!(first.as_str().len(), CONNECTION_ID_LENGTH);
    }

    #[tokio::test]
    async fn connection_closed_before_registration_is_not_kept() {
        let handle = CoordinatorTask::spawn(CoordinatorOptions::default(), 16, None);

        let (outbound, events) = mpsc::unbounded_channel();
        drop(events);

        assert!(handle.connect(outbound).await.is_err());

        // The task is still serving everyone else.
        let (_connection_id, _events) = connect(&handle).await;
    }

    #[tokio::test]
    async fn out_of_range_stats_interval_disables_stats() {
        let handle = CoordinatorTask::spawn(
            CoordinatorOptions::default(),
            16,
            Some(Duration::from_secs(u64::MAX)),
        );

        let (connection_id, _events) = connect(&handle).await;
        handle.join(&connection_id, "R1".to_string(), Role::Viewer).await.unwrap();

        let snapshot = handle.inspect("R1").await.unwrap().unwrap();
        assert_eq!(snapshot.viewers, vec![connection_id]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_streamer_joins_have_exactly_one_winner() {
        const CONTENDERS: usize = 32;

        let handle = CoordinatorTask::spawn(CoordinatorOptions::default(), 16, None);

        let mut contenders = Vec::with_capacity(CONTENDERS);
        for _ in 0..CONTENDERS {
            contenders.push(connect(&handle).await);
        }

        let joins: Vec<_> = contenders
            .iter()
            .map(|(connection_id, _)| {
                let handle = handle.clone();
                let connection_id = connection_id.clone();

                tokio::spawn(async move {
                    handle
                        .join(&connection_id, "R".to_string(), Role::Streamer)
                        .await
                        .unwrap();
                })
            })
            .collect();

        for join in joins {
            join.await.unwrap();
        }

        let snapshot = handle.inspect("R").await.unwrap().unwrap();
        let winner = snapshot.streamer.clone().unwrap();
        assert!(snapshot.viewers.is_empty());

        let mut errors = 0;
        for (connection_id, events) in contenders.iter_mut() {
            match events.try_recv() {
                Ok(ServerEvent::Error(message)) => {
                    assert_ne!(*connection_id, winner);
                    assert_eq!(message, "Room R already has a streamer.");
                    errors += 1;
                }
                Ok(other) => panic!("unexpected event {:?}", other),
                Err(_) => assert_eq!(*connection_id, winner),
            }
        }

        assert_eq!(errors, CONTENDERS - 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn disconnect_racing_a_join_leaves_a_consistent_room() {
        let handle = CoordinatorTask::spawn(CoordinatorOptions::default(), 64, None);

        for round in 0..50 {
            let room = format!("RACE{}", round);

            let (streamer, _streamer_events) = connect(&handle).await;
            let (viewer, _viewer_events) = connect(&handle).await;

            let streamer_side = {
                let handle = handle.clone();
                let streamer = streamer.clone();
                let room = room.clone();

                tokio::spawn(async move {
                    handle.join(&streamer, room, Role::Streamer).await.unwrap();
                    handle.disconnect(&streamer).await.unwrap();
                })
            };

            let viewer_side = {
                let handle = handle.clone();
                let viewer = viewer.clone();
                let room = room.clone();

                tokio::spawn(async move {
                    handle.join(&viewer, room, Role::Viewer).await.unwrap();
                })
            };

            streamer_side.await.unwrap();
            viewer_side.await.unwrap();

            // Either the room closed with the streamer, or the viewer arrived
            // afterwards and waits alone.
            match handle.inspect(&room).await.unwrap() {
                None => {}
                Some(snapshot) => {
                    assert_eq!(snapshot.streamer, None);
                    assert_eq!(snapshot.viewers, vec![viewer.clone()]);
                }
            }

            // The dropped streamer can never be routed to again.
            handle
                .signal(&viewer, room.clone(), SignalTarget::Streamer, json!(null))
                .await
                .unwrap();
            handle.disconnect(&viewer).await.unwrap();
            assert_eq!(handle.inspect(&room).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn relays_handshake_between_streamer_and_viewer() {
        let handle = CoordinatorTask::spawn(CoordinatorOptions::default(), 16, None);

        let (viewer, mut viewer_events) = connect(&handle).await;
        let (streamer, mut streamer_events) = connect(&handle).await;

        handle.join(&viewer, "ABC1".to_string(), Role::Viewer).await.unwrap();
        handle
            .join(&streamer, "ABC1".to_string(), Role::Streamer)
            .await
            .unwrap();

        assert_eq!(viewer_events.recv().await, Some(ServerEvent::StreamerJoined));
        assert_eq!(
            streamer_events.recv().await,
            Some(ServerEvent::ViewerJoined {
                viewer_id: viewer.clone()
            })
        );

        handle
            .signal(&viewer, "ABC1".to_string(), SignalTarget::Streamer, json!({"sdp": "offer"}))
            .await
            .unwrap();
        assert_eq!(
            streamer_events.recv().await,
            Some(ServerEvent::Signal {
                from: viewer.clone(),
                signal: json!({"sdp": "offer"}),
            })
        );

        handle
            .signal(
                &streamer,
                "ABC1".to_string(),
                SignalTarget::Connection(viewer.clone()),
                json!({"sdp": "answer"}),
            )
            .await
            .unwrap();
        assert_eq!(
            viewer_events.recv().await,
            Some(ServerEvent::StreamerSignal(json!({"sdp": "answer"})))
        );
    }

    #[tokio::test]
    async fn role_conflict_is_reported_to_requester_only() {
        let handle = CoordinatorTask::spawn(CoordinatorOptions::default(), 16, None);

        let (first, mut first_events) = connect(&handle).await;
        let (second, mut second_events) = connect(&handle).await;

        handle.join(&first, "ROOM9".to_string(), Role::Streamer).await.unwrap();
        handle
            .join(&second, "ROOM9".to_string(), Role::Streamer)
            .await
            .unwrap();

        assert_eq!(
            second_events.recv().await,
            Some(ServerEvent::Error("Room ROOM9 already has a streamer.".to_string()))
        );

        let snapshot = handle.inspect("ROOM9").await.unwrap().unwrap();
        assert_eq!(snapshot.streamer, Some(first));
        assert!(first_events.try_recv().is_err());
    }

    #[tokio::test]
    async fn transport_disconnect_tears_down_membership() {
        let handle = CoordinatorTask::spawn(CoordinatorOptions::default(), 16, None);

        let (streamer, _streamer_events) = connect(&handle).await;
        let (viewer, mut viewer_events) = connect(&handle).await;

        handle.join(&streamer, "R1".to_string(), Role::Streamer).await.unwrap();
        handle.join(&viewer, "R1".to_string(), Role::Viewer).await.unwrap();
        handle.disconnect(&streamer).await.unwrap();

        assert_eq!(
            viewer_events.recv().await,
            Some(ServerEvent::StreamerDisconnected)
        );
        assert_eq!(handle.inspect("R1").await.unwrap(), None);

        // Speculative cleanup of an unknown connection is harmless.
        handle.disconnect(&ConnectionId::from("ghost")).await.unwrap();
        assert!(viewer_events.try_recv().is_err());
    }

    #[tokio::test]
    async fn signal_to_absent_streamer_produces_nothing() {
        let handle = CoordinatorTask::spawn(CoordinatorOptions::default(), 16, None);

        let (viewer, mut viewer_events) = connect(&handle).await;

        handle.join(&viewer, "R1".to_string(), Role::Viewer).await.unwrap();
        handle
            .signal(&viewer, "R1".to_string(), SignalTarget::Streamer, json!(null))
            .await
            .unwrap();

        let snapshot = handle.inspect("R1").await.unwrap().unwrap();
        assert_eq!(snapshot.viewers, vec![viewer]);
        assert!(viewer_events.try_recv().is_err());
    }
}
