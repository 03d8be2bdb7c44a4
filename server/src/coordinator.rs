use std::collections::HashMap;

use log::{debug, info, warn};
use serde_json::Value;
use shared::{
    client_event::SignalTarget, connection_id::ConnectionId, role::Role,
    server_event::ServerEvent, validate_room_code,
};

use crate::{error::CoordinatorError, room::Room};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Tell a newly joined streamer about every viewer already waiting in the room.
    pub announce_waiting_viewers: bool,
    /// Keep a room alive with its viewers after the streamer departs.
    pub keep_viewers_on_streamer_leave: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            announce_waiting_viewers: true,
            keep_viewers_on_streamer_leave: false,
        }
    }
}

/// One event addressed to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub to: ConnectionId,
    pub event: ServerEvent,
}

impl Delivery {
    fn new(to: &ConnectionId, event: ServerEvent) -> Self {
        Self {
            to: to.clone(),
            event,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub room: String,
    pub role: Role,
}

/// Room table plus the connection -> room reverse index.
///
/// Every operation returns the events it wants delivered instead of sending
/// them itself, so the table can be owned by a single task and tested without
/// any transport.
pub struct RoomCoordinator {
    rooms: HashMap<String, Room>,
    memberships: HashMap<ConnectionId, Membership>,
    options: CoordinatorOptions,
}

impl RoomCoordinator {
    pub fn new(options: CoordinatorOptions) -> Self {
        Self {
            rooms: HashMap::new(),
            memberships: HashMap::new(),
            options,
        }
    }

    pub fn join(
        &mut self,
        room: &str,
        role: Role,
        connection_id: &ConnectionId,
    ) -> Result<Vec<Delivery>, CoordinatorError> {
        validate_room_code(room).map_err(CoordinatorError::MalformedRequest)?;

        if role == Role::Streamer {
            if let Some(streamer) = self.rooms.get(room).and_then(Room::streamer) {
                if streamer != connection_id {
                    warn!(
                        "{} tried to stream in room {}, already streamed by {}",
                        connection_id, room, streamer
                    );
                    return Err(CoordinatorError::RoleConflict {
                        room: room.to_string(),
                    });
                }
            }
        }

        let mut deliveries = Vec::new();

        if let Some(current) = self.memberships.get(connection_id).cloned() {
            if current.room == room && current.role == role {
                debug!("{} is already {} in room {}", connection_id, role, room);
                return Ok(deliveries);
            }

            deliveries.extend(self.teardown(connection_id, &current));
        }

        let announce_waiting_viewers = self.options.announce_waiting_viewers;
        let entry = self.rooms.entry(room.to_string()).or_default();

        match role {
            Role::Streamer => {
                entry.set_streamer(connection_id.clone());

                for viewer in entry.viewers() {
                    deliveries.push(Delivery::new(viewer, ServerEvent::StreamerJoined));
                }

                if announce_waiting_viewers {
                    for viewer in entry.viewers() {
                        deliveries.push(Delivery::new(
                            connection_id,
                            ServerEvent::ViewerJoined {
                                viewer_id: viewer.clone(),
                            },
                        ));
                    }
                }
            }
            Role::Viewer => {
                entry.add_viewer(connection_id.clone());
                debug!("Room {} now has {} viewers", room, entry.viewer_count());

                if let Some(streamer) = entry.streamer() {
                    deliveries.push(Delivery::new(
                        streamer,
                        ServerEvent::ViewerJoined {
                            viewer_id: connection_id.clone(),
                        },
                    ));
                }
            }
        }

        self.memberships.insert(
            connection_id.clone(),
            Membership {
                room: room.to_string(),
                role,
            },
        );

        info!("{} joined room {} as {}", connection_id, room, role);

        Ok(deliveries)
    }

    /// Relays an opaque handshake payload. Unroutable signals are dropped.
    pub fn signal(
        &self,
        room: &str,
        to: &SignalTarget,
        signal: Value,
        from: &ConnectionId,
    ) -> Vec<Delivery> {
        let recipient = match self.route_signal(room, to, from) {
            Ok(recipient) => recipient,
            Err(e) => {
                debug!("Dropping signal from {}: {}", from, e);
                return Vec::new();
            }
        };

        let event = match to {
            SignalTarget::Streamer => ServerEvent::Signal {
                from: from.clone(),
                signal,
            },
            SignalTarget::Connection(_) => ServerEvent::StreamerSignal(signal),
        };

        vec![Delivery::new(&recipient, event)]
    }

    fn route_signal(
        &self,
        room: &str,
        to: &SignalTarget,
        from: &ConnectionId,
    ) -> Result<ConnectionId, CoordinatorError> {
        let unroutable = || CoordinatorError::UnroutableSignal {
            room: room.to_string(),
            target: to.to_string(),
        };

        let current = self.rooms.get(room).ok_or_else(unroutable)?;

        match to {
            // Only viewers of this room may reach its streamer.
            SignalTarget::Streamer => {
                if !current.has_viewer(from) {
                    return Err(unroutable());
                }

                current.streamer().cloned().ok_or_else(unroutable)
            }
            // Only the streamer may address a viewer, and only one of its own.
            SignalTarget::Connection(target) => {
                if current.is_streamer(from) && current.has_viewer(target) {
                    Ok(target.clone())
                } else {
                    Err(unroutable())
                }
            }
        }
    }

    pub fn leave(&mut self, room: &str, connection_id: &ConnectionId) -> Vec<Delivery> {
        match self.memberships.get(connection_id).cloned() {
            Some(membership) if membership.room == room => {
                self.teardown(connection_id, &membership)
            }
            _ => {
                debug!("{} is not in room {}, nothing to leave", connection_id, room);
                Vec::new()
            }
        }
    }

    /// Safe to call for connections that never joined anything.
    pub fn disconnect(&mut self, connection_id: &ConnectionId) -> Vec<Delivery> {
        match self.memberships.get(connection_id).cloned() {
            Some(membership) => self.teardown(connection_id, &membership),
            None => Vec::new(),
        }
    }

    fn teardown(&mut self, connection_id: &ConnectionId, membership: &Membership) -> Vec<Delivery> {
        self.memberships.remove(connection_id);

        let mut deliveries = Vec::new();

        let Some(room) = self.rooms.get_mut(&membership.room) else {
            return deliveries;
        };

        match membership.role {
            Role::Streamer => {
                if !room.is_streamer(connection_id) {
                    return deliveries;
                }

                room.take_streamer();

                for viewer in room.viewers() {
                    deliveries.push(Delivery::new(viewer, ServerEvent::StreamerDisconnected));
                }

                info!("Streamer {} left room {}", connection_id, membership.room);

                if !self.options.keep_viewers_on_streamer_leave || room.is_empty() {
                    if let Some(closed) = self.rooms.remove(&membership.room) {
                        for viewer in closed.viewers() {
                            self.memberships.remove(viewer);
                        }
                    }

                    info!("Room {} closed", membership.room);
                }
            }
            Role::Viewer => {
                if !room.remove_viewer(connection_id) {
                    return deliveries;
                }

                if let Some(streamer) = room.streamer() {
                    deliveries.push(Delivery::new(
                        streamer,
                        ServerEvent::ViewerDisconnected {
                            viewer_id: connection_id.clone(),
                        },
                    ));
                }

                info!("Viewer {} left room {}", connection_id, membership.room);

                if room.is_empty() {
                    self.rooms.remove(&membership.room);
                    info!("Room {} closed", membership.room);
                }
            }
        }

        deliveries
    }

    pub fn room(&self, room: &str) -> Option<&Room> {
        self.rooms.get(room)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn member_count(&self) -> usize {
        self.memberships.len()
    }

    #[cfg(test)]
    pub fn membership(&self, connection_id: &ConnectionId) -> Option<&Membership> {
        self.memberships.get(connection_id)
    }
}
