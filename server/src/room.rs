use shared::connection_id::ConnectionId;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Room {
    streamer: Option<ConnectionId>,
    viewers: BTreeSet<ConnectionId>,
}

impl Room {
    pub fn streamer(&self) -> Option<&ConnectionId> {
        self.streamer.as_ref()
    }

    pub fn viewers(&self) -> impl Iterator<Item = &ConnectionId> {
        self.viewers.iter()
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    pub fn has_viewer(&self, connection_id: &ConnectionId) -> bool {
        self.viewers.contains(connection_id)
    }

    pub fn is_streamer(&self, connection_id: &ConnectionId) -> bool {
        self.streamer.as_ref() == Some(connection_id)
    }

    pub fn set_streamer(&mut self, connection_id: ConnectionId) {
        self.streamer = Some(connection_id);
    }

    pub fn take_streamer(&mut self) -> Option<ConnectionId> {
        self.streamer.take()
    }

    /// Returns false when the viewer was already present.
    pub fn add_viewer(&mut self, connection_id: ConnectionId) -> bool {
        self.viewers.insert(connection_id)
    }

    pub fn remove_viewer(&mut self, connection_id: &ConnectionId) -> bool {
        self.viewers.remove(connection_id)
    }

    /// An empty room is never stored.
    pub fn is_empty(&self) -> bool {
        self.streamer.is_none() && self.viewers.is_empty()
    }
}
