//! Connection registry and room membership.
//!
//! Two concurrent maps: connection id -> entry (owner, sender, rooms held) and
//! room id -> member connection ids. Mutations for one connection run under
//! that connection's entry guard, so a connection's room set and the room
//! tables never disagree. Lock order is always connection then room; readers
//! of the room table release it before touching connections.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::chat::room::RoomId;
use crate::db::models::UserId;
use crate::ws::ConnectionSender;

/// Opaque id of one transport connection.
pub type ConnectionId = Uuid;

struct ConnectionEntry {
    user_id: UserId,
    sender: ConnectionSender,
    rooms: HashSet<RoomId>,
}

/// Shared registry. Cloning shares the underlying maps.
#[derive(Clone, Default)]
pub struct Registry {
    connections: Arc<DashMap<ConnectionId, ConnectionEntry>>,
    rooms: Arc<DashMap<RoomId, HashSet<ConnectionId>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new authenticated connection. It holds no rooms yet.
    pub fn register(&self, id: ConnectionId, user_id: UserId, sender: ConnectionSender) {
        self.connections.insert(
            id,
            ConnectionEntry {
                user_id,
                sender,
                rooms: HashSet::new(),
            },
        );
        tracing::debug!(
            connection_id = %id,
            user_id = user_id,
            connections = self.connections.len(),
            "Connection registered"
        );
    }

    /// Add a connection to a room. Returns false for unknown connections.
    pub fn join(&self, id: ConnectionId, room: &RoomId) -> bool {
        let Some(mut entry) = self.connections.get_mut(&id) else {
            return false;
        };
        if entry.rooms.insert(room.clone()) {
            self.rooms.entry(room.clone()).or_default().insert(id);
        }
        true
    }

    /// Leave `previous` (when it differs) and join `next` as one step.
    pub fn switch_room(&self, id: ConnectionId, previous: Option<&RoomId>, next: &RoomId) -> bool {
        let Some(mut entry) = self.connections.get_mut(&id) else {
            return false;
        };
        if let Some(previous) = previous.filter(|p| *p != next) {
            if entry.rooms.remove(previous) {
                self.detach(previous, &id);
            }
        }
        if entry.rooms.insert(next.clone()) {
            self.rooms.entry(next.clone()).or_default().insert(id);
        }
        true
    }

    /// Remove a connection from a room. Returns whether it was a member.
    pub fn leave(&self, id: ConnectionId, room: &RoomId) -> bool {
        let Some(mut entry) = self.connections.get_mut(&id) else {
            return false;
        };
        let was_member = entry.rooms.remove(room);
        if was_member {
            self.detach(room, &id);
        }
        was_member
    }

    /// Drop a connection and every membership it held. Returns the rooms released.
    pub fn unregister(&self, id: ConnectionId) -> Vec<RoomId> {
        let Some((_, entry)) = self.connections.remove(&id) else {
            return Vec::new();
        };
        for room in &entry.rooms {
            self.detach(room, &id);
        }
        tracing::debug!(
            connection_id = %id,
            user_id = entry.user_id,
            rooms = entry.rooms.len(),
            "Connection unregistered"
        );
        entry.rooms.into_iter().collect()
    }

    fn detach(&self, room: &RoomId, id: &ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(id);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
    }

    /// Senders of every connection in `room`, optionally excluding one.
    pub fn senders(&self, room: &RoomId, exclude: Option<ConnectionId>) -> Vec<ConnectionSender> {
        let ids: Vec<ConnectionId> = match self.rooms.get(room) {
            Some(members) => members.iter().copied().collect(),
            None => return Vec::new(),
        };
        ids.into_iter()
            .filter(|id| Some(*id) != exclude)
            .filter_map(|id| self.connections.get(&id).map(|entry| entry.sender.clone()))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn members(&self, room: &RoomId) -> HashSet<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.clone())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn is_member(&self, id: ConnectionId, room: &RoomId) -> bool {
        self.rooms
            .get(room)
            .map(|members| members.contains(&id))
            .unwrap_or(false)
    }

    #[cfg(test)]
    pub(crate) fn rooms_of(&self, id: ConnectionId) -> HashSet<RoomId> {
        self.connections
            .get(&id)
            .map(|entry| entry.rooms.clone())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn is_registered(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of live connections for a user (multiple tabs/devices).
    pub fn user_connection_count(&self, user_id: UserId) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .count()
    }
}
