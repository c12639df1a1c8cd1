use uuid::Uuid;

use crate::auth::UserIdentity;
use crate::chat::room::RoomId;
use crate::db::models::UserId;
use crate::ws::broadcast;
use crate::ws::protocol::ServerEvent;
use crate::ws::{ConnectionId, ConnectionSender};

/// Server-side state of one authenticated connection.
///
/// Owned by the connection actor and handed by reference to every event
/// handler. Only exists after the token was verified, so the identity is
/// always present and never replaced.
#[derive(Debug)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub identity: UserIdentity,
    /// Conversation room currently joined, if any. The personal room is not tracked here.
    pub current_room: Option<RoomId>,
    pub tx: ConnectionSender,
}

impl Session {
    pub fn new(identity: UserIdentity, tx: ConnectionSender) -> Self {
        Self {
            connection_id: Uuid::now_v7(),
            identity,
            current_room: None,
            tx,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.identity.user_id
    }

    pub fn personal_room(&self) -> RoomId {
        RoomId::personal(self.identity.user_id)
    }

    /// Send an event to this connection only.
    pub fn send(&self, event: &ServerEvent) {
        broadcast::send_event(&self.tx, event);
    }
}
