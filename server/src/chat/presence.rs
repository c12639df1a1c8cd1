//! Typing indicators, scoped to the connection's current conversation room.
//!
//! Nothing is stored. A connection that has not joined a conversation room
//! has nobody to notify, so its signals are dropped.

use crate::chat::broadcast::broadcast_typing;
use crate::state::AppState;
use crate::ws::protocol::TypingPayload;
use crate::ws::session::Session;

/// Relay `is_typing` to the rest of the current room.
pub fn typing_started(state: &AppState, session: &Session) -> usize {
    signal(state, session, true)
}

/// Relay `is_not_typing` to the rest of the current room.
pub fn typing_stopped(state: &AppState, session: &Session) -> usize {
    signal(state, session, false)
}

fn signal(state: &AppState, session: &Session, typing: bool) -> usize {
    let Some(room) = session.current_room.as_ref() else {
        return 0;
    };

    let payload = TypingPayload {
        user_id: session.user_id(),
        nickname: session.identity.nickname.clone(),
    };
    let delivered = broadcast_typing(&state.registry, room, payload, typing, session.connection_id);
    tracing::debug!(
        user_id = session.user_id(),
        room = %room,
        typing = typing,
        delivered = delivered,
        "Typing signal relayed"
    );
    delivered
}
