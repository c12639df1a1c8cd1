//! Joining and leaving conversation rooms.

use serde::Deserialize;
use serde_json::Value;

use crate::chat::room::{self, RoomId};
use crate::error::ChatError;
use crate::state::AppState;
use crate::ws::session::Session;

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct JoinConversationRequest {
    #[serde(default, alias = "contact_type")]
    pub kind: Option<String>,
    #[serde(default, alias = "contact_id")]
    pub target_id: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct LeaveConversationRequest {
    #[serde(default, alias = "room_name")]
    pub room_id: Option<String>,
}

/// Join the conversation room named by the request, leaving the previous one.
///
/// Validation failures leave the session untouched.
pub fn join_conversation(
    state: &AppState,
    session: &mut Session,
    request: JoinConversationRequest,
) -> Result<RoomId, ChatError> {
    let (kind, target) = match (request.kind.as_deref(), request.target_id.as_ref()) {
        (Some(kind), Some(target)) if !kind.is_empty() => (kind, target),
        _ => return Err(ChatError::validation("kind and target_id are required.")),
    };
    let target_id = room::parse_id(target)?;
    let room = room::resolve(kind, session.user_id(), target_id)?;

    state
        .registry
        .switch_room(session.connection_id, session.current_room.as_ref(), &room);

    if let Some(previous) = session.current_room.as_ref().filter(|r| **r != room) {
        tracing::info!(
            connection_id = %session.connection_id,
            user_id = session.user_id(),
            room = %previous,
            "Left previous conversation room"
        );
    }
    tracing::info!(
        connection_id = %session.connection_id,
        user_id = session.user_id(),
        room = %room,
        kind = %kind,
        target_id = target_id,
        "Joined conversation room"
    );

    session.current_room = Some(room.clone());
    Ok(room)
}

/// Leave the named room, or the current one. Returns the room left, if any.
pub fn leave_conversation(
    state: &AppState,
    session: &mut Session,
    request: LeaveConversationRequest,
) -> Option<RoomId> {
    let room = match request.room_id.filter(|r| !r.is_empty()) {
        Some(raw) => RoomId::from_client(raw),
        None => match session.current_room.clone() {
            Some(room) => room,
            None => {
                tracing::debug!(
                    connection_id = %session.connection_id,
                    user_id = session.user_id(),
                    "Leave requested without a room"
                );
                return None;
            }
        },
    };

    if room.is_personal() {
        tracing::debug!(
            connection_id = %session.connection_id,
            user_id = session.user_id(),
            room = %room,
            "Ignoring leave of personal room"
        );
        return None;
    }

    state.registry.leave(session.connection_id, &room);
    if session.current_room.as_ref() == Some(&room) {
        session.current_room = None;
    }

    tracing::info!(
        connection_id = %session.connection_id,
        user_id = session.user_id(),
        room = %room,
        "Left conversation room"
    );
    Some(room)
}
