//! WebSocket broadcast helpers for chat events.
//! Wrap chat payloads in `ServerEvent` and fan them out to a room.

use crate::chat::room::RoomId;
use crate::ws::broadcast::broadcast_to_room;
use crate::ws::protocol::{NewMessagePayload, ServerEvent, TypingPayload};
use crate::ws::{ConnectionId, Registry};

/// Broadcast `new_message` to every connection in the room, sender included.
pub fn broadcast_new_message(
    registry: &Registry,
    room: &RoomId,
    payload: NewMessagePayload,
) -> usize {
    broadcast_to_room(registry, room, &ServerEvent::NewMessage(payload), None)
}

/// Broadcast `is_typing` / `is_not_typing` to the room, excluding the typist.
pub fn broadcast_typing(
    registry: &Registry,
    room: &RoomId,
    payload: TypingPayload,
    typing: bool,
    origin: ConnectionId,
) -> usize {
    let event = if typing {
        ServerEvent::IsTyping(payload)
    } else {
        ServerEvent::IsNotTyping(payload)
    };
    broadcast_to_room(registry, room, &event, Some(origin))
}
