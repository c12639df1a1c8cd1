use axum::extract::ws::Message;

use super::{ConnectionId, ConnectionSender, Registry};
use crate::chat::room::RoomId;
use crate::ws::protocol::ServerEvent;

/// Encode a server event as a text frame.
fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server event");
            None
        }
    }
}

/// Send an event to a single connection.
pub fn send_event(tx: &ConnectionSender, event: &ServerEvent) {
    if let Some(msg) = encode(event) {
        let _ = tx.send(msg);
    }
}

/// Broadcast an event to every connection in `room`, optionally excluding one.
/// The frame is encoded once before any recipient is touched.
/// Returns the number of connections the frame was queued for.
pub fn broadcast_to_room(
    registry: &Registry,
    room: &RoomId,
    event: &ServerEvent,
    exclude: Option<ConnectionId>,
) -> usize {
    let Some(msg) = encode(event) else {
        return 0;
    };

    registry
        .senders(room, exclude)
        .into_iter()
        .filter(|sender| sender.send(msg.clone()).is_ok())
        .count()
}
