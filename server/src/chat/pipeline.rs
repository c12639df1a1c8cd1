//! Message pipeline: validate, persist, then broadcast.
//!
//! The broadcast payload is built from the store's insert result, so the
//! message id and timestamp clients see are the durable ones. Nothing is sent
//! to any room unless the insert succeeded.

use serde::Deserialize;
use serde_json::Value;

use crate::chat::broadcast::broadcast_new_message;
use crate::chat::room::{self, ConversationKind};
use crate::db::models::{MessageTarget, NewMessage};
use crate::error::{ChatError, StorageError};
use crate::state::AppState;
use crate::ws::protocol::NewMessagePayload;
use crate::ws::session::Session;

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default, alias = "contact_type")]
    pub kind: Option<String>,
    #[serde(default, alias = "contact_id")]
    pub target_id: Option<Value>,
    #[serde(default, alias = "message_content")]
    pub content: Option<String>,
}

/// A send request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSend {
    pub kind: ConversationKind,
    pub target_id: i64,
    pub content: String,
}

impl ValidatedSend {
    /// Storage shape: friend messages set `receiver_id`, group messages set `group_id`.
    pub fn target(&self) -> MessageTarget {
        match self.kind {
            ConversationKind::Friend => MessageTarget::Receiver(self.target_id),
            ConversationKind::Group => MessageTarget::Group(self.target_id),
        }
    }
}

/// Check a raw send request. No I/O.
pub fn validate(request: SendMessageRequest) -> Result<ValidatedSend, ChatError> {
    let content = request.content.unwrap_or_default();
    if content.is_empty() {
        return Err(ChatError::validation("Message content is required."));
    }

    let kind: ConversationKind = match request.kind.as_deref() {
        Some(kind) if !kind.is_empty() => kind.parse()?,
        _ => return Err(ChatError::validation("kind and target_id are required.")),
    };
    let target_id = match request.target_id.as_ref() {
        Some(target) => room::parse_id(target)?,
        None => return Err(ChatError::validation("kind and target_id are required.")),
    };

    Ok(ValidatedSend {
        kind,
        target_id,
        content,
    })
}

/// Persist a message from `session` and broadcast it to the target room.
///
/// The sender id and identity snapshot come from the session, never from the
/// request. The target room is derived from the explicit target, so the sender
/// does not need to have joined it.
pub async fn send_message(
    state: &AppState,
    session: &Session,
    request: SendMessageRequest,
) -> Result<NewMessagePayload, ChatError> {
    let send = validate(request)?;
    let target = send.target();
    let message = NewMessage {
        sender_id: session.user_id(),
        target,
        content: send.content,
    };

    let store = state.store.clone();
    let (message, stored) = tokio::task::spawn_blocking(move || {
        let stored = store.insert_message(&message)?;
        Ok::<_, StorageError>((message, stored))
    })
    .await
    .map_err(StorageError::from)??;

    let room = room::room_for(send.kind, session.user_id(), send.target_id);
    let identity = &session.identity;
    let payload = NewMessagePayload {
        message_id: stored.message_id,
        sender_id: identity.user_id,
        sender_username: identity.username.clone(),
        sender_nickname: identity.nickname.clone(),
        sender_avatar: identity.avatar_url.clone(),
        receiver_id: target.receiver_id(),
        group_id: target.group_id(),
        content: message.content,
        sent_at: stored.sent_at,
        target_kind: send.kind,
        target_id: send.target_id,
    };

    let delivered = broadcast_new_message(&state.registry, &room, payload.clone());
    tracing::info!(
        connection_id = %session.connection_id,
        user_id = session.user_id(),
        message_id = payload.message_id,
        room = %room,
        delivered = delivered,
        "Message persisted and broadcast"
    );

    Ok(payload)
}
