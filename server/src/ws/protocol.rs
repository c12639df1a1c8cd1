//! JSON event protocol over WebSocket text frames.
//!
//! Every frame is `{"event": "<name>", "data": {...}}`. Inbound frames are
//! decoded into [`ClientEvent`] and dispatched to the chat handlers; handler
//! failures are reported to the originating connection only.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::conversation::{self, JoinConversationRequest, LeaveConversationRequest};
use crate::chat::pipeline::{self, SendMessageRequest};
use crate::chat::presence;
use crate::chat::room::ConversationKind;
use crate::db::models::UserId;
use crate::state::AppState;
use crate::ws::session::Session;

/// Broadcast body of `new_message`. Mirrors the persisted row exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessagePayload {
    pub message_id: i64,
    pub sender_id: UserId,
    pub sender_username: String,
    pub sender_nickname: String,
    pub sender_avatar: Option<String>,
    pub receiver_id: Option<UserId>,
    pub group_id: Option<i64>,
    pub content: String,
    pub sent_at: String,
    pub target_kind: ConversationKind,
    pub target_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingPayload {
    pub user_id: UserId,
    pub nickname: String,
}

/// Events sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    JoinedRoomAck { room_id: String },
    LeftRoomAck { room_id: String },
    NewMessage(NewMessagePayload),
    MessageError { error: String },
    JoinError { error: String },
    AuthError { error: String },
    IsTyping(TypingPayload),
    IsNotTyping(TypingPayload),
    /// Unknown event, unparseable frame or unexpected failure.
    Error { error: String },
}

/// Events sent by clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    JoinConversation(JoinConversationRequest),
    LeaveConversation(LeaveConversationRequest),
    SendMessage(SendMessageRequest),
    TypingStart,
    TypingStop,
}

#[derive(Debug, Deserialize)]
struct InboundFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Why an inbound frame could not be turned into a [`ClientEvent`].
#[derive(Debug, PartialEq, Eq)]
pub enum FrameError {
    Malformed,
    UnknownEvent(String),
    /// Known event whose payload has the wrong shape.
    BadPayload(String),
}

impl ClientEvent {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let frame: InboundFrame = serde_json::from_str(text).map_err(|_| FrameError::Malformed)?;
        let data = match frame.data {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let payload = |event: &str| FrameError::BadPayload(event.to_string());

        match frame.event.as_str() {
            "join_conversation" | "join_chat" => serde_json::from_value(data)
                .map(ClientEvent::JoinConversation)
                .map_err(|_| payload("join_conversation")),
            "leave_conversation" | "leave_chat" => serde_json::from_value(data)
                .map(ClientEvent::LeaveConversation)
                .map_err(|_| payload("leave_conversation")),
            "send_message" => serde_json::from_value(data)
                .map(ClientEvent::SendMessage)
                .map_err(|_| payload("send_message")),
            "typing_start" | "user_typing" => Ok(ClientEvent::TypingStart),
            "typing_stop" | "user_stopped_typing" => Ok(ClientEvent::TypingStop),
            other => Err(FrameError::UnknownEvent(other.to_string())),
        }
    }
}

/// Handle one inbound text frame for `session`.
pub async fn handle_text_message(text: &str, session: &mut Session, state: &AppState) {
    let event = match ClientEvent::parse(text) {
        Ok(event) => event,
        Err(err) => {
            tracing::debug!(
                connection_id = %session.connection_id,
                user_id = session.user_id(),
                error = ?err,
                "Rejected inbound frame"
            );
            let reply = match err {
                FrameError::Malformed => ServerEvent::Error {
                    error: "Invalid message format".to_string(),
                },
                FrameError::UnknownEvent(name) => ServerEvent::Error {
                    error: format!("Unknown event: {}", name),
                },
                FrameError::BadPayload(name) if name == "join_conversation" => ServerEvent::JoinError {
                    error: "Invalid join request".to_string(),
                },
                FrameError::BadPayload(name) if name == "send_message" => ServerEvent::MessageError {
                    error: "Invalid message request".to_string(),
                },
                FrameError::BadPayload(name) => ServerEvent::Error {
                    error: format!("Invalid payload for {}", name),
                },
            };
            session.send(&reply);
            return;
        }
    };

    dispatch(event, session, state).await;
}

/// Route a decoded event to its handler.
pub async fn dispatch(event: ClientEvent, session: &mut Session, state: &AppState) {
    match event {
        ClientEvent::JoinConversation(request) => {
            match conversation::join_conversation(state, session, request) {
                Ok(room) => session.send(&ServerEvent::JoinedRoomAck {
                    room_id: room.to_string(),
                }),
                Err(err) => {
                    tracing::warn!(
                        connection_id = %session.connection_id,
                        user_id = session.user_id(),
                        error = %err,
                        "Join conversation rejected"
                    );
                    session.send(&ServerEvent::JoinError {
                        error: err.client_message(),
                    });
                }
            }
        }
        ClientEvent::LeaveConversation(request) => {
            if let Some(room) = conversation::leave_conversation(state, session, request) {
                session.send(&ServerEvent::LeftRoomAck {
                    room_id: room.to_string(),
                });
            }
        }
        ClientEvent::SendMessage(request) => {
            if let Err(err) = pipeline::send_message(state, session, request).await {
                tracing::warn!(
                    connection_id = %session.connection_id,
                    user_id = session.user_id(),
                    error = %err,
                    "Send message failed"
                );
                session.send(&ServerEvent::MessageError {
                    error: err.client_message(),
                });
            }
        }
        ClientEvent::TypingStart => {
            presence::typing_started(state, session);
        }
        ClientEvent::TypingStop => {
            presence::typing_stopped(state, session);
        }
    }
}
