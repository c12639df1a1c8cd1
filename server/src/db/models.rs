/// Row and read-model types exchanged with the persistence layer.
/// These correspond to the SQLite schema defined in migrations.rs.
use serde::Serialize;

use crate::chat::room::ConversationKind;

/// Numeric user id (`users.user_id`).
pub type UserId = i64;

/// User profile used as identity fallback when a token carries only `sub`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub user_id: UserId,
    pub username: String,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
}

/// Where a message is addressed. Exactly one of receiver/group by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTarget {
    Receiver(UserId),
    Group(i64),
}

impl MessageTarget {
    pub fn receiver_id(&self) -> Option<UserId> {
        match self {
            MessageTarget::Receiver(id) => Some(*id),
            MessageTarget::Group(_) => None,
        }
    }

    pub fn group_id(&self) -> Option<i64> {
        match self {
            MessageTarget::Receiver(_) => None,
            MessageTarget::Group(id) => Some(*id),
        }
    }
}

/// Message about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub target: MessageTarget,
    pub content: String,
}

/// Values assigned by the store in the inserting statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub message_id: i64,
    pub sent_at: String,
}

/// Message row as returned by history fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryMessage {
    pub id: i64,
    pub sender_id: UserId,
    pub receiver_id: Option<UserId>,
    pub group_id: Option<i64>,
    pub content: String,
    pub sent_at: String,
    pub is_self: bool,
}

/// Entry of a user's contact list: a friend or a group, with the latest message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    pub contact_id: i64,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    pub name: String,
    pub avatar_url: Option<String>,
    pub last_message: Option<String>,
    pub last_message_time: Option<String>,
}
