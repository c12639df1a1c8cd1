//! Room naming.
//!
//! Rooms are not persisted. A room id is recomputed from the conversation kind
//! and the participant ids every time it is needed, so the join handler and
//! the message pipeline must both go through `room_for`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::models::UserId;
use crate::error::ChatError;

const PERSONAL_PREFIX: &str = "user";
const FRIEND_PREFIX: &str = "friend";
const GROUP_PREFIX: &str = "group";

/// Conversation discriminator: 1:1 friend chat or multi-party group chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Friend,
    Group,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Friend => "friend",
            Self::Group => "group",
        }
    }
}

impl FromStr for ConversationKind {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "friend" => Ok(Self::Friend),
            "group" => Ok(Self::Group),
            _ => Err(ChatError::InvalidConversationKind),
        }
    }
}

impl fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical room identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Personal room of a user, auto-joined by all of their connections.
    pub fn personal(user_id: UserId) -> Self {
        Self(format!("{}:{}", PERSONAL_PREFIX, user_id))
    }

    /// Wrap a client-supplied room name (leave requests).
    pub fn from_client(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn is_personal(&self) -> bool {
        self.0
            .strip_prefix(PERSONAL_PREFIX)
            .is_some_and(|rest| rest.starts_with(':'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Room for a conversation between `self_id` and `target_id`.
///
/// Friend rooms order the two ids numerically so both participants compute
/// the same string. Group rooms ignore the caller.
pub fn room_for(kind: ConversationKind, self_id: UserId, target_id: i64) -> RoomId {
    match kind {
        ConversationKind::Friend => {
            let low = self_id.min(target_id);
            let high = self_id.max(target_id);
            RoomId(format!("{}:{}:{}", FRIEND_PREFIX, low, high))
        }
        ConversationKind::Group => RoomId(format!("{}:{}", GROUP_PREFIX, target_id)),
    }
}

/// String-kind variant of [`room_for`]. Unknown kinds fail.
pub fn resolve(kind: &str, self_id: UserId, target_id: i64) -> Result<RoomId, ChatError> {
    let kind = ConversationKind::from_str(kind)?;
    Ok(room_for(kind, self_id, target_id))
}

/// Parse a client-supplied id. Accepts a JSON integer or a decimal string.
pub fn parse_id(value: &serde_json::Value) -> Result<i64, ChatError> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().ok_or(ChatError::InvalidIdFormat),
        serde_json::Value::String(s) => s.trim().parse().map_err(|_| ChatError::InvalidIdFormat),
        _ => Err(ChatError::InvalidIdFormat),
    }
}
