//! In-memory store doubles for unit tests.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::auth::UserIdentity;
use crate::chat::room::ConversationKind;
use crate::db::models::{Contact, HistoryMessage, NewMessage, Profile, StoredMessage, UserId};
use crate::db::ChatStore;
use crate::error::StorageError;
use crate::ws::protocol::ServerEvent;
use crate::ws::session::Session;

/// Records every call. Inserts succeed with increasing ids unless `failing()`.
pub struct SpyStore {
    profiles: Vec<Profile>,
    inserted: Mutex<Vec<NewMessage>>,
    profile_lookups: AtomicUsize,
    next_id: AtomicI64,
    fail_inserts: bool,
}

impl SpyStore {
    pub fn new() -> Self {
        Self::with_profiles(Vec::new())
    }

    pub fn with_profiles(profiles: Vec<Profile>) -> Self {
        Self {
            profiles,
            inserted: Mutex::new(Vec::new()),
            profile_lookups: AtomicUsize::new(0),
            next_id: AtomicI64::new(101),
            fail_inserts: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_inserts: true,
            ..Self::new()
        }
    }

    pub fn inserted(&self) -> Vec<NewMessage> {
        self.inserted.lock().unwrap().clone()
    }

    pub fn insert_calls(&self) -> usize {
        self.inserted.lock().unwrap().len()
    }

    pub fn profile_lookups(&self) -> usize {
        self.profile_lookups.load(Ordering::SeqCst)
    }
}

impl ChatStore for SpyStore {
    fn insert_message(&self, message: &NewMessage) -> Result<StoredMessage, StorageError> {
        self.inserted.lock().unwrap().push(message.clone());
        if self.fail_inserts {
            return Err(StorageError::Constraint("database is unavailable".to_string()));
        }
        Ok(StoredMessage {
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst),
            sent_at: "2024-01-01T10:00:00".to_string(),
        })
    }

    fn fetch_profile(&self, user_id: UserId) -> Result<Option<Profile>, StorageError> {
        self.profile_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.profiles.iter().find(|p| p.user_id == user_id).cloned())
    }

    fn fetch_messages(
        &self,
        _user_id: UserId,
        _kind: ConversationKind,
        _contact_id: i64,
    ) -> Result<Vec<HistoryMessage>, StorageError> {
        Ok(Vec::new())
    }

    fn fetch_contacts(&self, _user_id: UserId) -> Result<Vec<Contact>, StorageError> {
        Ok(Vec::new())
    }
}

pub fn identity(user_id: UserId, username: &str) -> UserIdentity {
    UserIdentity {
        user_id,
        username: username.to_string(),
        nickname: username.to_uppercase(),
        avatar_url: None,
    }
}

/// A session whose outbound frames land in the returned receiver.
pub fn session(
    user_id: UserId,
    username: &str,
) -> (Session, mpsc::UnboundedReceiver<axum::extract::ws::Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Session::new(identity(user_id, username), tx), rx)
}

/// Drain every queued frame and decode it.
pub fn drain_events(rx: &mut mpsc::UnboundedReceiver<axum::extract::ws::Message>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let axum::extract::ws::Message::Text(text) = msg {
            events.push(serde_json::from_str(text.as_str()).expect("valid server event"));
        }
    }
    events
}
