//! Persistence seam for the real-time layer.
//!
//! `ChatStore` is synchronous, like rusqlite itself. Async callers run it
//! inside `tokio::task::spawn_blocking` so no registry lock or runtime worker
//! is held while the database works.

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, MutexGuard};

use crate::chat::room::ConversationKind;
use crate::db::models::{Contact, HistoryMessage, NewMessage, Profile, StoredMessage, UserId};
use crate::db::DbPool;
use crate::error::StorageError;

/// Operations the chat core needs from persistence.
pub trait ChatStore: Send + Sync {
    /// Insert a message and return the id and timestamp assigned by the same statement.
    fn insert_message(&self, message: &NewMessage) -> Result<StoredMessage, StorageError>;

    fn fetch_profile(&self, user_id: UserId) -> Result<Option<Profile>, StorageError>;

    /// Conversation history in `sent_at` order.
    fn fetch_messages(
        &self,
        user_id: UserId,
        kind: ConversationKind,
        contact_id: i64,
    ) -> Result<Vec<HistoryMessage>, StorageError>;

    /// Friends and groups of a user, most recent conversation first.
    fn fetch_contacts(&self, user_id: UserId) -> Result<Vec<Contact>, StorageError>;
}

/// Store handle shared by the app state and all connection actors.
pub type SharedStore = Arc<dyn ChatStore>;

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.db.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Insert a user. `user_id` may be fixed (imports, tests) or left to the database.
    pub fn create_user(
        &self,
        user_id: Option<UserId>,
        username: &str,
        nickname: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<UserId, StorageError> {
        let conn = self.conn()?;
        let id = conn.query_row(
            "INSERT INTO users (user_id, username, nickname, avatar_url) VALUES (?1, ?2, ?3, ?4)
             RETURNING user_id",
            params![user_id, username, nickname, avatar_url],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Record a friendship in both directions.
    pub fn add_friend(&self, user_id: UserId, friend_id: UserId) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO friends (user_id, friend_id) VALUES (?1, ?2)",
            params![user_id, friend_id],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO friends (user_id, friend_id) VALUES (?1, ?2)",
            params![friend_id, user_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Create a group; the creator, if any, becomes its first member.
    pub fn create_group(
        &self,
        group_id: Option<i64>,
        name: &str,
        created_by: Option<UserId>,
    ) -> Result<i64, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let id: i64 = tx.query_row(
            "INSERT INTO chat_groups (group_id, name, created_by) VALUES (?1, ?2, ?3)
             RETURNING group_id",
            params![group_id, name, created_by],
            |row| row.get(0),
        )?;
        if let Some(creator) = created_by {
            tx.execute(
                "INSERT INTO group_members (group_id, user_id) VALUES (?1, ?2)",
                params![id, creator],
            )?;
        }
        tx.commit()?;
        Ok(id)
    }

    pub fn add_group_member(&self, group_id: i64, user_id: UserId) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?1, ?2)",
            params![group_id, user_id],
        )?;
        Ok(())
    }
}

impl ChatStore for SqliteStore {
    fn insert_message(&self, message: &NewMessage) -> Result<StoredMessage, StorageError> {
        let conn = self.conn()?;
        let stored = conn.query_row(
            "INSERT INTO messages (sender_id, receiver_id, group_id, content)
             VALUES (?1, ?2, ?3, ?4)
             RETURNING message_id, sent_at",
            params![
                message.sender_id,
                message.target.receiver_id(),
                message.target.group_id(),
                message.content,
            ],
            |row| {
                Ok(StoredMessage {
                    message_id: row.get(0)?,
                    sent_at: row.get(1)?,
                })
            },
        )?;
        Ok(stored)
    }

    fn fetch_profile(&self, user_id: UserId) -> Result<Option<Profile>, StorageError> {
        let conn = self.conn()?;
        let profile = conn
            .query_row(
                "SELECT user_id, username, nickname, avatar_url FROM users WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(Profile {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        nickname: row.get(2)?,
                        avatar_url: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    fn fetch_messages(
        &self,
        user_id: UserId,
        kind: ConversationKind,
        contact_id: i64,
    ) -> Result<Vec<HistoryMessage>, StorageError> {
        let conn = self.conn()?;
        let sql = match kind {
            ConversationKind::Friend => {
                "SELECT message_id, sender_id, receiver_id, group_id, content, sent_at
                 FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY sent_at ASC, message_id ASC"
            }
            ConversationKind::Group => {
                // Only ?2 is referenced; the parameter count is still 2 (highest index)
                "SELECT message_id, sender_id, receiver_id, group_id, content, sent_at
                 FROM messages
                 WHERE group_id = ?2
                 ORDER BY sent_at ASC, message_id ASC"
            }
        };

        let mut stmt = conn.prepare(sql)?;
        let messages = stmt
            .query_map(params![user_id, contact_id], |row| {
                let sender_id: UserId = row.get(1)?;
                Ok(HistoryMessage {
                    id: row.get(0)?,
                    sender_id,
                    receiver_id: row.get(2)?,
                    group_id: row.get(3)?,
                    content: row.get(4)?,
                    sent_at: row.get(5)?,
                    is_self: sender_id == user_id,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    fn fetch_contacts(&self, user_id: UserId) -> Result<Vec<Contact>, StorageError> {
        let conn = self.conn()?;

        let mut friends_stmt = conn.prepare(
            "SELECT u.user_id, COALESCE(u.nickname, u.username), u.avatar_url,
                    (SELECT m.content FROM messages m
                      WHERE (m.sender_id = ?1 AND m.receiver_id = u.user_id)
                         OR (m.sender_id = u.user_id AND m.receiver_id = ?1)
                      ORDER BY m.sent_at DESC, m.message_id DESC LIMIT 1),
                    (SELECT m.sent_at FROM messages m
                      WHERE (m.sender_id = ?1 AND m.receiver_id = u.user_id)
                         OR (m.sender_id = u.user_id AND m.receiver_id = ?1)
                      ORDER BY m.sent_at DESC, m.message_id DESC LIMIT 1)
             FROM friends f
             JOIN users u ON u.user_id = f.friend_id
             WHERE f.user_id = ?1",
        )?;
        let mut contacts = friends_stmt
            .query_map(params![user_id], |row| {
                Ok(Contact {
                    contact_id: row.get(0)?,
                    kind: ConversationKind::Friend,
                    name: row.get(1)?,
                    avatar_url: row.get(2)?,
                    last_message: row.get(3)?,
                    last_message_time: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut groups_stmt = conn.prepare(
            "SELECT g.group_id, g.name, g.avatar_url,
                    (SELECT m.content FROM messages m WHERE m.group_id = g.group_id
                      ORDER BY m.sent_at DESC, m.message_id DESC LIMIT 1),
                    (SELECT m.sent_at FROM messages m WHERE m.group_id = g.group_id
                      ORDER BY m.sent_at DESC, m.message_id DESC LIMIT 1)
             FROM group_members gm
             JOIN chat_groups g ON g.group_id = gm.group_id
             WHERE gm.user_id = ?1",
        )?;
        let groups = groups_stmt
            .query_map(params![user_id], |row| {
                Ok(Contact {
                    contact_id: row.get(0)?,
                    kind: ConversationKind::Group,
                    name: row.get(1)?,
                    avatar_url: row.get(2)?,
                    last_message: row.get(3)?,
                    last_message_time: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        contacts.extend(groups);

        // Most recent first; contacts without messages last
        contacts.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
        Ok(contacts)
    }
}
