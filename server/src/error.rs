//! Error taxonomy for the real-time layer.
//!
//! `AuthError` is fatal to a connection attempt. `ChatError` is scoped to a
//! single request and reported back to the originating connection only.

use thiserror::Error;

/// Token verification failures. Terminal for the connection attempt.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token expired")]
    ExpiredToken,
    #[error("malformed token")]
    MalformedToken,
    #[error("user referenced by token not found")]
    UserNotFound,
    #[error("profile lookup failed: {0}")]
    ProfileUnavailable(#[from] StorageError),
}

impl AuthError {
    /// WebSocket close code sent after the `auth_error` event.
    pub fn close_code(&self) -> u16 {
        match self {
            AuthError::ExpiredToken => 4001,
            AuthError::MalformedToken | AuthError::UserNotFound => 4002,
            AuthError::ProfileUnavailable(_) => 1011,
        }
    }

    /// Text safe to show to the client.
    pub fn client_message(&self) -> &'static str {
        match self {
            AuthError::ExpiredToken => "Token expired",
            AuthError::MalformedToken => "Token invalid",
            AuthError::UserNotFound => "Token invalid",
            AuthError::ProfileUnavailable(_) => "Authentication temporarily unavailable",
        }
    }
}

/// Failures reported by the persistence collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database lock poisoned")]
    LockPoisoned,
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),
    #[error("storage task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref code, ref msg)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StorageError::Constraint(msg.clone().unwrap_or_else(|| code.to_string()))
            }
            other => StorageError::Sqlite(other),
        }
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::Task(err.to_string())
    }
}

/// Request-scoped failures on an authenticated connection.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),
    #[error("invalid conversation kind")]
    InvalidConversationKind,
    #[error("invalid id format")]
    InvalidIdFormat,
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl ChatError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ChatError::Validation(msg.into())
    }

    /// Message sent in the scoped error event. Storage details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            ChatError::Validation(msg) => msg.clone(),
            ChatError::InvalidConversationKind => "Invalid conversation kind.".to_string(),
            ChatError::InvalidIdFormat => "Invalid ID format.".to_string(),
            ChatError::Storage(_) => "Failed to save message.".to_string(),
        }
    }
}
