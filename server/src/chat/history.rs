//! REST endpoints for conversation history and the contact list.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::auth::middleware::Claims;
use crate::chat::room::ConversationKind;
use crate::db::models::{Contact, HistoryMessage};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ContactsResponse {
    pub contacts: Vec<Contact>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<HistoryMessage>,
}

/// GET /api/chat/contacts
/// Friends and groups of the caller with their latest message. JWT auth required.
pub async fn get_contacts(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<ContactsResponse>, StatusCode> {
    let user_id = claims.user_id().ok_or(StatusCode::UNAUTHORIZED)?;
    let store = state.store.clone();

    let contacts = tokio::task::spawn_blocking(move || store.fetch_contacts(user_id))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|e| {
            tracing::error!(user_id = user_id, error = %e, "Failed to fetch contacts");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(ContactsResponse { contacts }))
}

/// GET /api/chat/messages/{kind}/{contact_id}
/// Conversation history oldest first. JWT auth required.
pub async fn get_messages(
    State(state): State<AppState>,
    claims: Claims,
    Path((kind, contact_id)): Path<(String, String)>,
) -> Result<Json<MessagesResponse>, StatusCode> {
    let user_id = claims.user_id().ok_or(StatusCode::UNAUTHORIZED)?;
    let kind: ConversationKind = kind.parse().map_err(|_| {
        tracing::warn!(user_id = user_id, kind = %kind, "Invalid conversation kind");
        StatusCode::BAD_REQUEST
    })?;
    let contact_id: i64 = contact_id.parse().map_err(|_| StatusCode::BAD_REQUEST)?;

    let store = state.store.clone();
    let messages = tokio::task::spawn_blocking(move || store.fetch_messages(user_id, kind, contact_id))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|e| {
            tracing::error!(
                user_id = user_id,
                kind = %kind,
                contact_id = contact_id,
                error = %e,
                "Failed to fetch messages"
            );
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(MessagesResponse { messages }))
}
