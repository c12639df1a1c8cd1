//! Token verification for socket handshakes.

use serde::Serialize;

use crate::auth::jwt;
use crate::db::models::UserId;
use crate::db::SharedStore;
use crate::error::AuthError;

/// Identity of an authenticated connection, captured once at connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserIdentity {
    pub user_id: UserId,
    pub username: String,
    /// Display name; falls back to the username.
    pub nickname: String,
    pub avatar_url: Option<String>,
}

/// Decode `token` and resolve the identity it names.
///
/// Claims win over the stored profile. The profile is only consulted when the
/// token does not embed a username.
pub async fn verify_token(
    secret: &[u8],
    store: &SharedStore,
    token: &str,
) -> Result<UserIdentity, AuthError> {
    let claims = jwt::validate_access_token(secret, token).map_err(|err| match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
        _ => AuthError::MalformedToken,
    })?;

    let user_id = claims.user_id().ok_or(AuthError::MalformedToken)?;

    if let Some(username) = claims.username.filter(|u| !u.is_empty()) {
        let nickname = claims
            .nickname
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| username.clone());
        return Ok(UserIdentity {
            user_id,
            username,
            nickname,
            avatar_url: claims.avatar_url,
        });
    }

    let lookup_store = store.clone();
    let profile = tokio::task::spawn_blocking(move || lookup_store.fetch_profile(user_id))
        .await
        .map_err(crate::error::StorageError::from)??
        .ok_or(AuthError::UserNotFound)?;

    let nickname = claims
        .nickname
        .filter(|n| !n.is_empty())
        .or(profile.nickname)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| profile.username.clone());

    Ok(UserIdentity {
        user_id,
        username: profile.username,
        nickname,
        avatar_url: claims.avatar_url.or(profile.avatar_url),
    })
}
