use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::auth::{verify_token, UserIdentity};
use crate::state::AppState;
use crate::ws::actor;
use crate::ws::protocol::ServerEvent;

/// Query parameters for WebSocket connection.
/// `?token=JWT` is the fallback when the client cannot set headers.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// Where the handshake token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Header,
    Query,
}

/// Pick the handshake token: `Authorization: Bearer` first, then `?token=` if allowed.
pub fn extract_token(
    headers: &HeaderMap,
    query_token: Option<&str>,
    allow_query_token: bool,
) -> Option<(String, TokenSource)> {
    let header_token = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = header_token {
        return Some((token.to_string(), TokenSource::Header));
    }

    if allow_query_token {
        if let Some(token) = query_token.map(str::trim).filter(|t| !t.is_empty()) {
            return Some((token.to_string(), TokenSource::Query));
        }
    }
    None
}

/// GET /ws
/// WebSocket upgrade endpoint. The token is verified before the upgrade.
/// Missing token: 401, no upgrade.
/// Invalid token: the upgraded socket only carries the rejection, an
/// `auth_error` event followed by a close frame (4001 expired, 4002 invalid,
/// 1011 profile store unavailable). No session, actor or registry entry is
/// ever created for it, so no chat connection is established.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some((token, source)) =
        extract_token(&headers, params.token.as_deref(), state.allow_query_token)
    else {
        tracing::warn!("WebSocket connection attempt without token");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Authentication token required" })),
        )
            .into_response();
    };

    if source == TokenSource::Query {
        tracing::info!("WebSocket client authenticating with token from query parameter");
    }

    match verify_token(&state.jwt_secret, &state.store, &token).await {
        Ok(identity) => {
            tracing::info!(
                user_id = identity.user_id,
                username = %identity.username,
                "WebSocket connection authenticated"
            );
            ws.on_upgrade(move |socket| handle_authenticated(socket, state, identity))
        }
        Err(err) => {
            let close_code = err.close_code();
            let reason = err.client_message();

            tracing::warn!(
                close_code = close_code,
                error = %err,
                "WebSocket auth failed"
            );

            ws.on_upgrade(move |mut socket| async move {
                let event = ServerEvent::AuthError {
                    error: reason.to_string(),
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    let _ = socket.send(Message::Text(json.into())).await;
                }
                let close_frame = CloseFrame {
                    code: close_code,
                    reason: reason.into(),
                };
                let _ = socket.send(Message::Close(Some(close_frame))).await;
            })
        }
    }
}

/// Handle an authenticated WebSocket connection by running the actor.
async fn handle_authenticated(socket: WebSocket, state: AppState, identity: UserIdentity) {
    actor::run_connection(socket, state, identity).await;
}
