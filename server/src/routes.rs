use axum::{middleware, Json, Router};

use crate::auth::middleware::JwtSecret;
use crate::chat::history;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // History routes (JWT required, Claims extractor validates token)
    let history_routes = Router::new()
        .route("/api/chat/contacts", axum::routing::get(history::get_contacts))
        .route(
            "/api/chat/messages/{kind}/{contact_id}",
            axum::routing::get(history::get_messages),
        );

    // WebSocket endpoint (token checked by the handler before upgrading)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(history_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}

/// Health check with a snapshot of live connection state
async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "connections": state.registry.connection_count(),
        "rooms": state.registry.room_count(),
    }))
}
