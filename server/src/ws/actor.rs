use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::auth::UserIdentity;
use crate::state::AppState;
use crate::ws::protocol;
use crate::ws::session::Session;

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader loop: handles inbound events one at a time, so events from one
///   connection are processed in the order they arrived
///
/// Any part of the system can reach this client through the registry, which
/// holds a clone of the channel sender.
pub async fn run_connection(socket: WebSocket, state: AppState, identity: UserIdentity) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let mut session = Session::new(identity, tx.clone());
    let connection_id = session.connection_id;
    let user_id = session.user_id();

    // Register and join the personal room before reading any event
    state.registry.register(connection_id, user_id, tx.clone());
    state.registry.join(connection_id, &session.personal_room());

    tracing::info!(
        connection_id = %connection_id,
        user_id = user_id,
        user_connections = state.registry.user_connection_count(user_id),
        "WebSocket actor started"
    );

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Ping task: sends periodic pings and monitors pong responses.
    // It only returns once the connection is considered dead.
    let ping_tx = tx.clone();
    let keepalive = state.keepalive;
    let mut ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(keepalive.ping_interval);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task is gone, so is the connection
                break;
            }

            match timeout(keepalive.pong_timeout, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    loop {
        let next = tokio::select! {
            next = ws_receiver.next() => next,
            _ = &mut ping_handle => {
                tracing::info!(
                    connection_id = %connection_id,
                    user_id = user_id,
                    "Keepalive failed, dropping connection"
                );
                break;
            }
        };

        match next {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_message(text.as_str(), &mut session, &state).await;
                }
                Message::Binary(data) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        user_id = user_id,
                        bytes = data.len(),
                        "Ignoring binary frame (protocol is JSON text)"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        connection_id = %connection_id,
                        user_id = user_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    user_id = user_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(
                    connection_id = %connection_id,
                    user_id = user_id,
                    "WebSocket stream ended"
                );
                break;
            }
        }
    }

    // Cleanup runs on every exit path: abort helpers, release every room
    writer_handle.abort();
    ping_handle.abort();

    let released = state.registry.unregister(connection_id);

    tracing::info!(
        connection_id = %connection_id,
        user_id = user_id,
        rooms_released = released.len(),
        "WebSocket actor stopped"
    );
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() || closing {
            break;
        }
    }
}
