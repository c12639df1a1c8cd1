//! Integration tests for the socket handshake, room membership, message relay and typing.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use chat_server::auth::jwt::issue_access_token;
use chat_server::db::{ChatStore, SqliteStore};
use chat_server::state::{AppState, Keepalive};
use chat_server::ws::Registry;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsRead = futures_util::stream::SplitStream<WsStream>;
type WsWrite = futures_util::stream::SplitSink<WsStream, Message>;

struct TestServer {
    addr: SocketAddr,
    store: SqliteStore,
    jwt_secret: Vec<u8>,
    registry: Registry,
}

impl TestServer {
    /// Token embedding the stored profile, like tokens issued by the auth service.
    fn token_for(&self, user_id: i64) -> String {
        let profile = self
            .store
            .fetch_profile(user_id)
            .expect("profile lookup")
            .expect("user exists");
        issue_access_token(&self.jwt_secret, user_id, Some(&profile), 3600).expect("token")
    }

    fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/ws?token={}", self.addr, token)
    }
}

/// Helper: start the server on a random port with users 5, 7, 9 and 11.
/// 5 and 9 are friends; 7 and 11 are members of group 3.
async fn start_test_server(allow_query_token: bool) -> TestServer {
    start_test_server_with(allow_query_token, Keepalive::default()).await
}

async fn start_test_server_with(allow_query_token: bool, keepalive: Keepalive) -> TestServer {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = chat_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = chat_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let store = SqliteStore::new(db);
    store.create_user(Some(5), "alice", Some("Alice"), None).unwrap();
    store.create_user(Some(7), "carol", None, None).unwrap();
    store.create_user(Some(9), "bob", Some("Bob"), Some("/avatars/bob.png")).unwrap();
    store.create_user(Some(11), "dave", Some("Dave"), None).unwrap();
    store.add_friend(5, 9).unwrap();
    store.create_group(Some(3), "hikers", Some(11)).unwrap();
    store.add_group_member(3, 7).unwrap();

    let mut state = AppState::new(Arc::new(store.clone()), jwt_secret.clone());
    state.allow_query_token = allow_query_token;
    state.keepalive = keepalive;
    let registry = state.registry.clone();

    let app = chat_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    TestServer {
        addr,
        store,
        jwt_secret,
        registry,
    }
}

async fn connect(server: &TestServer, user_id: i64) -> (WsWrite, WsRead) {
    let token = server.token_for(user_id);
    let (ws_stream, _) = tokio_tungstenite::connect_async(server.ws_url(&token))
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream.split()
}

async fn send_event(write: &mut WsWrite, event: &str, data: Value) {
    let frame = json!({ "event": event, "data": data }).to_string();
    write
        .send(Message::Text(frame.into()))
        .await
        .expect("Failed to send frame");
}

/// Next JSON event, skipping control frames.
async fn recv_event(read: &mut WsRead) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
            .await
            .expect("Expected an event within timeout");
        match msg {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(text.as_str()).expect("event is JSON");
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            other => panic!("Expected text event, got: {:?}", other),
        }
    }
}

/// Assert nothing but control frames arrives for a short while.
async fn assert_silent(read: &mut WsRead) {
    loop {
        match tokio::time::timeout(Duration::from_millis(300), read.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            Ok(other) => panic!("Expected no event, got: {:?}", other),
        }
    }
}

async fn join(write: &mut WsWrite, read: &mut WsRead, kind: &str, target: Value) -> Value {
    send_event(write, "join_conversation", json!({ "kind": kind, "target_id": target })).await;
    recv_event(read).await
}

const FAST_KEEPALIVE: Keepalive = Keepalive {
    ping_interval: Duration::from_millis(100),
    pong_timeout: Duration::from_millis(200),
};

/// Poll until `check` holds; registry updates trail the socket close.
async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..50 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

#[tokio::test]
async fn test_friend_message_reaches_both_members() {
    let server = start_test_server(true).await;
    let (mut w5, mut r5) = connect(&server, 5).await;
    let (mut w9, mut r9) = connect(&server, 9).await;

    let ack5 = join(&mut w5, &mut r5, "friend", json!(9)).await;
    assert_eq!(ack5, json!({ "event": "joined_room_ack", "data": { "room_id": "friend:5:9" } }));
    // Order of the pair does not matter, and string ids are accepted
    let ack9 = join(&mut w9, &mut r9, "friend", json!("5")).await;
    assert_eq!(ack9["data"]["room_id"], "friend:5:9");

    send_event(
        &mut w5,
        "send_message",
        json!({ "kind": "friend", "target_id": 9, "content": "hi bob" }),
    )
    .await;

    let to_sender = recv_event(&mut r5).await;
    let to_friend = recv_event(&mut r9).await;
    assert_eq!(to_sender, to_friend);
    assert_eq!(to_sender["event"], "new_message");

    let data = &to_sender["data"];
    assert!(data["message_id"].as_i64().unwrap() > 0);
    assert_eq!(data["sender_id"], 5);
    assert_eq!(data["sender_username"], "alice");
    assert_eq!(data["sender_nickname"], "Alice");
    assert_eq!(data["receiver_id"], 9);
    assert_eq!(data["group_id"], Value::Null);
    assert_eq!(data["content"], "hi bob");
    assert_eq!(data["target_kind"], "friend");

    // The broadcast mirrors the persisted row
    let history = server
        .store
        .fetch_messages(9, chat_server::chat::room::ConversationKind::Friend, 5)
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, data["message_id"].as_i64().unwrap());
    assert_eq!(history[0].sent_at, data["sent_at"].as_str().unwrap());
}

#[tokio::test]
async fn test_original_client_event_names() {
    let server = start_test_server(true).await;
    let (mut w5, mut r5) = connect(&server, 5).await;

    send_event(&mut w5, "join_chat", json!({ "contact_type": "friend", "contact_id": "9" })).await;
    assert_eq!(recv_event(&mut r5).await["data"]["room_id"], "friend:5:9");

    send_event(
        &mut w5,
        "send_message",
        json!({ "contact_type": "friend", "contact_id": "9", "message_content": "legacy" }),
    )
    .await;
    let event = recv_event(&mut r5).await;
    assert_eq!(event["event"], "new_message");
    assert_eq!(event["data"]["content"], "legacy");

    send_event(&mut w5, "leave_chat", json!({ "room_name": "friend:5:9" })).await;
    assert_eq!(
        recv_event(&mut r5).await,
        json!({ "event": "left_room_ack", "data": { "room_id": "friend:5:9" } })
    );
}

#[tokio::test]
async fn test_group_send_without_joining() {
    let server = start_test_server(true).await;
    let (mut w7, mut r7) = connect(&server, 7).await;
    let (mut w11, mut r11) = connect(&server, 11).await;

    let ack = join(&mut w11, &mut r11, "group", json!(3)).await;
    assert_eq!(ack["data"]["room_id"], "group:3");

    send_event(
        &mut w7,
        "send_message",
        json!({ "kind": "group", "target_id": 3, "content": "trail is open" }),
    )
    .await;

    let event = recv_event(&mut r11).await;
    assert_eq!(event["event"], "new_message");
    assert_eq!(event["data"]["group_id"], 3);
    assert_eq!(event["data"]["receiver_id"], Value::Null);
    assert_eq!(event["data"]["sender_nickname"], "carol");
    assert_eq!(event["data"]["content"], "trail is open");

    // The sender never joined group:3
    assert_silent(&mut r7).await;
}

#[tokio::test]
async fn test_invalid_send_reports_only_to_sender() {
    let server = start_test_server(true).await;
    let (mut w5, mut r5) = connect(&server, 5).await;
    let (mut w9, mut r9) = connect(&server, 9).await;
    join(&mut w5, &mut r5, "friend", json!(9)).await;
    join(&mut w9, &mut r9, "friend", json!(5)).await;

    send_event(
        &mut w5,
        "send_message",
        json!({ "kind": "friend", "target_id": 9, "content": "" }),
    )
    .await;
    let event = recv_event(&mut r5).await;
    assert_eq!(event["event"], "message_error");
    assert_silent(&mut r9).await;

    send_event(
        &mut w5,
        "send_message",
        json!({ "kind": "channel", "target_id": 9, "content": "hi" }),
    )
    .await;
    assert_eq!(recv_event(&mut r5).await["event"], "message_error");

    let history = server
        .store
        .fetch_messages(5, chat_server::chat::room::ConversationKind::Friend, 9)
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_join_errors_and_unknown_events() {
    let server = start_test_server(true).await;
    let (mut w5, mut r5) = connect(&server, 5).await;

    assert_eq!(join(&mut w5, &mut r5, "dm", json!(9)).await["event"], "join_error");
    assert_eq!(join(&mut w5, &mut r5, "friend", json!("nine")).await["event"], "join_error");

    send_event(&mut w5, "shout", json!({})).await;
    assert_eq!(recv_event(&mut r5).await["event"], "error");

    w5.send(Message::Text("not json".into())).await.unwrap();
    assert_eq!(recv_event(&mut r5).await["event"], "error");

    // The connection survives bad input
    assert_eq!(join(&mut w5, &mut r5, "friend", json!(9)).await["event"], "joined_room_ack");
}

#[tokio::test]
async fn test_typing_excludes_sender() {
    let server = start_test_server(true).await;
    let (mut w5, mut r5) = connect(&server, 5).await;
    let (mut w9, mut r9) = connect(&server, 9).await;
    join(&mut w5, &mut r5, "friend", json!(9)).await;
    join(&mut w9, &mut r9, "friend", json!(5)).await;

    send_event(&mut w5, "typing_start", json!({})).await;
    assert_eq!(
        recv_event(&mut r9).await,
        json!({ "event": "is_typing", "data": { "user_id": 5, "nickname": "Alice" } })
    );

    send_event(&mut w5, "typing_stop", Value::Null).await;
    assert_eq!(recv_event(&mut r9).await["event"], "is_not_typing");

    assert_silent(&mut r5).await;
}

#[tokio::test]
async fn test_switching_rooms_stops_old_deliveries() {
    let server = start_test_server(true).await;
    let (mut w5, mut r5) = connect(&server, 5).await;
    let (mut w9, mut r9) = connect(&server, 9).await;
    join(&mut w5, &mut r5, "friend", json!(9)).await;
    join(&mut w9, &mut r9, "friend", json!(5)).await;

    // 9 moves to another conversation; friend:5:9 no longer reaches it
    join(&mut w9, &mut r9, "friend", json!(11)).await;
    send_event(&mut w5, "typing_start", json!({})).await;
    assert_silent(&mut r9).await;
}

#[tokio::test]
async fn test_expired_token_rejected_with_4001() {
    let server = start_test_server(true).await;
    let profile = server.store.fetch_profile(5).unwrap().unwrap();
    let expired = issue_access_token(&server.jwt_secret, 5, Some(&profile), -3600).unwrap();

    let (ws_stream, _) = tokio_tungstenite::connect_async(server.ws_url(&expired))
        .await
        .expect("WebSocket should upgrade to report the auth failure");
    let (_write, mut read) = ws_stream.split();

    let event = recv_event(&mut read).await;
    assert_eq!(event["event"], "auth_error");

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Expected close frame within timeout");
    match msg {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(u16::from(frame.code), 4001, "Expected close code 4001 (token expired)");
        }
        other => panic!("Expected close frame, got: {:?}", other),
    }

    assert_eq!(server.registry.connection_count(), 0);
}

#[tokio::test]
async fn test_garbage_token_rejected_with_4002() {
    let server = start_test_server(true).await;
    let (ws_stream, _) = tokio_tungstenite::connect_async(server.ws_url("invalid_jwt_token"))
        .await
        .expect("WebSocket should upgrade to report the auth failure");
    let (_write, mut read) = ws_stream.split();

    assert_eq!(recv_event(&mut read).await["event"], "auth_error");
    match tokio::time::timeout(Duration::from_secs(2), read.next()).await {
        Ok(Some(Ok(Message::Close(Some(frame))))) => assert_eq!(u16::from(frame.code), 4002),
        other => panic!("Expected close frame, got: {:?}", other),
    }
    assert_eq!(server.registry.connection_count(), 0);
}

#[tokio::test]
async fn test_missing_token_is_401() {
    let server = start_test_server(true).await;
    let url = format!("ws://{}/ws", server.addr);

    match tokio_tungstenite::connect_async(url).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 401);
        }
        other => panic!("Expected HTTP 401, got: {:?}", other.map(|(_, r)| r.status())),
    }
}

#[tokio::test]
async fn test_query_token_can_be_disabled() {
    let server = start_test_server(false).await;
    let token = server.token_for(5);

    match tokio_tungstenite::connect_async(server.ws_url(&token)).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 401);
        }
        other => panic!("Expected HTTP 401, got: {:?}", other.map(|(_, r)| r.status())),
    }

    // The Authorization header still works
    let mut request = format!("ws://{}/ws", server.addr).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Authorization", format!("Bearer {}", token).parse().unwrap());
    let (ws_stream, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("Header token should be accepted");
    let (mut write, mut read) = ws_stream.split();
    assert_eq!(join(&mut write, &mut read, "friend", json!(9)).await["event"], "joined_room_ack");
}

#[tokio::test]
async fn test_disconnect_releases_all_rooms() {
    let server = start_test_server(true).await;
    let (mut w5, mut r5) = connect(&server, 5).await;
    join(&mut w5, &mut r5, "group", json!(3)).await;

    // Personal room plus group:3
    assert_eq!(server.registry.connection_count(), 1);
    assert_eq!(server.registry.room_count(), 2);

    w5.send(Message::Close(None)).await.unwrap();
    drop(w5);
    drop(r5);

    let registry = server.registry.clone();
    assert!(eventually(move || registry.connection_count() == 0 && registry.room_count() == 0).await);
}

#[tokio::test]
async fn test_ping_pong() {
    let server = start_test_server(true).await;
    let (mut write, mut read) = connect(&server, 5).await;

    write
        .send(Message::Ping(vec![42, 43, 44].into()))
        .await
        .expect("Failed to send ping");

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Expected pong within timeout");
    match msg {
        Some(Ok(Message::Pong(data))) => {
            assert_eq!(data.as_ref(), &[42, 43, 44], "Pong data should match ping");
        }
        other => panic!("Expected Pong message, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_unresponsive_peer_is_dropped_after_pong_timeout() {
    let server = start_test_server_with(true, FAST_KEEPALIVE).await;
    // Never polled, so the client never answers pings
    let (_write, _read) = connect(&server, 5).await;

    let registry = server.registry.clone();
    assert!(eventually(move || registry.connection_count() == 1).await);

    let registry = server.registry.clone();
    assert!(
        eventually(move || registry.connection_count() == 0 && registry.room_count() == 0).await,
        "connection without pongs should be unregistered"
    );
}

#[tokio::test]
async fn test_responsive_peer_survives_keepalive() {
    let server = start_test_server_with(true, FAST_KEEPALIVE).await;
    let (_write, mut read) = connect(&server, 5).await;

    // Reading lets the client answer pings automatically
    let mut pings = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_millis(800);
    while let Ok(msg) = tokio::time::timeout_at(deadline, read.next()).await {
        match msg {
            Some(Ok(Message::Ping(_))) => pings += 1,
            other => panic!("Expected only pings, got: {:?}", other),
        }
    }

    assert!(pings >= 2, "expected several keepalive pings, got {}", pings);
    assert_eq!(server.registry.connection_count(), 1);
}
