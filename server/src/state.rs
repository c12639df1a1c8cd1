use std::time::Duration;

use crate::db::SharedStore;
use crate::ws::Registry;

/// Socket keepalive timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keepalive {
    /// Time between server pings.
    pub ping_interval: Duration,
    /// How long to wait for the pong before the connection is dropped.
    pub pong_timeout: Duration,
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Persistence collaborator (messages, profiles, contacts)
    pub store: SharedStore,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Live connections and room membership
    pub registry: Registry,
    /// Accept `?token=` on the socket handshake when no Authorization header is sent
    pub allow_query_token: bool,
    pub keepalive: Keepalive,
}

impl AppState {
    pub fn new(store: SharedStore, jwt_secret: Vec<u8>) -> Self {
        Self {
            store,
            jwt_secret,
            registry: Registry::new(),
            allow_query_token: true,
            keepalive: Keepalive::default(),
        }
    }
}
