pub mod jwt;
pub mod middleware;
pub mod verifier;

pub use verifier::{verify_token, UserIdentity};
