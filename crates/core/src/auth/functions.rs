use base64::{engine::general_purpose::URL_SAFE, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::{distr::Alphanumeric, Rng, RngCore};

use super::SessionId;

/// Number of random bytes behind a generated state token.
const STATE_TOKEN_BYTES: usize = 64;

/// Generate a cryptographically random session ID.
pub fn generate_session_id() -> SessionId {
    let id: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    SessionId::new(id)
}

/// Generate a random state parameter for CSRF protection.
///
/// 64 random bytes, URL-safe base64 encoded (88 characters).
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE.encode(bytes)
}

/// Check whether a token with the given expiry is no longer usable.
///
/// Tokens without an expiry never expire.
pub fn is_token_expired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(expires_at, Some(at) if at <= now)
}

/// Calculate expiry from creation time and TTL.
pub fn calculate_expiry(created_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    created_at + ttl
}

/// Extract username from email if no name provided.
pub fn email_to_name(email: &str) -> String {
    match email.split('@').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "User".to_string(),
    }
}
