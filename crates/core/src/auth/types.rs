use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// Cryptographically random identifier of one browser session.
///
/// Every value kept in a `SessionStore` is scoped by a session id, which the
/// HTTP layer carries in a cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized user profile returned once authentication completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Name of the provider that authenticated the user.
    pub provider: String,
    /// Provider's unique user identifier.
    pub user_id: String,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nick_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    /// Unmodified payload returned by the provider.
    #[serde(default)]
    pub raw_data: serde_json::Value,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub id_token: Option<String>,
}

/// Provider-agnostic claims extracted from an OIDC ID token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OidcClaims {
    /// Provider's unique user identifier.
    pub subject: String,
    /// User's email address.
    pub email: Option<String>,
    /// User's display name.
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
}

/// Parameters delivered by a provider callback, either from the query
/// string or from a form-encoded body.
///
/// Order is preserved and repeated keys are kept; `get` returns the first
/// value for a key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams(Vec<(String, String)>);

impl CallbackParams {
    /// Parses `application/x-www-form-urlencoded` input. Never fails; malformed
    /// pairs decode leniently.
    pub fn parse(input: &str) -> Self {
        Self(
            form_urlencoded::parse(input.as_bytes())
                .into_owned()
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
