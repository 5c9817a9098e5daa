use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use super::{AuthError, CallbackParams, SessionId, UserProfile};

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Provider-specific state of one authentication handshake.
///
/// `marshal` and `ProviderClient::unmarshal_session` must be inverses over
/// every observable field. The encoding itself is up to the provider.
pub trait ProviderSession: Send + Sync + std::fmt::Debug {
    /// Authorization URL the session was created with.
    fn auth_url(&self) -> Result<String>;

    /// Serialize the session into an opaque string.
    fn marshal(&self) -> Result<String>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Abstraction over an OAuth/OIDC identity provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Registry name of this provider (e.g. `github`).
    fn name(&self) -> &str;

    /// Start a handshake bound to `state`.
    async fn begin_auth(&self, state: &str) -> Result<Box<dyn ProviderSession>>;

    /// Rebuild a session previously produced by `ProviderSession::marshal`.
    fn unmarshal_session(&self, data: &str) -> Result<Box<dyn ProviderSession>>;

    /// Exchange callback parameters for fresh credentials, updating the
    /// session in place. Returns the new access token.
    async fn authorize(
        &self,
        session: &mut dyn ProviderSession,
        params: &CallbackParams,
    ) -> Result<String>;

    /// Fetch the user's profile using the credentials held by the session.
    async fn fetch_user(&self, session: &dyn ProviderSession) -> Result<UserProfile>;
}

/// Resolves provider names to clients.
pub trait ProviderRegistry: Send + Sync {
    /// Returns `ProviderNotFound` for unknown names.
    fn lookup(&self, name: &str) -> Result<Arc<dyn ProviderClient>>;
}

/// Key-value storage of opaque blobs, scoped per browser session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Retrieve a value, `None` if the session or key does not exist.
    async fn get(&self, session: &SessionId, key: &str) -> Result<Option<String>>;

    /// Store a value, replacing any previous one under the same key.
    async fn set(&self, session: &SessionId, key: &str, value: &str) -> Result<()>;

    /// Remove every value of the session. Deleting an unknown session is not an error.
    async fn delete(&self, session: &SessionId) -> Result<()>;
}
