use thiserror::Error;

/// Errors produced while beginning or completing an authentication attempt.
///
/// Each variant maps to the step of the flow that failed. Variants wrapping
/// another `AuthError` keep the collaborator's error reachable through
/// `std::error::Error::source`.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no provider name found in request")]
    ProviderNameMissing,

    #[error("no provider registered for '{0}'")]
    ProviderNotFound(String),

    #[error("could not find a matching session for provider '{0}'")]
    NoSessionData(String),

    #[error("failed to decode provider session: {0}")]
    SessionDecode(String),

    #[error("invalid authorization URL: {0}")]
    InvalidAuthUrl(String),

    #[error("state token mismatch")]
    StateMismatch,

    #[error("re-authorization failed")]
    Reauthorization(#[source] Box<AuthError>),

    #[error("failed to persist provider session")]
    SessionPersist(#[source] Box<AuthError>),

    #[error("failed to fetch user: {0}")]
    UserFetch(String),

    #[error("failed to exchange authorization code: {0}")]
    CodeExchange(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("provider error: {0}")]
    Provider(String),
}

impl AuthError {
    /// Returns the innermost error of a wrapped chain.
    pub fn root_cause(&self) -> &AuthError {
        match self {
            Self::Reauthorization(inner) | Self::SessionPersist(inner) => inner.root_cause(),
            other => other,
        }
    }
}
