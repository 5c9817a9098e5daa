use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Auth errors for the authgate_auth crate.
///
/// This wraps the core `AuthError` and adds crate-specific error variants
/// for the HTTP layer that can't be in the functional core.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Error from the auth flow (resolution, state validation, provider calls, storage)
    #[error(transparent)]
    Core(#[from] authgate_core::auth::AuthError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed inbound request
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl AuthError {
    /// HTTP status and client-facing message for this error.
    fn status_and_message(&self) -> (StatusCode, String) {
        use authgate_core::auth::AuthError as CoreError;

        match self {
            AuthError::Core(core_err) => match core_err {
                CoreError::ProviderNameMissing
                | CoreError::StateMismatch
                | CoreError::NoSessionData(_)
                | CoreError::SessionDecode(_) => (StatusCode::BAD_REQUEST, self.to_string()),
                CoreError::ProviderNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
                CoreError::UserFetch(_)
                | CoreError::Reauthorization(_)
                | CoreError::CodeExchange(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
                CoreError::Storage(_)
                | CoreError::SessionPersist(_)
                | CoreError::Provider(_)
                | CoreError::InvalidAuthUrl(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                ),
            },
            AuthError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server configuration error".to_string(),
            ),
            AuthError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        if status.is_server_error() {
            tracing::error!(error = %self, source = ?std::error::Error::source(&self), "Auth error");
        } else {
            tracing::debug!(error = %self, status = %status, "Auth request rejected");
        }

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authgate_core::auth::AuthError as CoreError;

    fn status_of(err: impl Into<AuthError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn client_errors_map_to_400() {
        assert_eq!(status_of(CoreError::ProviderNameMissing), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(CoreError::StateMismatch), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(CoreError::NoSessionData("github".to_string())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn unknown_provider_maps_to_404() {
        assert_eq!(
            status_of(CoreError::ProviderNotFound("gitlab".to_string())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn credential_failures_map_to_401() {
        let reauth = CoreError::Reauthorization(Box::new(CoreError::CodeExchange("bad".into())));
        assert_eq!(status_of(reauth), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(CoreError::UserFetch("expired".to_string())),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn storage_failures_map_to_500() {
        let persist = CoreError::SessionPersist(Box::new(CoreError::Storage("down".into())));
        assert_eq!(status_of(persist), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn invalid_requests_map_to_400() {
        assert_eq!(
            status_of(AuthError::InvalidRequest("unreadable form".to_string())),
            StatusCode::BAD_REQUEST
        );
    }
}
