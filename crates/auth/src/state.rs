//! Application state for auth.

use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::flow::AuthFlow;

/// Shared state for auth handlers.
#[derive(Clone)]
pub struct AuthState {
    pub flow: Arc<AuthFlow>,
    pub config: Arc<AuthConfig>,
}

impl AuthState {
    pub fn new(flow: AuthFlow, config: AuthConfig) -> Self {
        Self {
            flow: Arc::new(flow),
            config: Arc::new(config),
        }
    }
}

/// Allows AuthState to be extracted from a parent state.
impl<S> FromRef<S> for AuthState
where
    S: AsRef<AuthState>,
{
    fn from_ref(state: &S) -> Self {
        state.as_ref().clone()
    }
}
