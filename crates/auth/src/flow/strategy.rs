//! Pluggable request strategies of the auth flow.
//!
//! Each strategy is a single-method trait; plain closures implement them too.

use axum::http::{HeaderName, Method};
use authgate_core::auth::{generate_state, AuthError, Result, STATE_PARAM};

use crate::extractors::AuthRequest;

/// Route and query parameter naming the provider.
pub const PROVIDER_PARAM: &str = "provider";

/// Resolves which provider a request targets.
pub trait NameResolver: Send + Sync {
    fn resolve(&self, request: &AuthRequest) -> Result<String>;
}

/// Issues the state token embedded in a new authorization URL.
pub trait StateIssuer: Send + Sync {
    fn issue(&self, request: &AuthRequest) -> String;
}

/// Reads the state token a provider callback returned.
pub trait StateReader: Send + Sync {
    fn current(&self, request: &AuthRequest) -> Option<String>;
}

impl<F> NameResolver for F
where
    F: Fn(&AuthRequest) -> Result<String> + Send + Sync,
{
    fn resolve(&self, request: &AuthRequest) -> Result<String> {
        self(request)
    }
}

impl<F> StateIssuer for F
where
    F: Fn(&AuthRequest) -> String + Send + Sync,
{
    fn issue(&self, request: &AuthRequest) -> String {
        self(request)
    }
}

impl<F> StateReader for F
where
    F: Fn(&AuthRequest) -> Option<String> + Send + Sync,
{
    fn current(&self, request: &AuthRequest) -> Option<String> {
        self(request)
    }
}

/// Route parameter `provider` first, then query parameter `provider`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNameResolver;

impl NameResolver for DefaultNameResolver {
    fn resolve(&self, request: &AuthRequest) -> Result<String> {
        request
            .path_param(PROVIDER_PARAM)
            .filter(|name| !name.is_empty())
            .or_else(|| {
                request
                    .query()
                    .get(PROVIDER_PARAM)
                    .filter(|name| !name.is_empty())
            })
            .map(str::to_string)
            .ok_or(AuthError::ProviderNameMissing)
    }
}

/// Reads the provider name from a request header, for deployments that route
/// tenants by header.
#[derive(Debug, Clone)]
pub struct HeaderNameResolver {
    header: HeaderName,
}

impl HeaderNameResolver {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl NameResolver for HeaderNameResolver {
    fn resolve(&self, request: &AuthRequest) -> Result<String> {
        request
            .headers()
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or(AuthError::ProviderNameMissing)
    }
}

/// Reuses a `state` already present on the begin request, otherwise
/// generates 64 random bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomStateIssuer;

impl StateIssuer for RandomStateIssuer {
    fn issue(&self, request: &AuthRequest) -> String {
        match request.query().get(STATE_PARAM) {
            Some(state) if !state.is_empty() => state.to_string(),
            _ => generate_state(),
        }
    }
}

/// Query `state`, or the form body's `state` for POST callbacks without a
/// query string.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestStateReader;

impl StateReader for RequestStateReader {
    fn current(&self, request: &AuthRequest) -> Option<String> {
        let params = if request.query().is_empty() && request.method() == Method::POST {
            request.form()
        } else {
            request.query()
        };
        params.get(STATE_PARAM).map(str::to_string)
    }
}
