//! Third-party authentication flow for axum.
//!
//! This crate provides:
//! - The begin/complete orchestration (`AuthFlow`) over a provider registry
//!   and a session store
//! - OAuth2, OIDC and mock providers
//! - Session storage (in-memory, or Redis via the `redis` feature)
//! - An axum extractor, routes and a cache-safe redirect helper

mod config;
mod error;
mod extractors;
mod flow;
mod handlers;
mod providers;
pub mod redirect;
mod sessions;
mod state;

pub use config::{
    AuthConfig, ProviderConfig, DEFAULT_BASE_URL, DEFAULT_COOKIE_NAME, DEFAULT_SESSION_TTL,
};
pub use error::AuthError;
pub use extractors::AuthRequest;
pub use flow::{
    AuthFlow, AuthFlowBuilder, BeginAuth, DefaultNameResolver, HeaderNameResolver, NameResolver,
    RandomStateIssuer, RequestStateReader, StateIssuer, StateReader, PROVIDER_PARAM,
};
pub use handlers::auth_routes;
pub use providers::{
    encode_code, MockProvider, OAuth2Endpoints, OAuth2Provider, OAuth2Session, OidcProvider,
    ProfileFields, GOOGLE_ISSUER,
};
pub use redirect::{redirect, redirect_for};
pub use sessions::InMemorySessionStore;
#[cfg(feature = "redis")]
pub use sessions::RedisSessionStore;
pub use state::AuthState;
