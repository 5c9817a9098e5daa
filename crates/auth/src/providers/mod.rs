//! Provider implementations.
//!
//! This module contains implementations of `ProviderClient` for:
//! - Generic OAuth2 authorization-code providers (GitHub preset)
//! - OpenID Connect providers with discovery (Google preset)
//! - An offline mock provider

mod mock;
mod oauth;
mod oidc;
mod session;

pub use mock::{encode_code, MockProvider};
pub use oauth::{OAuth2Endpoints, OAuth2Provider, ProfileFields};
pub use oidc::{OidcProvider, GOOGLE_ISSUER};
pub use session::OAuth2Session;
