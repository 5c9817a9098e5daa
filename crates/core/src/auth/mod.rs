mod error;
mod functions;
mod registry;
mod traits;
mod types;
mod validation;

pub use error::AuthError;
pub use functions::{
    calculate_expiry, email_to_name, generate_session_id, generate_state, is_token_expired,
};
pub use registry::Providers;
pub use traits::{ProviderClient, ProviderRegistry, ProviderSession, Result, SessionStore};
pub use types::{CallbackParams, OidcClaims, SessionId, UserProfile};
pub use validation::{extract_state, validate_state, STATE_PARAM};
