use url::{ParseError, Url};

use super::AuthError;

/// Query parameter carrying the anti-CSRF token in authorization URLs.
pub const STATE_PARAM: &str = "state";

/// Base that relative authorization URLs are resolved against. Only the
/// query is read, so the host never matters.
const RELATIVE_BASE: &str = "http://localhost/";

/// Extracts the state token embedded in an authorization URL.
///
/// Relative URLs such as `/login?state=..` are accepted. Returns `Ok(None)`
/// when the URL has no (or an empty) `state` parameter.
pub fn extract_state(auth_url: &str) -> Result<Option<String>, AuthError> {
    let url = parse_auth_url(auth_url).map_err(|e| AuthError::InvalidAuthUrl(e.to_string()))?;

    Ok(url
        .query_pairs()
        .find(|(key, _)| key == STATE_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty()))
}

fn parse_auth_url(auth_url: &str) -> Result<Url, ParseError> {
    match Url::parse(auth_url) {
        Err(ParseError::RelativeUrlWithoutBase) => Url::parse(RELATIVE_BASE)?.join(auth_url),
        parsed => parsed,
    }
}

/// Validates the state token returned by a provider callback against the
/// token embedded in the original authorization URL.
///
/// An authorization URL without a `state` parameter skips validation. This
/// mirrors providers that do not round-trip state and is intentionally
/// permissive.
///
/// # Examples
///
/// ```
/// use authgate_core::auth::validate_state;
///
/// let url = "https://github.com/login/oauth/authorize?state=abc";
/// assert!(validate_state(url, Some("abc")).is_ok());
/// assert!(validate_state(url, Some("xyz")).is_err());
///
/// // No state in the original URL: anything passes.
/// assert!(validate_state("https://example.com/authorize", Some("xyz")).is_ok());
/// ```
pub fn validate_state(auth_url: &str, callback_state: Option<&str>) -> Result<(), AuthError> {
    match extract_state(auth_url)? {
        Some(original) if Some(original.as_str()) != callback_state => {
            Err(AuthError::StateMismatch)
        }
        _ => Ok(()),
    }
}
