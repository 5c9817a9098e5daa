use std::time::Duration;

use axum_extra::extract::cookie::SameSite;
use url::Url;

use crate::error::AuthError;

/// Default name of the cookie carrying the browser session id.
pub const DEFAULT_COOKIE_NAME: &str = "_authgate_session";

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Default lifetime of a stored auth attempt.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(10 * 60);

/// Configuration for a single OAuth2/OIDC client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: Url,
}

/// Complete auth configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub github: Option<ProviderConfig>,
    pub google: Option<ProviderConfig>,
    pub session_ttl: Duration,
    pub base_url: Url,
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub cookie_same_site: SameSite,
    pub redis_url: Option<String>,
}

impl AuthConfig {
    /// Load from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `AUTH_BASE_URL`: Base URL for callback redirects (default: `http://localhost:3000`)
    /// - `SESSION_COOKIE_NAME`: Session cookie name (default: `_authgate_session`)
    /// - `COOKIE_SECURE`: Whether to set secure flag on cookies (default: true)
    /// - `COOKIE_SAME_SITE`: `lax`, `strict` or `none` (default: `lax`). Use `none`
    ///   for providers that POST the callback cross-site (`response_mode=form_post`);
    ///   it requires `COOKIE_SECURE`
    /// - `SESSION_TTL_MINUTES`: Auth attempt TTL in minutes (default: 10)
    /// - `GITHUB_CLIENT_ID`: GitHub OAuth client ID (optional, enables GitHub auth)
    /// - `GITHUB_CLIENT_SECRET`: GitHub OAuth client secret (required if GitHub enabled)
    /// - `GOOGLE_CLIENT_ID`: Google OAuth client ID (optional, enables Google auth)
    /// - `GOOGLE_CLIENT_SECRET`: Google OAuth client secret (required if Google enabled)
    /// - `REDIS_URL`: Redis connection URL (optional, selects the Redis session store)
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid, the TTL is not a number of
    /// minutes that fits in seconds, or a provider is partially configured
    /// (e.g., client ID without secret).
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AuthConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AuthError> {
        let base_url = lookup("AUTH_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base_url)
            .map_err(|e| AuthError::Config(format!("AUTH_BASE_URL must be a valid URL: {e}")))?;

        let github = provider_from_lookup(&lookup, "GITHUB", "github", &base_url)?;
        let google = provider_from_lookup(&lookup, "GOOGLE", "google", &base_url)?;

        let session_ttl = match lookup("SESSION_TTL_MINUTES") {
            Some(minutes) => session_ttl_from_minutes(&minutes)?,
            None => DEFAULT_SESSION_TTL,
        };

        let cookie_secure = lookup("COOKIE_SECURE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        let cookie_same_site = match lookup("COOKIE_SAME_SITE") {
            Some(value) => same_site_from_str(&value)?,
            None => SameSite::Lax,
        };
        if cookie_same_site == SameSite::None && !cookie_secure {
            return Err(AuthError::Config(
                "COOKIE_SAME_SITE=none requires COOKIE_SECURE".to_string(),
            ));
        }

        let cookie_name = lookup("SESSION_COOKIE_NAME")
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string());

        Ok(Self {
            github,
            google,
            session_ttl,
            base_url,
            cookie_name,
            cookie_secure,
            cookie_same_site,
            redis_url: lookup("REDIS_URL").filter(|url| !url.is_empty()),
        })
    }

    /// Session TTL in whole seconds, saturating at `i64::MAX`.
    pub fn session_ttl_secs(&self) -> i64 {
        i64::try_from(self.session_ttl.as_secs()).unwrap_or(i64::MAX)
    }

    /// Callback URL of the named provider under the base URL.
    pub fn callback_url(&self, provider: &str) -> Result<Url, AuthError> {
        callback_url(&self.base_url, provider)
    }
}

fn same_site_from_str(value: &str) -> Result<SameSite, AuthError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "lax" => Ok(SameSite::Lax),
        "strict" => Ok(SameSite::Strict),
        "none" => Ok(SameSite::None),
        other => Err(AuthError::Config(format!(
            "COOKIE_SAME_SITE must be lax, strict or none, got {other:?}"
        ))),
    }
}

fn session_ttl_from_minutes(minutes: &str) -> Result<Duration, AuthError> {
    minutes
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|minutes| minutes.checked_mul(60))
        .map(Duration::from_secs)
        .ok_or_else(|| {
            AuthError::Config(format!(
                "SESSION_TTL_MINUTES must be a whole number of minutes, got {minutes:?}"
            ))
        })
}

fn callback_url(base_url: &Url, provider: &str) -> Result<Url, AuthError> {
    base_url
        .join(&format!("/auth/{provider}/callback"))
        .map_err(|e| AuthError::Config(format!("invalid callback URL for {provider}: {e}")))
}

fn provider_from_lookup(
    lookup: &impl Fn(&str) -> Option<String>,
    prefix: &str,
    provider: &str,
    base_url: &Url,
) -> Result<Option<ProviderConfig>, AuthError> {
    let Some(client_id) = lookup(&format!("{prefix}_CLIENT_ID")) else {
        return Ok(None);
    };

    let secret_var = format!("{prefix}_CLIENT_SECRET");
    let client_secret = lookup(&secret_var)
        .ok_or_else(|| AuthError::Config(format!("{secret_var} is required with {prefix}_CLIENT_ID")))?;

    Ok(Some(ProviderConfig {
        client_id,
        client_secret: Some(client_secret),
        redirect_uri: callback_url(base_url, provider)?,
    }))
}
