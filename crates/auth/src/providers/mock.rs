//! Mock provider for development and testing.
//!
//! Authorization codes are base64-encoded JSON claims, so no network is
//! involved. The authorization URL points straight back at the callback with
//! a code for the configured user, which makes `--mock` servers log in
//! without an identity provider.

use async_trait::async_trait;
use authgate_core::auth::{
    calculate_expiry, AuthError, CallbackParams, OidcClaims, ProviderClient, ProviderSession,
    Result, UserProfile,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{Duration, Utc};
use url::Url;

use super::OAuth2Session;

/// Lifetime of access tokens issued by the mock provider.
const MOCK_TOKEN_TTL_MINUTES: i64 = 60;

/// Encode claims as a mock authorization code.
pub fn encode_code(claims: &OidcClaims) -> String {
    // OidcClaims is plain strings; serialization cannot fail.
    STANDARD.encode(serde_json::to_vec(claims).unwrap_or_default())
}

fn decode_code(code: &str) -> Result<OidcClaims> {
    let decoded = STANDARD
        .decode(code)
        .map_err(|e| AuthError::CodeExchange(e.to_string()))?;

    serde_json::from_slice(&decoded).map_err(|e| AuthError::CodeExchange(e.to_string()))
}

/// Offline provider that authorizes whatever claims the code carries.
pub struct MockProvider {
    name: String,
    redirect_uri: Url,
    user: OidcClaims,
}

impl MockProvider {
    /// # Arguments
    /// * `name` - Provider name to register under (e.g. `github`)
    /// * `redirect_uri` - The callback URL for the main app
    /// * `user` - Claims encoded into the codes of generated authorization URLs
    pub fn new(name: impl Into<String>, redirect_uri: Url, user: OidcClaims) -> Self {
        Self {
            name: name.into(),
            redirect_uri,
            user,
        }
    }

    /// Mock provider logging in a fixed development user.
    pub fn with_default_user(name: impl Into<String>, redirect_uri: Url) -> Self {
        let name = name.into();
        let user = OidcClaims {
            subject: format!("mock-{name}-dev"),
            email: Some("dev@example.com".to_string()),
            name: Some("Dev User".to_string()),
            given_name: Some("Dev".to_string()),
            family_name: Some("User".to_string()),
            picture: None,
        };
        Self::new(name, redirect_uri, user)
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn begin_auth(&self, state: &str) -> Result<Box<dyn ProviderSession>> {
        let mut url = self.redirect_uri.clone();
        url.query_pairs_mut()
            .append_pair("state", state)
            .append_pair("code", &encode_code(&self.user));

        Ok(Box::new(OAuth2Session::new(url.to_string())))
    }

    fn unmarshal_session(&self, data: &str) -> Result<Box<dyn ProviderSession>> {
        Ok(Box::new(OAuth2Session::unmarshal(data)?))
    }

    async fn authorize(
        &self,
        session: &mut dyn ProviderSession,
        params: &CallbackParams,
    ) -> Result<String> {
        let session = OAuth2Session::from_dyn_mut(session)?;
        let code = params
            .get("code")
            .ok_or_else(|| AuthError::CodeExchange("callback carries no code".to_string()))?;
        let claims = decode_code(code)?;

        let access_token = format!("mock-token-{}", claims.subject);
        session.access_token = Some(access_token.clone());
        session.expires_at = Some(calculate_expiry(
            Utc::now(),
            Duration::minutes(MOCK_TOKEN_TTL_MINUTES),
        ));
        session.claims = Some(claims);

        Ok(access_token)
    }

    async fn fetch_user(&self, session: &dyn ProviderSession) -> Result<UserProfile> {
        let session = OAuth2Session::from_dyn(session)?;
        session.valid_access_token(Utc::now())?;
        session.claims_profile(&self.name)
    }
}
