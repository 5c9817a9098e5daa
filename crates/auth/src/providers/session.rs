//! Provider session shared by the bundled providers.

use std::any::Any;

use authgate_core::auth::{
    email_to_name, is_token_expired, AuthError, OidcClaims, ProviderSession, Result, UserProfile,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of one OAuth2/OIDC handshake, marshaled as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuth2Session {
    pub auth_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// PKCE verifier matching the challenge sent with `auth_url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkce_verifier: Option<String>,
    /// Verified ID token claims (OIDC providers only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<OidcClaims>,
}

impl OAuth2Session {
    pub fn new(auth_url: impl Into<String>) -> Self {
        Self {
            auth_url: auth_url.into(),
            ..Self::default()
        }
    }

    pub fn unmarshal(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| AuthError::SessionDecode(e.to_string()))
    }

    /// Downcasts a provider session created by one of the bundled providers.
    pub fn from_dyn(session: &dyn ProviderSession) -> Result<&Self> {
        session
            .as_any()
            .downcast_ref::<Self>()
            .ok_or_else(foreign_session)
    }

    pub fn from_dyn_mut(session: &mut dyn ProviderSession) -> Result<&mut Self> {
        session
            .as_any_mut()
            .downcast_mut::<Self>()
            .ok_or_else(foreign_session)
    }

    /// The access token, if present and unexpired at `now`.
    pub fn valid_access_token(&self, now: DateTime<Utc>) -> Result<&str> {
        let token = self
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AuthError::UserFetch("cannot get user information without access token".into())
            })?;

        if is_token_expired(self.expires_at, now) {
            return Err(AuthError::UserFetch("access token has expired".to_string()));
        }

        Ok(token)
    }

    /// Profile built from the claims verified at re-authorization.
    pub fn claims_profile(&self, provider: &str) -> Result<UserProfile> {
        let claims = self
            .claims
            .as_ref()
            .ok_or_else(|| AuthError::UserFetch("session holds no verified claims".to_string()))?;

        let name = claims
            .name
            .clone()
            .or_else(|| claims.email.as_deref().map(email_to_name));

        Ok(UserProfile {
            provider: provider.to_string(),
            user_id: claims.subject.clone(),
            name,
            first_name: claims.given_name.clone(),
            last_name: claims.family_name.clone(),
            email: claims.email.clone(),
            avatar_url: claims.picture.clone(),
            raw_data: serde_json::to_value(claims).unwrap_or_default(),
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self.expires_at,
            id_token: self.id_token.clone(),
            ..UserProfile::default()
        })
    }
}

fn foreign_session() -> AuthError {
    AuthError::SessionDecode("session was not created by an OAuth2 provider".to_string())
}

impl ProviderSession for OAuth2Session {
    fn auth_url(&self) -> Result<String> {
        if self.auth_url.is_empty() {
            return Err(AuthError::InvalidAuthUrl(
                "session has no authorization URL".to_string(),
            ));
        }
        Ok(self.auth_url.clone())
    }

    fn marshal(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| AuthError::Provider(e.to_string()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
