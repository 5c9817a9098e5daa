//! Generic OAuth2 authorization-code provider.

use async_trait::async_trait;
use authgate_core::auth::{
    calculate_expiry, AuthError, CallbackParams, ProviderClient, ProviderSession, Result,
    UserProfile,
};
use chrono::Utc;
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use serde_json::Value;
use url::Url;

use super::OAuth2Session;
use crate::config::ProviderConfig;

/// Client with auth and token endpoints set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    oauth2::EndpointSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointSet,
>;

const USER_AGENT: &str = concat!("authgate/", env!("CARGO_PKG_VERSION"));

/// Endpoints of an OAuth2 provider.
#[derive(Debug, Clone)]
pub struct OAuth2Endpoints {
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

/// Names of the userinfo JSON fields that feed each profile attribute.
#[derive(Debug, Clone)]
pub struct ProfileFields {
    pub user_id: &'static str,
    pub name: &'static str,
    pub nick_name: &'static str,
    pub email: &'static str,
    pub avatar_url: &'static str,
    pub description: &'static str,
    pub location: &'static str,
}

impl ProfileFields {
    /// Field layout of GitHub's `/user` endpoint.
    pub const GITHUB: Self = Self {
        user_id: "id",
        name: "name",
        nick_name: "login",
        email: "email",
        avatar_url: "avatar_url",
        description: "bio",
        location: "location",
    };

    /// Builds a profile from a userinfo document.
    ///
    /// # Errors
    ///
    /// `UserFetch` when the document carries no user id.
    pub fn to_profile(&self, provider: &str, raw: Value) -> Result<UserProfile> {
        let user_id = field(&raw, self.user_id).ok_or_else(|| {
            AuthError::UserFetch(format!("userinfo has no `{}` field", self.user_id))
        })?;

        Ok(UserProfile {
            provider: provider.to_string(),
            user_id,
            name: field(&raw, self.name),
            nick_name: field(&raw, self.nick_name),
            email: field(&raw, self.email),
            avatar_url: field(&raw, self.avatar_url),
            description: field(&raw, self.description),
            location: field(&raw, self.location),
            raw_data: raw,
            ..UserProfile::default()
        })
    }
}

/// String or numeric field, as a string. Null and empty values are absent.
fn field(raw: &Value, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Authorization-code provider that reads the user from a userinfo endpoint.
pub struct OAuth2Provider {
    name: String,
    client: ConfiguredClient,
    http_client: reqwest::Client,
    scopes: Vec<String>,
    userinfo_url: Url,
    fields: ProfileFields,
}

impl OAuth2Provider {
    /// # Errors
    ///
    /// `Provider` when an endpoint or the redirect URI is not a valid URL.
    pub fn new(
        name: impl Into<String>,
        endpoints: OAuth2Endpoints,
        config: &ProviderConfig,
        scopes: Vec<String>,
        fields: ProfileFields,
    ) -> Result<Self> {
        let auth_url = AuthUrl::new(endpoints.auth_url)
            .map_err(|e| AuthError::Provider(format!("Invalid auth URL: {e}")))?;
        let token_url = TokenUrl::new(endpoints.token_url)
            .map_err(|e| AuthError::Provider(format!("Invalid token URL: {e}")))?;
        let userinfo_url = Url::parse(&endpoints.userinfo_url)
            .map_err(|e| AuthError::Provider(format!("Invalid userinfo URL: {e}")))?;
        let redirect_url = RedirectUrl::new(config.redirect_uri.to_string())
            .map_err(|e| AuthError::Provider(format!("Invalid redirect URL: {e}")))?;

        let mut client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url);
        if let Some(secret) = &config.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }

        // Token responses must not be followed through redirects.
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::Provider(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            client,
            http_client,
            scopes,
            userinfo_url,
            fields,
        })
    }

    /// GitHub OAuth app.
    pub fn github(config: &ProviderConfig) -> Result<Self> {
        Self::new(
            "github",
            OAuth2Endpoints {
                auth_url: "https://github.com/login/oauth/authorize".to_string(),
                token_url: "https://github.com/login/oauth/access_token".to_string(),
                userinfo_url: "https://api.github.com/user".to_string(),
            },
            config,
            vec!["read:user".to_string(), "user:email".to_string()],
            ProfileFields::GITHUB,
        )
    }
}

#[async_trait]
impl ProviderClient for OAuth2Provider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn begin_auth(&self, state: &str) -> Result<Box<dyn ProviderSession>> {
        let state = state.to_string();
        let (auth_url, _csrf) = self
            .client
            .authorize_url(move || CsrfToken::new(state))
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .url();

        Ok(Box::new(OAuth2Session::new(auth_url.to_string())))
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
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::CodeExchange("callback carries no code".to_string()))?;

        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| AuthError::CodeExchange(format!("Token exchange failed: {e}")))?;

        let access_token = token.access_token().secret().clone();
        session.access_token = Some(access_token.clone());
        session.refresh_token = token.refresh_token().map(|t| t.secret().clone());
        session.expires_at = token
            .expires_in()
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|ttl| calculate_expiry(Utc::now(), ttl));

        tracing::debug!(provider = %self.name, "Authorization code exchanged");
        Ok(access_token)
    }

    async fn fetch_user(&self, session: &dyn ProviderSession) -> Result<UserProfile> {
        let session = OAuth2Session::from_dyn(session)?;
        let access_token = session.valid_access_token(Utc::now())?;

        let response = self
            .http_client
            .get(self.userinfo_url.clone())
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AuthError::UserFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::UserFetch(format!(
                "{} responded with status {}",
                self.name,
                response.status()
            )));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| AuthError::UserFetch(e.to_string()))?;

        let mut user = self.fields.to_profile(&self.name, raw)?;
        user.access_token = session.access_token.clone();
        user.refresh_token = session.refresh_token.clone();
        user.expires_at = session.expires_at;
        Ok(user)
    }
}
