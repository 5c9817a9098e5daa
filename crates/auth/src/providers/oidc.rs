//! OpenID Connect provider with discovery and PKCE.

use async_trait::async_trait;
use authgate_core::auth::{
    calculate_expiry, AuthError, CallbackParams, OidcClaims, ProviderClient,
    ProviderSession, Result, UserProfile,
};
use chrono::Utc;
use openidconnect::{
    core::{CoreAuthenticationFlow, CoreClient, CoreIdTokenClaims, CoreProviderMetadata},
    reqwest, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointMaybeSet, EndpointSet,
    IssuerUrl, Nonce, OAuth2TokenResponse, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl,
    Scope, TokenResponse,
};

use super::OAuth2Session;
use crate::config::ProviderConfig;

/// Type alias for a CoreClient configured from provider metadata.
///
/// Discovery always yields the auth URL; token and userinfo endpoints may be
/// missing from the metadata.
type ConfiguredCoreClient = CoreClient<
    EndpointSet,
    openidconnect::EndpointNotSet,
    openidconnect::EndpointNotSet,
    openidconnect::EndpointNotSet,
    EndpointMaybeSet,
    EndpointMaybeSet,
>;

pub const GOOGLE_ISSUER: &str = "https://accounts.google.com";

/// OIDC provider whose user comes from the verified ID token.
pub struct OidcProvider {
    name: String,
    client: ConfiguredCoreClient,
    http_client: reqwest::Client,
    scopes: Vec<String>,
}

impl OidcProvider {
    /// Create a provider by discovering the issuer's OIDC metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The issuer URL is invalid
    /// - Discovery fails (network error or invalid metadata)
    /// - The redirect URI is invalid
    pub async fn discover(
        name: impl Into<String>,
        issuer: &str,
        config: &ProviderConfig,
        scopes: Vec<String>,
    ) -> Result<Self> {
        let issuer_url =
            IssuerUrl::new(issuer.to_string()).map_err(|e| AuthError::Provider(e.to_string()))?;

        // Build HTTP client without redirect following (security requirement)
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::Provider(format!("Failed to build HTTP client: {e}")))?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http_client)
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        let client = CoreClient::from_provider_metadata(
            provider_metadata,
            ClientId::new(config.client_id.clone()),
            config.client_secret.clone().map(ClientSecret::new),
        )
        .set_redirect_uri(
            RedirectUrl::new(config.redirect_uri.to_string())
                .map_err(|e| AuthError::Provider(e.to_string()))?,
        );

        Ok(Self {
            name: name.into(),
            client,
            http_client,
            scopes,
        })
    }

    /// Google accounts, requesting `openid email profile`.
    pub async fn google(config: &ProviderConfig) -> Result<Self> {
        Self::discover(
            "google",
            GOOGLE_ISSUER,
            config,
            vec!["email".to_string(), "profile".to_string()],
        )
        .await
    }
}

#[async_trait]
impl ProviderClient for OidcProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn begin_auth(&self, state: &str) -> Result<Box<dyn ProviderSession>> {
        let state = state.to_string();
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, _csrf_token, _nonce) = self
            .client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                move || CsrfToken::new(state),
                Nonce::new_random,
            )
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(pkce_challenge)
            .url();

        let mut session = OAuth2Session::new(auth_url.to_string());
        session.pkce_verifier = Some(pkce_verifier.secret().clone());
        Ok(Box::new(session))
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

        let mut request = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| AuthError::CodeExchange(e.to_string()))?;
        if let Some(verifier) = &session.pkce_verifier {
            request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.clone()));
        }

        let token_response = request
            .request_async(&self.http_client)
            .await
            .map_err(|e| AuthError::CodeExchange(e.to_string()))?;

        let id_token = token_response
            .id_token()
            .ok_or_else(|| AuthError::CodeExchange("No ID token in response".to_string()))?;

        let claims = id_token
            .claims(&self.client.id_token_verifier(), |_: Option<&Nonce>| Ok(()))
            .map_err(|e| AuthError::CodeExchange(e.to_string()))?;

        session.claims = Some(oidc_claims(claims));

        let access_token = token_response.access_token().secret().clone();
        session.access_token = Some(access_token.clone());
        session.refresh_token = token_response.refresh_token().map(|t| t.secret().clone());
        session.expires_at = token_response
            .expires_in()
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|ttl| calculate_expiry(Utc::now(), ttl));
        session.id_token = serde_json::to_value(id_token)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string));
        session.pkce_verifier = None;

        tracing::debug!(provider = %self.name, "ID token verified");
        Ok(access_token)
    }

    async fn fetch_user(&self, session: &dyn ProviderSession) -> Result<UserProfile> {
        let session = OAuth2Session::from_dyn(session)?;
        session.valid_access_token(Utc::now())?;
        session.claims_profile(&self.name)
    }
}

/// Profile claims carried by a verified ID token.
fn oidc_claims(claims: &CoreIdTokenClaims) -> OidcClaims {
    OidcClaims {
        subject: claims.subject().to_string(),
        email: claims.email().map(|e| e.to_string()),
        name: claims
            .name()
            .and_then(|n| n.get(None))
            .map(|n| n.to_string()),
        given_name: claims
            .given_name()
            .and_then(|n| n.get(None))
            .map(|n| n.to_string()),
        family_name: claims
            .family_name()
            .and_then(|n| n.get(None))
            .map(|n| n.to_string()),
        picture: claims
            .picture()
            .and_then(|p| p.get(None))
            .map(|p| p.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openidconnect::{
        Audience, EmptyAdditionalClaims, EndUserEmail, EndUserName, EndUserPictureUrl,
        StandardClaims, SubjectIdentifier,
    };

    #[test]
    fn id_token_claims_map_to_profile_claims() {
        let standard = StandardClaims::new(SubjectIdentifier::new("g-123".to_string()))
            .set_email(Some(EndUserEmail::new("ada@example.com".to_string())))
            .set_name(Some(EndUserName::new("Ada Lovelace".to_string()).into()))
            .set_picture(Some(
                EndUserPictureUrl::new("https://example.com/ada.png".to_string()).into(),
            ));
        let claims = CoreIdTokenClaims::new(
            IssuerUrl::new(GOOGLE_ISSUER.to_string()).unwrap(),
            vec![Audience::new("cid".to_string())],
            Utc::now() + chrono::Duration::minutes(5),
            Utc::now(),
            standard,
            EmptyAdditionalClaims {},
        );

        let mapped = oidc_claims(&claims);

        assert_eq!(mapped.subject, "g-123");
        assert_eq!(mapped.email.as_deref(), Some("ada@example.com"));
        assert_eq!(mapped.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(mapped.given_name, None);
        assert_eq!(mapped.picture.as_deref(), Some("https://example.com/ada.png"));
    }

    #[test]
    fn google_issuer_is_valid() {
        assert!(IssuerUrl::new(GOOGLE_ISSUER.to_string()).is_ok());
    }
}
