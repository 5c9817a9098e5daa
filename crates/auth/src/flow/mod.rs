//! Begin/complete orchestration of third-party authentication.
//!
//! `AuthFlow::begin_auth` persists a provider session and hands back the
//! provider's authorization URL. `AuthFlow::complete_auth` reconciles the
//! provider callback with that stored session:
//!
//! 1. resolve the provider
//! 2. load the stored session blob
//! 3. unmarshal it
//! 4. validate the state token
//! 5. try fetching the user with the stored credentials
//! 6. otherwise recover the callback parameters (query, or POST form)
//! 7. re-authorize with them
//! 8. persist the refreshed session
//! 9. fetch the user again
//!
//! The attempt is logged out whichever way the callback flow exits.

mod guard;
mod strategy;

use std::sync::Arc;

use authgate_core::auth::{
    generate_session_id, validate_state, AuthError, ProviderClient, ProviderRegistry, Result,
    SessionId, SessionStore, UserProfile,
};
use tracing::debug;

use crate::extractors::AuthRequest;
use guard::AttemptGuard;

pub use strategy::{
    DefaultNameResolver, HeaderNameResolver, NameResolver, RandomStateIssuer,
    RequestStateReader, StateIssuer, StateReader, PROVIDER_PARAM,
};

/// Outcome of a successful begin-auth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginAuth {
    /// Provider authorization URL to redirect the user to.
    pub auth_url: String,
    /// Session the attempt was stored in.
    pub session_id: SessionId,
    /// Whether `session_id` was minted for this request and must be sent back
    /// in a cookie.
    pub new_session: bool,
}

/// Orchestrates begin-auth and complete-auth over a provider registry and a
/// session store.
///
/// Immutable once built; share it behind an `Arc`.
pub struct AuthFlow {
    providers: Arc<dyn ProviderRegistry>,
    store: Arc<dyn SessionStore>,
    name_resolver: Arc<dyn NameResolver>,
    state_issuer: Arc<dyn StateIssuer>,
    state_reader: Arc<dyn StateReader>,
}

impl AuthFlow {
    /// Creates a flow with the default strategies.
    pub fn new(providers: Arc<dyn ProviderRegistry>, store: Arc<dyn SessionStore>) -> Self {
        Self::builder(providers, store).build()
    }

    pub fn builder(
        providers: Arc<dyn ProviderRegistry>,
        store: Arc<dyn SessionStore>,
    ) -> AuthFlowBuilder {
        AuthFlowBuilder {
            flow: Self {
                providers,
                store,
                name_resolver: Arc::new(DefaultNameResolver),
                state_issuer: Arc::new(RandomStateIssuer),
                state_reader: Arc::new(RequestStateReader),
            },
        }
    }

    /// Starts authentication with the provider the request names.
    ///
    /// # Errors
    ///
    /// `ProviderNameMissing`, `ProviderNotFound`, or whatever the provider
    /// and store return. Nothing is stored unless every step succeeds.
    pub async fn begin_auth(&self, request: &AuthRequest) -> Result<BeginAuth> {
        let (name, provider) = self.resolve_provider(request)?;

        let state = self.state_issuer.issue(request);
        let session = provider.begin_auth(&state).await?;
        let auth_url = session.auth_url()?;
        let blob = session.marshal()?;

        let (session_id, new_session) = match request.session_id() {
            Some(id) => (id.clone(), false),
            None => (generate_session_id(), true),
        };
        self.store.set(&session_id, &name, &blob).await?;

        debug!(provider = %name, new_session, "Auth attempt started");

        Ok(BeginAuth {
            auth_url,
            session_id,
            new_session,
        })
    }

    /// Completes authentication from a provider callback.
    ///
    /// The request's session is logged out before this returns, on success
    /// and on error alike.
    pub async fn complete_auth(&self, request: &AuthRequest) -> Result<UserProfile> {
        let guard = request
            .session_id()
            .map(|id| AttemptGuard::new(Arc::clone(&self.store), id.clone()));

        let result = self.complete_attempt(request).await;

        if let Some(guard) = guard {
            guard.release().await;
        }
        result
    }

    /// Invalidates every auth attempt of a session. Never fails.
    pub async fn logout(&self, session: &SessionId) {
        guard::logout(self.store.as_ref(), session).await;
    }

    async fn complete_attempt(&self, request: &AuthRequest) -> Result<UserProfile> {
        let (name, provider) = self.resolve_provider(request)?;

        let session_id = request
            .session_id()
            .ok_or_else(|| AuthError::NoSessionData(name.clone()))?;
        let blob = self
            .store
            .get(session_id, &name)
            .await?
            .ok_or_else(|| AuthError::NoSessionData(name.clone()))?;
        debug!(provider = %name, "Session data found");

        let mut session = provider.unmarshal_session(&blob)?;

        let callback_state = self.state_reader.current(request);
        validate_state(&session.auth_url()?, callback_state.as_deref())?;
        debug!(provider = %name, "State token validated");

        // Any failure here, stale token or transient, falls through to re-authorization.
        match provider.fetch_user(session.as_ref()).await {
            Ok(user) => {
                debug!(provider = %name, "User fetched with stored session");
                return Ok(user);
            }
            Err(e) => debug!(provider = %name, error = %e, "Stored session cannot fetch user"),
        }

        let params = request.callback_params();
        debug!(provider = %name, params = params.len(), "Re-authorizing with callback parameters");

        provider
            .authorize(session.as_mut(), params)
            .await
            .map_err(|e| AuthError::Reauthorization(Box::new(e)))?;

        let blob = session
            .marshal()
            .map_err(|e| AuthError::SessionPersist(Box::new(e)))?;
        self.store
            .set(session_id, &name, &blob)
            .await
            .map_err(|e| AuthError::SessionPersist(Box::new(e)))?;
        debug!(provider = %name, "Refreshed session stored");

        provider.fetch_user(session.as_ref()).await
    }

    fn resolve_provider(&self, request: &AuthRequest) -> Result<(String, Arc<dyn ProviderClient>)> {
        let name = self.name_resolver.resolve(request)?;
        let provider = self.providers.lookup(&name)?;
        Ok((name, provider))
    }
}

/// Builder for [`AuthFlow`] strategy overrides.
pub struct AuthFlowBuilder {
    flow: AuthFlow,
}

impl AuthFlowBuilder {
    pub fn name_resolver(mut self, resolver: impl NameResolver + 'static) -> Self {
        self.flow.name_resolver = Arc::new(resolver);
        self
    }

    pub fn state_issuer(mut self, issuer: impl StateIssuer + 'static) -> Self {
        self.flow.state_issuer = Arc::new(issuer);
        self
    }

    pub fn state_reader(mut self, reader: impl StateReader + 'static) -> Self {
        self.flow.state_reader = Arc::new(reader);
        self
    }

    pub fn build(self) -> AuthFlow {
        self.flow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::OAuth2Session;
    use crate::sessions::InMemorySessionStore;
    use async_trait::async_trait;
    use axum::http::{HeaderName, HeaderValue};
    use authgate_core::auth::{CallbackParams, ProviderSession, Providers};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// GitHub-like fake: fetch succeeds only with an access token, authorize
    /// accepts code `XYZ`.
    #[derive(Default)]
    struct FakeProvider {
        fetch_calls: AtomicUsize,
        authorize_calls: AtomicUsize,
        seen_params: Mutex<Option<CallbackParams>>,
        panic_on_fetch: bool,
        hang_on_fetch: bool,
    }

    impl FakeProvider {
        fn fetches(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }

        fn authorizations(&self) -> usize {
            self.authorize_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderClient for FakeProvider {
        fn name(&self) -> &str {
            "github"
        }

        async fn begin_auth(&self, state: &str) -> Result<Box<dyn ProviderSession>> {
            Ok(Box::new(OAuth2Session::new(format!(
                "https://github.com/login/oauth/authorize?state={state}&client_id=cid"
            ))))
        }

        fn unmarshal_session(&self, data: &str) -> Result<Box<dyn ProviderSession>> {
            Ok(Box::new(OAuth2Session::unmarshal(data)?))
        }

        async fn authorize(
            &self,
            session: &mut dyn ProviderSession,
            params: &CallbackParams,
        ) -> Result<String> {
            self.authorize_calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_params.lock().unwrap() = Some(params.clone());

            if params.get("code") != Some("XYZ") {
                return Err(AuthError::CodeExchange("bad verification code".to_string()));
            }
            let session = OAuth2Session::from_dyn_mut(session)?;
            session.access_token = Some("gho_fresh".to_string());
            Ok("gho_fresh".to_string())
        }

        async fn fetch_user(&self, session: &dyn ProviderSession) -> Result<UserProfile> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_fetch {
                panic!("provider exploded");
            }
            if self.hang_on_fetch {
                std::future::pending::<()>().await;
            }

            let session = OAuth2Session::from_dyn(session)?;
            let token = session.valid_access_token(chrono::Utc::now())?;
            Ok(UserProfile {
                provider: "github".to_string(),
                user_id: "42".to_string(),
                access_token: Some(token.to_string()),
                ..UserProfile::default()
            })
        }
    }

    struct Fixture {
        provider: Arc<FakeProvider>,
        store: InMemorySessionStore,
        flow: AuthFlow,
    }

    fn fixture_with(provider: FakeProvider) -> Fixture {
        let provider = Arc::new(provider);
        let store = InMemorySessionStore::default();
        let providers = Providers::new().with(provider.clone());
        let flow = AuthFlow::builder(Arc::new(providers), Arc::new(store.clone()))
            .state_issuer(|_: &AuthRequest| "S1".to_string())
            .build();
        Fixture {
            provider,
            store,
            flow,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(FakeProvider::default())
    }

    async fn begin(fx: &Fixture) -> BeginAuth {
        fx.flow
            .begin_auth(&AuthRequest::get("").with_path_param("provider", "github"))
            .await
            .unwrap()
    }

    fn callback(session: &SessionId, query: &str) -> AuthRequest {
        AuthRequest::get(query)
            .with_path_param("provider", "github")
            .with_session(session.clone())
    }

    #[tokio::test]
    async fn begin_returns_url_and_stores_session() {
        let fx = fixture();

        let begin = begin(&fx).await;

        assert_eq!(
            begin.auth_url,
            "https://github.com/login/oauth/authorize?state=S1&client_id=cid"
        );
        assert!(begin.new_session);
        let blob = fx.store.get(&begin.session_id, "github").await.unwrap();
        assert!(blob.is_some());
    }

    #[tokio::test]
    async fn begin_reuses_existing_session() {
        let fx = fixture();
        let existing = SessionId::new("existing".to_string());

        let begin = fx
            .flow
            .begin_auth(
                &AuthRequest::get("provider=github").with_session(existing.clone()),
            )
            .await
            .unwrap();

        assert!(!begin.new_session);
        assert_eq!(begin.session_id, existing);
        assert!(fx.store.get(&existing, "github").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn begin_with_unknown_provider_stores_nothing() {
        let fx = fixture();

        let err = fx
            .flow
            .begin_auth(&AuthRequest::get("provider=gitlab"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::ProviderNotFound(name) if name == "gitlab"));
        assert!(fx.store.is_empty().await);
    }

    #[tokio::test]
    async fn begin_without_provider_name_fails() {
        let fx = fixture();

        let err = fx.flow.begin_auth(&AuthRequest::get("")).await.unwrap_err();

        assert!(matches!(err, AuthError::ProviderNameMissing));
    }

    #[tokio::test]
    async fn complete_reauthorizes_stale_session() {
        let fx = fixture();
        let begin = begin(&fx).await;

        let user = fx
            .flow
            .complete_auth(&callback(&begin.session_id, "state=S1&code=XYZ"))
            .await
            .unwrap();

        assert_eq!(user.provider, "github");
        assert_eq!(user.user_id, "42");
        assert_eq!(user.access_token.as_deref(), Some("gho_fresh"));
        assert_eq!(fx.provider.fetches(), 2);
        assert_eq!(fx.provider.authorizations(), 1);

        let params = fx.provider.seen_params.lock().unwrap().clone().unwrap();
        assert_eq!(params.get("state"), Some("S1"));
        assert_eq!(params.get("code"), Some("XYZ"));
    }

    #[tokio::test]
    async fn complete_uses_fast_path_for_valid_session() {
        let fx = fixture();
        let session_id = SessionId::new("warm".to_string());
        let mut warm = OAuth2Session::new("https://github.com/login/oauth/authorize?state=S1");
        warm.access_token = Some("gho_cached".to_string());
        fx.store
            .set(&session_id, "github", &warm.marshal().unwrap())
            .await
            .unwrap();

        let user = fx
            .flow
            .complete_auth(&callback(&session_id, "state=S1"))
            .await
            .unwrap();

        assert_eq!(user.access_token.as_deref(), Some("gho_cached"));
        assert_eq!(fx.provider.fetches(), 1);
        assert_eq!(fx.provider.authorizations(), 0);
    }

    #[tokio::test]
    async fn complete_recovers_params_from_post_body() {
        let fx = fixture();
        let begin = begin(&fx).await;

        let request = AuthRequest::post("")
            .with_path_param("provider", "github")
            .with_form("state=S1&code=XYZ")
            .with_session(begin.session_id.clone());

        let user = fx.flow.complete_auth(&request).await.unwrap();

        assert_eq!(user.user_id, "42");
        let params = fx.provider.seen_params.lock().unwrap().clone().unwrap();
        assert_eq!(params.get("code"), Some("XYZ"));
    }

    #[tokio::test]
    async fn complete_without_stored_session_never_fetches() {
        let fx = fixture();
        let session_id = SessionId::new("empty".to_string());

        let err = fx
            .flow
            .complete_auth(&callback(&session_id, "state=S1&code=XYZ"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::NoSessionData(name) if name == "github"));
        assert_eq!(fx.provider.fetches(), 0);
    }

    #[tokio::test]
    async fn complete_without_session_cookie_fails() {
        let fx = fixture();

        let request = AuthRequest::get("state=S1&code=XYZ").with_path_param("provider", "github");
        let err = fx.flow.complete_auth(&request).await.unwrap_err();

        assert!(matches!(err, AuthError::NoSessionData(_)));
        assert_eq!(fx.provider.fetches(), 0);
    }

    #[tokio::test]
    async fn complete_rejects_state_mismatch_before_fetch() {
        let fx = fixture();
        let begin = begin(&fx).await;

        let err = fx
            .flow
            .complete_auth(&callback(&begin.session_id, "state=forged&code=XYZ"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::StateMismatch));
        assert_eq!(fx.provider.fetches(), 0);
        assert!(fx.store.get(&begin.session_id, "github").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn complete_skips_validation_when_url_has_no_state() {
        let fx = fixture();
        let session_id = SessionId::new("stateless".to_string());
        let session = OAuth2Session::new("https://github.com/login/oauth/authorize?client_id=cid");
        fx.store
            .set(&session_id, "github", &session.marshal().unwrap())
            .await
            .unwrap();

        let user = fx
            .flow
            .complete_auth(&callback(&session_id, "state=whatever&code=XYZ"))
            .await
            .unwrap();

        assert_eq!(user.user_id, "42");
    }

    fn flow_with(provider: &Arc<FakeProvider>, store: &InMemorySessionStore) -> AuthFlowBuilder {
        let providers = Providers::new().with(provider.clone());
        AuthFlow::builder(Arc::new(providers), Arc::new(store.clone()))
            .state_issuer(|_: &AuthRequest| "S1".to_string())
    }

    #[tokio::test]
    async fn custom_name_resolver_drives_begin_and_complete() {
        let provider = Arc::new(FakeProvider::default());
        let store = InMemorySessionStore::default();
        let flow = flow_with(&provider, &store)
            .name_resolver(HeaderNameResolver::new(HeaderName::from_static(
                "x-auth-provider",
            )))
            .build();
        let with_header = |request: AuthRequest| {
            request.with_header(
                HeaderName::from_static("x-auth-provider"),
                HeaderValue::from_static("github"),
            )
        };

        // The path parameter is not consulted by the header resolver.
        let begin = flow
            .begin_auth(&with_header(
                AuthRequest::get("").with_path_param("provider", "gitlab"),
            ))
            .await
            .unwrap();
        assert!(store.get(&begin.session_id, "github").await.unwrap().is_some());

        let user = flow
            .complete_auth(&with_header(
                AuthRequest::get("state=S1&code=XYZ").with_session(begin.session_id.clone()),
            ))
            .await
            .unwrap();
        assert_eq!(user.user_id, "42");
        assert_eq!(provider.authorizations(), 1);

        let err = flow
            .begin_auth(&AuthRequest::get("provider=github"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ProviderNameMissing));
    }

    #[tokio::test]
    async fn custom_state_reader_drives_validation() {
        let provider = Arc::new(FakeProvider::default());
        let store = InMemorySessionStore::default();
        let flow = flow_with(&provider, &store)
            .state_reader(|request: &AuthRequest| {
                request
                    .headers()
                    .get("x-state")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
            .build();
        let request = |session: &SessionId, query: &str, state: &'static str| {
            callback(session, query)
                .with_header(HeaderName::from_static("x-state"), HeaderValue::from_static(state))
        };

        let begin = flow
            .begin_auth(&AuthRequest::get("provider=github"))
            .await
            .unwrap();
        let err = flow
            .complete_auth(&request(&begin.session_id, "state=S1&code=XYZ", "forged"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));
        assert_eq!(provider.fetches(), 0);

        let begin = flow
            .begin_auth(&AuthRequest::get("provider=github"))
            .await
            .unwrap();
        let user = flow
            .complete_auth(&request(&begin.session_id, "state=forged&code=XYZ", "S1"))
            .await
            .unwrap();
        assert_eq!(user.user_id, "42");
    }

    #[tokio::test]
    async fn complete_rejects_corrupt_session() {
        let fx = fixture();
        let session_id = SessionId::new("corrupt".to_string());
        fx.store.set(&session_id, "github", "{{{").await.unwrap();

        let err = fx
            .flow
            .complete_auth(&callback(&session_id, "state=S1&code=XYZ"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::SessionDecode(_)));
    }

    #[tokio::test]
    async fn complete_wraps_authorize_failure() {
        let fx = fixture();
        let begin = begin(&fx).await;

        let err = fx
            .flow
            .complete_auth(&callback(&begin.session_id, "state=S1&code=WRONG"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Reauthorization(_)));
        assert!(matches!(err.root_cause(), AuthError::CodeExchange(_)));
        assert_eq!(fx.provider.fetches(), 1);
    }

    /// Store whose writes always fail.
    struct ReadOnlyStore(InMemorySessionStore);

    #[async_trait]
    impl SessionStore for ReadOnlyStore {
        async fn get(&self, session: &SessionId, key: &str) -> Result<Option<String>> {
            self.0.get(session, key).await
        }

        async fn set(&self, _: &SessionId, _: &str, _: &str) -> Result<()> {
            Err(AuthError::Storage("read-only replica".to_string()))
        }

        async fn delete(&self, session: &SessionId) -> Result<()> {
            self.0.delete(session).await
        }
    }

    #[tokio::test]
    async fn complete_wraps_persist_failure() {
        let inner = InMemorySessionStore::default();
        let session_id = SessionId::new("persist".to_string());
        let session = OAuth2Session::new("https://github.com/login/oauth/authorize?state=S1");
        inner
            .set(&session_id, "github", &session.marshal().unwrap())
            .await
            .unwrap();

        let provider = Arc::new(FakeProvider::default());
        let flow = AuthFlow::new(
            Arc::new(Providers::new().with(provider.clone())),
            Arc::new(ReadOnlyStore(inner.clone())),
        );

        let err = flow
            .complete_auth(&callback(&session_id, "state=S1&code=XYZ"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::SessionPersist(_)));
        assert!(matches!(err.root_cause(), AuthError::Storage(_)));
        assert_eq!(provider.authorizations(), 1);
        assert_eq!(provider.fetches(), 1);
        assert!(inner.is_empty().await);
    }

    #[tokio::test]
    async fn complete_logs_out_on_success() {
        let fx = fixture();
        let begin = begin(&fx).await;

        fx.flow
            .complete_auth(&callback(&begin.session_id, "state=S1&code=XYZ"))
            .await
            .unwrap();

        assert!(fx.store.get(&begin.session_id, "github").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn complete_logs_out_on_error() {
        let fx = fixture();
        let begin = begin(&fx).await;

        let _ = fx
            .flow
            .complete_auth(&callback(&begin.session_id, "state=S1&code=WRONG"))
            .await;

        assert!(fx.store.is_empty().await);
    }

    #[tokio::test]
    async fn complete_logs_out_when_provider_panics() {
        let fx = fixture_with(FakeProvider {
            panic_on_fetch: true,
            ..FakeProvider::default()
        });
        let begin = begin(&fx).await;
        let flow = Arc::new(fx.flow);
        let request = callback(&begin.session_id, "state=S1&code=XYZ");

        let task = {
            let flow = Arc::clone(&flow);
            tokio::spawn(async move { flow.complete_auth(&request).await })
        };
        assert!(task.await.unwrap_err().is_panic());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(fx.store.is_empty().await);
    }

    #[tokio::test]
    async fn complete_logs_out_when_cancelled() {
        let fx = fixture_with(FakeProvider {
            hang_on_fetch: true,
            ..FakeProvider::default()
        });
        let begin = begin(&fx).await;
        let request = callback(&begin.session_id, "state=S1&code=XYZ");

        let outcome =
            tokio::time::timeout(Duration::from_millis(20), fx.flow.complete_auth(&request)).await;
        assert!(outcome.is_err());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(fx.store.is_empty().await);
    }

    #[tokio::test]
    async fn logout_twice_is_harmless() {
        let fx = fixture();
        let begin = begin(&fx).await;

        fx.flow.logout(&begin.session_id).await;
        fx.flow.logout(&begin.session_id).await;

        assert!(fx.store.get(&begin.session_id, "github").await.unwrap().is_none());
    }
}
