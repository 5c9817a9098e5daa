//! Application state wiring the auth flow from configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use authgate_auth::{
    AuthConfig, AuthFlow, AuthState, InMemorySessionStore, MockProvider, OAuth2Provider,
    OidcProvider,
};
use authgate_core::auth::{Providers, SessionStore};

/// Providers registered by `--mock`.
const MOCK_PROVIDERS: &[&str] = &["github", "google"];

/// How often expired in-memory auth attempts are purged.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[cfg(feature = "redis")]
const REDIS_POOL_SIZE: usize = 4;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    /// Names of the registered providers, sorted.
    pub providers: Arc<Vec<String>>,
}

impl AsRef<AuthState> for AppState {
    fn as_ref(&self) -> &AuthState {
        &self.auth
    }
}

impl AppState {
    /// Builds the session store and provider registry described by `config`.
    ///
    /// With `mock` set, offline mock providers replace the configured ones.
    pub async fn from_config(config: AuthConfig, mock: bool) -> Result<Self> {
        let store = session_store(&config).await?;
        let providers = if mock {
            mock_providers(&config)?
        } else {
            configured_providers(&config).await?
        };

        let names: Vec<String> = providers.names().into_iter().map(String::from).collect();
        tracing::info!(providers = ?names, mock, "Auth providers registered");

        let flow = AuthFlow::new(Arc::new(providers), store);
        Ok(Self {
            auth: AuthState::new(flow, config),
            providers: Arc::new(names),
        })
    }
}

async fn session_store(config: &AuthConfig) -> Result<Arc<dyn SessionStore>> {
    #[cfg(feature = "redis")]
    {
        if let Some(url) = &config.redis_url {
            let store = authgate_auth::RedisSessionStore::connect(
                url,
                REDIS_POOL_SIZE,
                config.session_ttl,
            )
            .await?;
            return Ok(Arc::new(store));
        }
    }

    #[cfg(not(feature = "redis"))]
    {
        if config.redis_url.is_some() {
            tracing::warn!("REDIS_URL is set but the redis feature is disabled; using in-memory sessions");
        }
    }

    let store = InMemorySessionStore::new(config.session_ttl);
    spawn_purge(store.clone());
    Ok(Arc::new(store))
}

fn spawn_purge(store: InMemorySessionStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = store.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "Purged expired auth attempts");
            }
        }
    });
}

fn mock_providers(config: &AuthConfig) -> Result<Providers> {
    let mut providers = Providers::new();
    for name in MOCK_PROVIDERS {
        let redirect_uri = config.callback_url(name)?;
        providers.register(Arc::new(MockProvider::with_default_user(*name, redirect_uri)));
    }
    Ok(providers)
}

async fn configured_providers(config: &AuthConfig) -> Result<Providers> {
    let mut providers = Providers::new();

    if let Some(github) = &config.github {
        providers.register(Arc::new(OAuth2Provider::github(github)?));
    }

    if let Some(google) = &config.google {
        providers.register(Arc::new(OidcProvider::google(google).await?));
    }

    if providers.is_empty() {
        tracing::warn!("No auth providers configured; set GITHUB_CLIENT_ID or GOOGLE_CLIENT_ID, or run with --mock");
    }

    Ok(providers)
}
