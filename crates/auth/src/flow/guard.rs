//! Scoped release of an auth attempt.

use std::sync::Arc;

use authgate_core::auth::{SessionId, SessionStore};

/// Logs out an auth attempt when the callback flow exits.
///
/// Normal exits call [`AttemptGuard::release`]. If the guard is dropped
/// instead (panic unwinding, or the request future being cancelled) the
/// logout is spawned on the current tokio runtime.
pub(crate) struct AttemptGuard {
    store: Arc<dyn SessionStore>,
    session: Option<SessionId>,
}

impl AttemptGuard {
    pub(crate) fn new(store: Arc<dyn SessionStore>, session: SessionId) -> Self {
        Self {
            store,
            session: Some(session),
        }
    }

    pub(crate) async fn release(mut self) {
        if let Some(session) = self.session.take() {
            logout(self.store.as_ref(), &session).await;
        }
    }
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = Arc::clone(&self.store);
                handle.spawn(async move {
                    logout(store.as_ref(), &session).await;
                });
            }
            Err(_) => {
                tracing::warn!(session = %session, "No runtime to release auth attempt");
            }
        }
    }
}

/// Best-effort logout; failures are logged and swallowed.
pub(crate) async fn logout(store: &dyn SessionStore, session: &SessionId) {
    match store.delete(session).await {
        Ok(()) => tracing::debug!(session = %session, "Auth attempt released"),
        Err(e) => tracing::warn!(session = %session, error = %e, "Failed to release auth attempt"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::InMemorySessionStore;
    use std::time::Duration;

    fn session() -> SessionId {
        SessionId::new("guarded".to_string())
    }

    #[tokio::test]
    async fn release_deletes_session() {
        let store = InMemorySessionStore::default();
        store.set(&session(), "github", "blob").await.unwrap();

        AttemptGuard::new(Arc::new(store.clone()), session())
            .release()
            .await;

        assert!(store.get(&session(), "github").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn drop_spawns_logout() {
        let store = InMemorySessionStore::default();
        store.set(&session(), "github", "blob").await.unwrap();

        drop(AttemptGuard::new(Arc::new(store.clone()), session()));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(store.get(&session(), "github").await.unwrap().is_none());
    }
}
