use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::refresh::RefreshCoordinator;
use crate::error::ApiError;

/// Process-wide authentication session
///
/// Owns the in-memory bearer credential and the refresh slot. Created once at
/// application start with [`Session::init`] and shared with the API client;
/// [`Session::dispose`] tears it down at shutdown.
pub struct Session {
    /// Current access token, never persisted
    credential: RwLock<Option<String>>,

    /// Single-flight refresh state
    refresh: RefreshCoordinator,

    closed: AtomicBool,
}

impl Session {
    /// Create a new session with no credential
    pub fn init() -> Arc<Self> {
        tracing::debug!("Session initialized");
        Arc::new(Self {
            credential: RwLock::new(None),
            refresh: RefreshCoordinator::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Clear the credential, abort any in-flight refresh and close the session
    pub fn dispose(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.refresh.cancel();
        self.set_credential(None);
        tracing::debug!("Session disposed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Current bearer credential
    pub fn credential(&self) -> Option<String> {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the credential (login succeeded, refresh succeeded, logout)
    ///
    /// Empty tokens are stored as no credential.
    pub fn set_credential(&self, token: Option<String>) {
        let token = token.filter(|t| !t.is_empty());
        match &token {
            Some(t) => tracing::debug!(token = %token_preview(t), "Credential set"),
            None => tracing::debug!("Credential cleared"),
        }
        *self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Store a refreshed token unless the session was disposed meanwhile
    ///
    /// The closed flag is read under the credential lock, so a concurrent
    /// `dispose` either clears this token or prevents it from being stored.
    fn store_refreshed(&self, token: String) -> bool {
        let mut credential = self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            return false;
        }
        tracing::debug!(token = %token_preview(&token), "Credential set");
        *credential = Some(token);
        true
    }

    pub fn has_credential(&self) -> bool {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    /// Obtain a new credential through the single in-flight refresh
    ///
    /// If a refresh is already running, waits for it and `fetch` is never
    /// called. Otherwise `fetch` performs the refresh network call in a
    /// spawned task. On success the new credential is stored and returned;
    /// on any failure the credential is cleared and `None` is returned.
    pub async fn refresh<F, Fut>(self: &Arc<Self>, fetch: F) -> Option<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ApiError>> + Send + 'static,
    {
        if self.is_closed() {
            return None;
        }

        let outcome = self.refresh.join_or_start(|generation| {
            let session = Arc::clone(self);
            let call = fetch();
            tokio::spawn(async move {
                let token = match call.await {
                    Ok(token) if !token.is_empty() => {
                        if session.store_refreshed(token.clone()) {
                            tracing::info!(generation, "Access token refreshed");
                            Some(token)
                        } else {
                            tracing::debug!(generation, "Session closed, dropping refreshed token");
                            None
                        }
                    }
                    Ok(_) => {
                        tracing::warn!(generation, "Refresh returned an empty access token");
                        session.set_credential(None);
                        None
                    }
                    Err(e) => {
                        match &e {
                            ApiError::Network(_) => {
                                tracing::warn!(generation, error = %e, "Token refresh failed: network error")
                            }
                            _ => tracing::warn!(generation, error = %e, "Token refresh rejected"),
                        }
                        session.set_credential(None);
                        None
                    }
                };
                session.refresh.finish(generation);
                token
            })
        });

        outcome.await
    }
}

/// Short, log-safe prefix of a bearer token
pub fn token_preview(token: &str) -> String {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    format!("{}...", &token[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorEnvelope;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn rejected() -> ApiError {
        ApiError::from_response(reqwest::StatusCode::UNAUTHORIZED, br#"{"message":"Refresh token expired"}"#)
    }

    #[test]
    fn test_credential_accessors() {
        let session = Session::init();
        assert_eq!(session.credential(), None);

        session.set_credential(Some("abc".to_string()));
        assert_eq!(session.credential().as_deref(), Some("abc"));
        assert!(session.has_credential());

        session.set_credential(Some(String::new()));
        assert!(!session.has_credential());
    }

    #[tokio::test]
    async fn test_concurrent_refresh_issues_one_call() {
        let session = Session::init();
        let calls = Arc::new(AtomicUsize::new(0));

        let waiters = (0..8).map(|_| {
            let session = session.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                session
                    .refresh(move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok("token-2".to_string())
                    })
                    .await
            })
        });

        for result in futures::future::join_all(waiters).await {
            assert_eq!(result.unwrap().as_deref(), Some("token-2"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.credential().as_deref(), Some("token-2"));
        assert!(!session.refresh_coordinator().is_refreshing());
    }

    #[tokio::test]
    async fn test_failed_refresh_clears_credential() {
        let session = Session::init();
        session.set_credential(Some("stale".to_string()));

        let token = session.refresh(|| async { Err(rejected()) }).await;

        assert_eq!(token, None);
        assert_eq!(session.credential(), None);
        assert!(!session.refresh_coordinator().is_refreshing());
    }

    #[tokio::test]
    async fn test_network_failure_during_refresh_is_not_raised() {
        let session = Session::init();
        session.set_credential(Some("stale".to_string()));

        let token = session
            .refresh(|| async {
                Err(ApiError::Network(ErrorEnvelope {
                    message: "Network error: connection refused".to_string(),
                    status_code: None,
                    error_code: Some("connection_failed".to_string()),
                    raw: None,
                }))
            })
            .await;

        assert_eq!(token, None);
        assert!(!session.has_credential());
    }

    #[tokio::test]
    async fn test_refresh_after_failure_starts_new_attempt() {
        let session = Session::init();

        assert_eq!(session.refresh(|| async { Err(rejected()) }).await, None);
        let token = session.refresh(|| async { Ok("token-3".to_string()) }).await;

        assert_eq!(token.as_deref(), Some("token-3"));
        assert_eq!(session.refresh_coordinator().started(), 2);
    }

    #[tokio::test]
    async fn test_dispose_aborts_refresh_and_closes() {
        let session = Session::init();
        session.set_credential(Some("live".to_string()));

        let waiter = {
            let session = session.clone();
            tokio::spawn(async move {
                session
                    .refresh(|| async {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok("late".to_string())
                    })
                    .await
            })
        };

        while !session.refresh_coordinator().is_refreshing() {
            tokio::task::yield_now().await;
        }
        session.dispose();

        assert_eq!(waiter.await.unwrap(), None);
        assert!(session.is_closed());
        assert_eq!(session.credential(), None);
        assert_eq!(session.refresh(|| async { Ok("x".to_string()) }).await, None);
    }

    #[tokio::test]
    async fn test_refresh_finishing_after_dispose_stores_nothing() {
        let session = Session::init();
        session.set_credential(Some("live".to_string()));

        // The fetch resolves in the same poll that disposes the session
        let closing = session.clone();
        let token = session
            .refresh(move || async move {
                closing.dispose();
                Ok("late".to_string())
            })
            .await;

        assert_eq!(token, None);
        assert!(session.is_closed());
        assert_eq!(session.credential(), None);
    }

    #[test]
    fn test_token_preview() {
        assert_eq!(token_preview("abcdefghijklmnop"), "abcdefgh...");
        assert_eq!(token_preview("abc"), "abc...");
    }
}
