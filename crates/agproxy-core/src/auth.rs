use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::DEFAULT_AUTH_TTL;
use crate::credential::CredentialStore;
use crate::discovery::ProjectDiscovery;
use crate::error::AuthError;

/// The credential pair every backend call needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub token: String,
    pub project: String,
}

#[derive(Debug)]
struct CachedAuth {
    snapshot: AuthSnapshot,
    fetched_at: Instant,
}

/// Process-wide cache of the backend token and project.
///
/// The lock is held across the refresh, so concurrent callers that find the
/// entry stale wait for one refresh instead of each starting their own.
pub struct AuthCache {
    store: Arc<dyn CredentialStore>,
    discovery: Arc<dyn ProjectDiscovery>,
    ttl: Duration,
    cached: Mutex<Option<CachedAuth>>,
}

impl AuthCache {
    pub fn new(store: Arc<dyn CredentialStore>, discovery: Arc<dyn ProjectDiscovery>) -> Self {
        Self {
            store,
            discovery,
            ttl: DEFAULT_AUTH_TTL,
            cached: Mutex::new(None),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub async fn ensure(&self) -> Result<AuthSnapshot, AuthError> {
        let mut guard = self.cached.lock().await;
        if let Some(cached) = guard.as_ref()
            && cached.fetched_at.elapsed() < self.ttl
        {
            return Ok(cached.snapshot.clone());
        }

        let snapshot = self.refresh().await?;
        *guard = Some(CachedAuth {
            snapshot: snapshot.clone(),
            fetched_at: Instant::now(),
        });
        Ok(snapshot)
    }

    async fn refresh(&self) -> Result<AuthSnapshot, AuthError> {
        let credential = self.store.load().await?.ok_or(AuthError::Unavailable)?;
        let Some(token) = credential.api_key.filter(|key| !key.trim().is_empty()) else {
            return Err(AuthError::Unavailable);
        };
        let project = self.discovery.discover(&token).await;
        tracing::info!(
            event = "auth_refreshed",
            email = %credential.email.as_deref().unwrap_or("unknown"),
            project = %project
        );
        Ok(AuthSnapshot { token, project })
    }
}
