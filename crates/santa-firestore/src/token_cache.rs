//! Access-token caching for Firestore requests.
//!
//! - Refresh margin so a token never expires mid-request
//! - Single-flight refresh behind a write lock
//! - Falls back to the existing token while it is still usable
//! - A fixed token for the Firestore emulator

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

/// Refresh 60 seconds before expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// TTL assumed when the provider reports an unusable expiry.
const TOKEN_DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

/// OAuth scope for Firestore/Datastore access.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }

    fn is_usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

enum Source {
    Provider(Arc<dyn TokenProvider>),
    Fixed(String),
}

/// Thread-safe token cache with single-flight refresh.
pub struct TokenCache {
    source: Source,
    cache: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(auth: Arc<dyn TokenProvider>) -> Self {
        Self {
            source: Source::Provider(auth),
            cache: RwLock::new(None),
        }
    }

    /// A cache that always hands out `token` (emulator, tests).
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            source: Source::Fixed(token.into()),
            cache: RwLock::new(None),
        }
    }

    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_token(&self) -> FirestoreResult<String> {
        let auth = match &self.source {
            Source::Fixed(token) => return Ok(token.clone()),
            Source::Provider(auth) => auth,
        };

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| c.is_valid()) {
                return Ok(cached.access_token.clone());
            }
        }

        let mut cache = self.cache.write().await;

        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = cache.as_ref().filter(|c| c.is_valid()) {
            return Ok(cached.access_token.clone());
        }

        match auth.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                let access_token = token.as_str().to_string();
                let now = Utc::now();
                let exp = token.expires_at();
                let expires_at = if exp > now {
                    (exp - now)
                        .to_std()
                        .map(|ttl| Instant::now() + ttl)
                        .unwrap_or_else(|_| Instant::now() + TOKEN_DEFAULT_TTL)
                } else {
                    Instant::now()
                };

                *cache = Some(CachedToken {
                    access_token: access_token.clone(),
                    expires_at,
                });
                debug!("Refreshed Firestore auth token");
                Ok(access_token)
            }
            Err(e) => {
                if let Some(cached) = cache.as_ref().filter(|c| c.is_usable()) {
                    warn!("Token refresh failed, using existing token: {}", e);
                    return Ok(cached.access_token.clone());
                }
                Err(FirestoreError::auth_error(format!(
                    "Failed to obtain auth token: {}",
                    e
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_token() {
        let cache = TokenCache::fixed("owner");
        assert_eq!(cache.get_token().await.unwrap(), "owner");
        cache.invalidate().await;
        assert_eq!(cache.get_token().await.unwrap(), "owner");
    }

    #[test]
    fn test_firestore_scope() {
        assert!(FIRESTORE_SCOPE.contains("datastore"));
    }
}
