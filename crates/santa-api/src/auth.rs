//! Bearer token authentication.
//!
//! Production verifies Firebase ID tokens against Google's JWKS (RS256).
//! Development and tests may use an HS256 shared secret instead.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Google JWKS URL for Firebase Auth.
const GOOGLE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Firebase token issuer prefix.
const FIREBASE_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// JWKS cache TTL.
const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600); // 1 hour

/// Claims read from either token flavour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    pub email: Option<String>,
    pub exp: i64,
}

/// Authenticated user extracted from request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            uid: claims.sub,
            email: claims.email,
        }
    }
}

/// JWKS response from Google.
#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JwkKey>,
}

#[derive(Debug, Clone, Deserialize)]
struct JwkKey {
    kid: String,
    n: String,
    e: String,
}

/// Cached Firebase signing keys.
pub struct JwksCache {
    http: Client,
    keys: RwLock<HashMap<String, DecodingKey>>,
    last_refresh: RwLock<Option<Instant>>,
    project_id: String,
}

impl JwksCache {
    pub async fn new(project_id: impl Into<String>) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;

        let cache = Self {
            http,
            keys: RwLock::new(HashMap::new()),
            last_refresh: RwLock::new(None),
            project_id: project_id.into(),
        };
        cache.refresh_keys().await?;

        Ok(cache)
    }

    async fn refresh_keys(&self) -> anyhow::Result<()> {
        debug!("Refreshing JWKS keys");

        let jwks: JwksResponse = self
            .http
            .get(GOOGLE_JWKS_URL)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)?;
            keys.insert(jwk.kid, key);
        }

        let key_count = keys.len();
        *self.keys.write().await = keys;
        *self.last_refresh.write().await = Some(Instant::now());

        debug!("Refreshed {} JWKS keys", key_count);
        Ok(())
    }

    async fn get_key(&self, kid: &str) -> Option<DecodingKey> {
        let needs_refresh = self
            .last_refresh
            .read()
            .await
            .map_or(true, |last| last.elapsed() > JWKS_CACHE_TTL);

        if needs_refresh {
            if let Err(e) = self.refresh_keys().await {
                warn!("Failed to refresh JWKS keys: {}", e);
            }
        }

        self.keys.read().await.get(kid).cloned()
    }

    async fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let header = decode_header(token)
            .map_err(|e| ApiError::unauthorized(format!("Invalid token header: {}", e)))?;

        let kid = header
            .kid
            .ok_or_else(|| ApiError::unauthorized("Token missing key ID"))?;

        let key = self
            .get_key(&kid)
            .await
            .ok_or_else(|| ApiError::unauthorized("Unknown key ID"))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[format!("{}{}", FIREBASE_ISSUER_PREFIX, self.project_id)]);
        validation.set_audience(&[&self.project_id]);

        decode::<Claims>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| ApiError::unauthorized(format!("Token validation failed: {}", e)))
    }
}

/// How bearer tokens are checked.
pub enum TokenVerifier {
    Firebase(JwksCache),
    SharedSecret(DecodingKey),
}

impl TokenVerifier {
    pub fn shared_secret(secret: &str) -> Self {
        Self::SharedSecret(DecodingKey::from_secret(secret.as_bytes()))
    }

    pub async fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let claims = match self {
            Self::Firebase(jwks) => jwks.verify(token).await?,
            Self::SharedSecret(key) => decode::<Claims>(token, key, &Validation::new(Algorithm::HS256))
                .map(|data| data.claims)
                .map_err(|e| ApiError::unauthorized(format!("Token validation failed: {}", e)))?,
        };

        if claims.sub.trim().is_empty() {
            return Err(ApiError::unauthorized("Token has no subject"));
        }
        Ok(claims)
    }
}

/// Axum extractor for authenticated user.
#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Invalid Authorization header format"))?;

        let claims = state.auth.verify(token).await?;

        Ok(AuthUser::from(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, sub: &str, exp: i64) -> String {
        let claims = Claims {
            sub: sub.into(),
            email: None,
            exp,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn in_an_hour() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn test_shared_secret_accepts_valid_token() {
        let verifier = TokenVerifier::shared_secret("s3cret");
        let claims = verifier
            .verify(&token("s3cret", "user-1", in_an_hour()))
            .await
            .unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[tokio::test]
    async fn test_shared_secret_rejects_wrong_key_and_expiry() {
        let verifier = TokenVerifier::shared_secret("s3cret");
        assert!(verifier
            .verify(&token("other", "user-1", in_an_hour()))
            .await
            .is_err());
        assert!(verifier
            .verify(&token("s3cret", "user-1", chrono::Utc::now().timestamp() - 3600))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_empty_subject_rejected() {
        let verifier = TokenVerifier::shared_secret("s3cret");
        let err = verifier
            .verify(&token("s3cret", " ", in_an_hour()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }
}
