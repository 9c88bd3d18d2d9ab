//! Firestore REST API client.
//!
//! - Token caching with refresh margin
//! - HTTP client tuning (pooling, timeouts)
//! - Exponential backoff with jitter for idempotent reads
//! - Observability (tracing spans, metrics)
//! - `FIRESTORE_EMULATOR_HOST` support

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info_span, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_request;
use crate::retry::{with_retry, RetryConfig};
use crate::token_cache::TokenCache;
use crate::types::{Document, RunQueryRequest, RunQueryResponseItem, StructuredQuery, Value};

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Emulator host:port; requests go there unauthenticated when set
    pub emulator_host: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
}

impl FirestoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .map_err(|_| {
                FirestoreError::auth_error(
                    "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to access Firestore",
                )
            })?;

        if project_id.is_empty() {
            return Err(FirestoreError::auth_error(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID cannot be empty",
            ));
        }

        let connect_timeout_secs: u64 = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST")
                .ok()
                .filter(|h| !h.is_empty()),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
        })
    }

    fn documents_url(&self) -> String {
        let host = match &self.emulator_host {
            Some(host) if host.starts_with("http") => host.trim_end_matches('/').to_string(),
            Some(host) => format!("http://{}", host),
            None => "https://firestore.googleapis.com".to_string(),
        };
        format!(
            "{}/v1/projects/{}/databases/{}/documents",
            host, self.project_id, self.database_id
        )
    }
}

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    token_cache: Arc<TokenCache>,
}

impl FirestoreClient {
    /// Create a new Firestore client.
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let token_cache = if config.emulator_host.is_some() {
            debug!("Using Firestore emulator at {:?}", config.emulator_host);
            TokenCache::fixed("owner")
        } else {
            TokenCache::new(Self::create_auth_provider()?)
        };

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("santa-firestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Network)?;

        Ok(Self {
            http,
            base_url: config.documents_url(),
            config,
            token_cache: Arc::new(token_cache),
        })
    }

    fn create_auth_provider() -> FirestoreResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env().map_err(|e| {
            FirestoreError::auth_error(format!("Failed to load service account: {}", e))
        })?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => Err(FirestoreError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )),
        }
    }

    /// Create from environment variables.
    pub async fn from_env() -> FirestoreResult<Self> {
        let config = FirestoreConfig::from_env()?;
        Self::new(config).await
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    fn document_path(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, doc_id)
    }

    /// Send an authorized request, refreshing the token once on expiry.
    async fn send_authorized<B>(&self, url: &str, build: B) -> FirestoreResult<Response>
    where
        B: Fn(&str) -> RequestBuilder,
    {
        let token = self.token_cache.get_token().await?;
        let response = build(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if !Self::is_access_token_expired(&body) {
            return Err(FirestoreError::from_http_status(
                401,
                format!("{} failed: {}", url, body),
            ));
        }

        self.token_cache.invalidate().await;
        let token = self.token_cache.get_token().await?;
        Ok(build(&token).send().await?)
    }

    /// Get a document.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> FirestoreResult<Option<Document>> {
        let url = self.document_path(collection, doc_id);

        with_retry(&self.config.retry, "get_document", || {
            self.execute_request("get_document", collection, Some(doc_id), async {
                let response = self
                    .send_authorized(&url, |token| self.http.get(&url).bearer_auth(token))
                    .await?;

                match response.status() {
                    StatusCode::OK => Ok(Some(response.json::<Document>().await?)),
                    StatusCode::NOT_FOUND => Ok(None),
                    status => Err(Self::handle_error_response(status, &url, response).await),
                }
            })
        })
        .await
    }

    /// Create a document. Fails with `AlreadyExists` when the id is taken.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        let url = format!(
            "{}/{}?documentId={}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        );
        let body = Document::new(fields);

        self.execute_request("create_document", collection, Some(doc_id), async {
            let response = self
                .send_authorized(&url, |token| {
                    self.http.post(&url).bearer_auth(token).json(&body)
                })
                .await?;

            match response.status() {
                StatusCode::OK | StatusCode::CREATED => Ok(response.json::<Document>().await?),
                StatusCode::CONFLICT => Err(FirestoreError::AlreadyExists(format!(
                    "{}/{}",
                    collection, doc_id
                ))),
                status => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Replace a document's fields, optionally only if it was last written at `update_time`.
    pub async fn update_document_with_precondition(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_time: Option<&str>,
    ) -> FirestoreResult<Document> {
        let mut url = self.document_path(collection, doc_id);
        if let Some(ts) = update_time {
            url = format!(
                "{}?currentDocument.updateTime={}",
                url,
                urlencoding::encode(ts)
            );
        }

        let body = Document::new(fields);

        self.execute_request("update_document_precondition", collection, Some(doc_id), async {
            let response = self
                .send_authorized(&url, |token| {
                    self.http.patch(&url).bearer_auth(token).json(&body)
                })
                .await?;

            match response.status() {
                StatusCode::OK => Ok(response.json::<Document>().await?),
                StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => {
                    let body_text = response.text().await.unwrap_or_default();
                    Err(FirestoreError::PreconditionFailed(body_text))
                }
                StatusCode::NOT_FOUND => Err(FirestoreError::not_found(format!(
                    "{}/{}",
                    collection, doc_id
                ))),
                status => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Run a structured query against the root collection group.
    pub async fn run_query(&self, query: StructuredQuery) -> FirestoreResult<Vec<Document>> {
        let url = format!("{}:runQuery", self.base_url);
        let request = RunQueryRequest {
            structured_query: query,
        };
        let collection = request
            .structured_query
            .from
            .first()
            .map(|c| c.collection_id.clone())
            .unwrap_or_default();

        with_retry(&self.config.retry, "run_query", || {
            self.execute_request("run_query", &collection, None, async {
                let response = self
                    .send_authorized(&url, |token| {
                        self.http.post(&url).bearer_auth(token).json(&request)
                    })
                    .await?;

                match response.status() {
                    StatusCode::OK => {
                        let items: Vec<RunQueryResponseItem> = response.json().await?;
                        Ok(items.into_iter().filter_map(|i| i.document).collect())
                    }
                    status => Err(Self::handle_error_response(status, &url, response).await),
                }
            })
        })
        .await
    }

    /// Cheap authenticated request used by readiness checks.
    pub async fn check_connectivity(&self, collection: &str) -> FirestoreResult<()> {
        let url = format!("{}/{}?pageSize=1", self.base_url, collection);
        let response = self
            .send_authorized(&url, |token| self.http.get(&url).bearer_auth(token))
            .await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            status => Err(Self::handle_error_response(status, &url, response).await),
        }
    }

    async fn execute_request<T, F>(
        &self,
        operation: &str,
        collection: &str,
        doc_id: Option<&str>,
        fut: F,
    ) -> FirestoreResult<T>
    where
        F: std::future::Future<Output = FirestoreResult<T>>,
    {
        let span = match doc_id {
            Some(id) => info_span!("firestore_request", operation = %operation, collection = %collection, doc_id = %id),
            None => info_span!("firestore_request", operation = %operation, collection = %collection),
        };

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }

    async fn handle_error_response(
        status: StatusCode,
        url: &str,
        response: reqwest::Response,
    ) -> FirestoreError {
        let body = response.text().await.unwrap_or_default();
        FirestoreError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_from_env_validates_project_id() {
        std::env::remove_var("GCP_PROJECT_ID");
        std::env::remove_var("FIREBASE_PROJECT_ID");
        assert!(FirestoreConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_config_emulator_url() {
        std::env::set_var("GCP_PROJECT_ID", "north-pole");
        std::env::set_var("FIRESTORE_EMULATOR_HOST", "localhost:8080");
        std::env::remove_var("FIRESTORE_DATABASE_ID");
        let config = FirestoreConfig::from_env().unwrap();
        std::env::remove_var("FIRESTORE_EMULATOR_HOST");
        std::env::remove_var("GCP_PROJECT_ID");

        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(
            config.documents_url(),
            "http://localhost:8080/v1/projects/north-pole/databases/(default)/documents"
        );
    }
}
