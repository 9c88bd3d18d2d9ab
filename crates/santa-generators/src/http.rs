//! Shared HTTP plumbing for the Google generative API.

use std::time::Instant;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::GeneratorConfig;
use crate::error::{GeneratorError, GeneratorResult};

#[derive(Clone)]
pub(crate) struct ApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ApiClient {
    pub(crate) fn new(config: &GeneratorConfig) -> GeneratorResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GeneratorError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1beta/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) async fn post<B, R>(&self, kind: &'static str, path: &str, body: &B) -> GeneratorResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let start = Instant::now();
        debug!(kind, path, "POST generator API");
        let result = self
            .client
            .post(self.url(path))
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await;
        finish(kind, start, result).await
    }

    pub(crate) async fn get<R>(&self, kind: &'static str, path: &str) -> GeneratorResult<R>
    where
        R: DeserializeOwned,
    {
        let start = Instant::now();
        let result = self
            .client
            .get(self.url(path))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await;
        finish(kind, start, result).await
    }
}

async fn finish<R: DeserializeOwned>(
    kind: &'static str,
    start: Instant,
    result: Result<Response, reqwest::Error>,
) -> GeneratorResult<R> {
    let response = match result {
        Ok(r) => r,
        Err(e) => {
            record(kind, "error", start);
            return Err(e.into());
        }
    };

    let status = response.status();
    if !status.is_success() {
        record(kind, "error", start);
        let message = response.text().await.unwrap_or_default();
        return Err(GeneratorError::Api {
            status: status.as_u16(),
            message,
        });
    }

    record(kind, "success", start);
    response
        .json::<R>()
        .await
        .map_err(|e| GeneratorError::invalid_response(format!("{} response: {}", kind, e)))
}

fn record(kind: &'static str, outcome: &'static str, start: Instant) {
    metrics::counter!("santa_generator_requests_total", "kind" => kind, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("santa_generator_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}
