//! Imagen keyframe generator.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::GeneratorConfig;
use crate::error::{GeneratorError, GeneratorResult};
use crate::http::ApiClient;
use crate::traits::{GeneratedImage, ImageGenerator};

#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: Vec<serde_json::Value>,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    rai_filtered_reason: Option<String>,
}

/// [`ImageGenerator`] backed by Imagen `:predict`. Frames are 16:9 to match
/// the scene videos.
#[derive(Clone)]
pub struct ImagenGenerator {
    api: ApiClient,
    model: String,
}

impl ImagenGenerator {
    pub fn new(config: &GeneratorConfig) -> GeneratorResult<Self> {
        Ok(Self {
            api: ApiClient::new(config)?,
            model: config.image_model.clone(),
        })
    }
}

#[async_trait]
impl ImageGenerator for ImagenGenerator {
    async fn generate(&self, prompt: &str) -> GeneratorResult<GeneratedImage> {
        let request = PredictRequest {
            instances: vec![json!({ "prompt": prompt })],
            parameters: json!({ "sampleCount": 1, "aspectRatio": "16:9" }),
        };

        let response: PredictResponse = self
            .api
            .post("image", &format!("models/{}:predict", self.model), &request)
            .await?;

        let prediction = response
            .predictions
            .into_iter()
            .next()
            .ok_or_else(|| GeneratorError::rejected("image generator returned no images"))?;

        if let Some(reason) = prediction.rai_filtered_reason {
            return Err(GeneratorError::rejected(format!("image filtered: {}", reason)));
        }

        let encoded = prediction
            .bytes_base64_encoded
            .ok_or_else(|| GeneratorError::invalid_response("prediction has no image bytes"))?;
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| GeneratorError::invalid_response(format!("image base64: {}", e)))?;

        debug!(size = bytes.len(), "Keyframe image generated");
        Ok(GeneratedImage {
            bytes,
            mime_type: prediction.mime_type.unwrap_or_else(|| "image/png".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn generator(server: &MockServer) -> ImagenGenerator {
        let mut config = GeneratorConfig::for_base_url(server.uri());
        config.image_model = "imagen-test".into();
        ImagenGenerator::new(&config).unwrap()
    }

    #[tokio::test]
    async fn decodes_first_prediction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/imagen-test:predict"))
            .and(body_partial_json(json!({"instances": [{"prompt": "snowy workshop"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "predictions": [{"bytesBase64Encoded": STANDARD.encode(b"jpegdata"),
                                 "mimeType": "image/jpeg"}]
            })))
            .mount(&server)
            .await;

        let image = generator(&server).await.generate("snowy workshop").await.unwrap();
        assert_eq!(image.bytes, b"jpegdata");
        assert_eq!(image.mime_type, "image/jpeg");
    }

    #[tokio::test]
    async fn empty_predictions_are_a_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let err = generator(&server).await.generate("x").await.unwrap_err();
        assert!(matches!(err, GeneratorError::Rejected(_)));
    }

    #[tokio::test]
    async fn api_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad prompt"))
            .mount(&server)
            .await;

        let err = generator(&server).await.generate("x").await.unwrap_err();
        assert!(matches!(err, GeneratorError::Api { status: 400, .. }));
    }
}
