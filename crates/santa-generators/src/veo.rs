//! Veo scene video generator.
//!
//! `predictLongRunning` returns an operation name that is stored as the
//! scene's handle. Polling fetches the operation and maps it to
//! [`OperationStatus`].

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use santa_models::{OperationHandle, Scene};

use crate::config::GeneratorConfig;
use crate::error::{GeneratorError, GeneratorResult};
use crate::http::ApiClient;
use crate::traits::{GeneratedImage, OperationStatus, SceneVideoGenerator};

#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<OperationError>,
    #[serde(default)]
    response: Option<OperationResponse>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    #[serde(default)]
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
    #[serde(default)]
    rai_media_filtered_reasons: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: Option<VideoRef>,
}

#[derive(Debug, Deserialize)]
struct VideoRef {
    uri: Option<String>,
}

/// [`SceneVideoGenerator`] backed by Veo long-running predictions.
#[derive(Clone)]
pub struct VeoGenerator {
    api: ApiClient,
    model: String,
    duration_secs: u32,
}

impl VeoGenerator {
    pub fn new(config: &GeneratorConfig) -> GeneratorResult<Self> {
        Ok(Self {
            api: ApiClient::new(config)?,
            model: config.video_model.clone(),
            duration_secs: config.scene_video_duration_secs,
        })
    }
}

fn scene_prompt(scene: &Scene) -> String {
    format!(
        "{}. Santa says: \"{}\"",
        scene.motion_prompt.trim_end_matches('.'),
        scene.narration
    )
}

impl Operation {
    fn into_status(self) -> OperationStatus {
        if !self.done {
            return OperationStatus::Running;
        }
        if let Some(err) = self.error {
            return OperationStatus::Failed {
                message: format!("{} (code {})", err.message, err.code),
            };
        }

        let Some(response) = self.response.and_then(|r| r.generate_video_response) else {
            return OperationStatus::Failed {
                message: "operation finished without a video".to_string(),
            };
        };
        if !response.rai_media_filtered_reasons.is_empty() {
            return OperationStatus::Failed {
                message: format!("filtered: {}", response.rai_media_filtered_reasons.join("; ")),
            };
        }

        match response
            .generated_samples
            .into_iter()
            .find_map(|s| s.video.and_then(|v| v.uri))
        {
            Some(video_url) => OperationStatus::Complete { video_url },
            None => OperationStatus::Failed {
                message: "operation finished without a video".to_string(),
            },
        }
    }
}

#[async_trait]
impl SceneVideoGenerator for VeoGenerator {
    async fn start(
        &self,
        scene: &Scene,
        reference: &GeneratedImage,
    ) -> GeneratorResult<OperationHandle> {
        let request = json!({
            "instances": [{
                "prompt": scene_prompt(scene),
                "image": {
                    "bytesBase64Encoded": STANDARD.encode(&reference.bytes),
                    "mimeType": reference.mime_type,
                }
            }],
            "parameters": {
                "aspectRatio": "16:9",
                "durationSeconds": self.duration_secs,
                "sampleCount": 1,
            }
        });

        let operation: Operation = self
            .api
            .post(
                "scene_video_start",
                &format!("models/{}:predictLongRunning", self.model),
                &request,
            )
            .await?;

        if operation.name.trim().is_empty() {
            return Err(GeneratorError::invalid_response("operation has no name"));
        }
        info!(scene = scene.scene_number, operation = %operation.name, "Scene video started");
        Ok(OperationHandle::new(operation.name))
    }

    async fn poll(&self, handle: &OperationHandle) -> GeneratorResult<OperationStatus> {
        let operation: Operation = self.api.get("scene_video_poll", handle.as_str()).await?;
        let status = operation.into_status();
        debug!(operation = %handle, status = ?status, "Polled scene video");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OP: &str = "models/veo-test/operations/op-1";

    fn scene() -> Scene {
        Scene {
            scene_number: 1,
            title: "Hello".into(),
            narration: "Hello Mia!".into(),
            image_prompt: "workshop".into(),
            motion_prompt: "Slow zoom on Santa.".into(),
        }
    }

    fn image() -> GeneratedImage {
        GeneratedImage {
            bytes: b"png".to_vec(),
            mime_type: "image/png".into(),
        }
    }

    async fn generator(server: &MockServer) -> VeoGenerator {
        let mut config = GeneratorConfig::for_base_url(server.uri());
        config.video_model = "veo-test".into();
        VeoGenerator::new(&config).unwrap()
    }

    #[tokio::test]
    async fn start_returns_operation_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/veo-test:predictLongRunning"))
            .and(body_partial_json(json!({
                "instances": [{"image": {"mimeType": "image/png"}}],
                "parameters": {"durationSeconds": 8}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": OP})))
            .mount(&server)
            .await;

        let handle = generator(&server).await.start(&scene(), &image()).await.unwrap();
        assert_eq!(handle.as_str(), OP);
    }

    #[tokio::test]
    async fn poll_maps_running_complete_and_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/v1beta/{}", OP)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": OP})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/v1beta/{}", OP)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": OP,
                "done": true,
                "response": {"generateVideoResponse": {"generatedSamples": [
                    {"video": {"uri": "https://files.test/scene-1.mp4"}}
                ]}}
            })))
            .mount(&server)
            .await;

        let veo = generator(&server).await;
        let handle = OperationHandle::new(OP);
        assert_eq!(veo.poll(&handle).await.unwrap(), OperationStatus::Running);
        assert_eq!(
            veo.poll(&handle).await.unwrap(),
            OperationStatus::Complete {
                video_url: "https://files.test/scene-1.mp4".into()
            }
        );
    }

    #[test]
    fn finished_operation_with_error_is_failed() {
        let op: Operation = serde_json::from_value(json!({
            "name": OP,
            "done": true,
            "error": {"code": 3, "message": "unsafe prompt"}
        }))
        .unwrap();
        assert_eq!(
            op.into_status(),
            OperationStatus::Failed {
                message: "unsafe prompt (code 3)".into()
            }
        );
    }

    #[test]
    fn filtered_media_is_failed() {
        let op: Operation = serde_json::from_value(json!({
            "name": OP,
            "done": true,
            "response": {"generateVideoResponse": {"raiMediaFilteredReasons": ["child safety"]}}
        }))
        .unwrap();
        assert!(matches!(op.into_status(), OperationStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn poll_transport_error_is_err_not_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = generator(&server).await.poll(&OperationHandle::new(OP)).await;
        assert!(matches!(result, Err(GeneratorError::Api { status: 500, .. })));
    }
}
