//! Generator seams used by the pipeline.

use async_trait::async_trait;
use santa_models::{ChildProfile, OperationHandle, Scene, Script};

use crate::error::GeneratorResult;

/// Encoded image returned by an [`ImageGenerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Remote state of a scene video job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Running,
    Complete { video_url: String },
    Failed { message: String },
}

/// Writes the narrated script for an order.
#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    async fn generate(&self, children: &[ChildProfile]) -> GeneratorResult<Script>;
}

/// Renders one keyframe image from a scene prompt.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> GeneratorResult<GeneratedImage>;
}

/// Starts and observes long-running scene video jobs.
#[async_trait]
pub trait SceneVideoGenerator: Send + Sync {
    /// Kick off a job animating `reference` according to `scene`.
    async fn start(&self, scene: &Scene, reference: &GeneratedImage)
        -> GeneratorResult<OperationHandle>;

    /// One status query. Transport faults come back as `Err`; an explicit
    /// remote failure is `Ok(OperationStatus::Failed)`.
    async fn poll(&self, handle: &OperationHandle) -> GeneratorResult<OperationStatus>;
}
