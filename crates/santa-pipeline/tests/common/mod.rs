//! Scripted collaborators for pipeline scenarios.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use santa_firestore::{InMemoryOrderStore, OrderStore};
use santa_generators::{
    GeneratedImage, GeneratorError, GeneratorResult, ImageGenerator, OperationStatus,
    SceneVideoGenerator, ScriptGenerator,
};
use santa_media::{MediaResult, Muxer};
use santa_models::{ChildProfile, OperationHandle, Order, OrderId, Scene, SceneList, Script};
use santa_pipeline::{
    FetchError, Generators, Orchestrator, PipelineConfig, RetryConfig, SegmentFetcher,
    SegmentStitcher,
};
use santa_storage::MemorySink;

pub struct FakeScript {
    pub scenes: u32,
}

#[async_trait]
impl ScriptGenerator for FakeScript {
    async fn generate(&self, children: &[ChildProfile]) -> GeneratorResult<Script> {
        let scenes = (1..=self.scenes)
            .map(|n| Scene {
                scene_number: n,
                title: format!("Scene {}", n),
                narration: format!("Hello {}", children[0].name),
                image_prompt: format!("keyframe {}", n),
                motion_prompt: "slow zoom".into(),
            })
            .collect();
        Ok(Script {
            title: "A letter from Santa".into(),
            scenes: SceneList::new(scenes).map_err(|e| GeneratorError::rejected(e.to_string()))?,
        })
    }
}

#[derive(Default)]
pub struct FakeImages {
    pub fail_prompt: Option<String>,
}

#[async_trait]
impl ImageGenerator for FakeImages {
    async fn generate(&self, prompt: &str) -> GeneratorResult<GeneratedImage> {
        if self.fail_prompt.as_deref() == Some(prompt) {
            return Err(GeneratorError::rejected("image filtered"));
        }
        Ok(GeneratedImage {
            bytes: prompt.as_bytes().to_vec(),
            mime_type: "image/png".into(),
        })
    }
}

/// Starts `op-{scene}` jobs; polls answer from a table, defaulting to running.
#[derive(Default)]
pub struct FakeVideos {
    answers: Mutex<HashMap<String, OperationStatus>>,
    starts: AtomicU32,
}

impl FakeVideos {
    pub fn complete(&self, scene: u32, url: &str) {
        self.set(scene, OperationStatus::Complete { video_url: url.into() });
    }

    pub fn fail(&self, scene: u32, message: &str) {
        self.set(scene, OperationStatus::Failed { message: message.into() });
    }

    fn set(&self, scene: u32, status: OperationStatus) {
        self.answers
            .lock()
            .unwrap()
            .insert(format!("op-{}", scene), status);
    }

    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SceneVideoGenerator for FakeVideos {
    async fn start(&self, scene: &Scene, _: &GeneratedImage) -> GeneratorResult<OperationHandle> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(OperationHandle::new(format!("op-{}", scene.scene_number)))
    }

    async fn poll(&self, handle: &OperationHandle) -> GeneratorResult<OperationStatus> {
        Ok(self
            .answers
            .lock()
            .unwrap()
            .get(handle.as_str())
            .cloned()
            .unwrap_or(OperationStatus::Running))
    }
}

/// Writes the last path segment of the URL as the file body.
pub struct NameFetcher;

#[async_trait]
impl SegmentFetcher for NameFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let name = url.rsplit('/').next().unwrap_or_default();
        tokio::fs::write(dest, name.as_bytes()).await?;
        Ok(name.len() as u64)
    }
}

/// Concatenates raw bytes so the output spells the segment sequence.
pub struct ByteMuxer;

#[async_trait]
impl Muxer for ByteMuxer {
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<()> {
        let mut joined = Vec::new();
        for input in inputs {
            joined.extend(tokio::fs::read(input).await?);
        }
        tokio::fs::write(output, joined).await?;
        Ok(())
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub store: Arc<InMemoryOrderStore>,
    pub sink: Arc<MemorySink>,
    pub videos: Arc<FakeVideos>,
    pub work: TempDir,
}

impl Harness {
    pub fn new(scenes: u32) -> Self {
        Self::with_images(scenes, FakeImages::default())
    }

    pub fn with_images(scenes: u32, images: FakeImages) -> Self {
        let work = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            work_dir: work.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let retry = RetryConfig::new("test")
            .with_max_retries(1)
            .with_base_delay(Duration::from_millis(1));

        let store = Arc::new(InMemoryOrderStore::new());
        let sink = Arc::new(MemorySink::default());
        let videos = Arc::new(FakeVideos::default());
        let stitcher = SegmentStitcher::new(
            Arc::new(NameFetcher),
            Arc::new(ByteMuxer),
            sink.clone(),
            &config,
        )
        .with_upload_retry(retry.clone());
        let generators = Generators {
            script: Arc::new(FakeScript { scenes }),
            images: Arc::new(images),
            videos: videos.clone(),
        };
        let orchestrator =
            Orchestrator::new(store.clone(), generators, sink.clone(), stitcher, config)
                .with_retry(retry);

        Self {
            orchestrator,
            store,
            sink,
            videos,
            work,
        }
    }

    /// A stored order that has just been paid.
    pub async fn paid_order(&self) -> OrderId {
        let order = Order::new("user-1", vec![ChildProfile::new("Mia", 6)]).unwrap();
        self.store.create(&order).await.unwrap();
        self.orchestrator
            .confirm_payment(&order.id, "pay_123")
            .await
            .unwrap();
        order.id
    }

    pub async fn order(&self, id: &OrderId) -> Order {
        self.orchestrator.get_order(id).await.unwrap()
    }

    pub fn work_dir_is_empty(&self) -> bool {
        std::fs::read_dir(self.work.path()).unwrap().next().is_none()
    }
}
