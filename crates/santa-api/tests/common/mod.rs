//! In-process app with scripted generators for router tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use santa_api::auth::Claims;
use santa_api::{create_router, ApiConfig, AppState, TokenVerifier};
use santa_firestore::{InMemoryOrderStore, OrderStore};
use santa_generators::{
    GeneratedImage, GeneratorResult, ImageGenerator, OperationStatus, SceneVideoGenerator,
    ScriptGenerator,
};
use santa_media::{MediaResult, Muxer};
use santa_models::{ChildProfile, OperationHandle, Order, OrderId, Scene, SceneList, Script};
use santa_pipeline::{
    FetchError, Generators, Orchestrator, PipelineConfig, RetryConfig, SegmentFetcher,
    SegmentStitcher,
};
use santa_storage::MemorySink;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const OWNER: &str = "user-1";

struct TwoScenes;

#[async_trait]
impl ScriptGenerator for TwoScenes {
    async fn generate(&self, _: &[ChildProfile]) -> GeneratorResult<Script> {
        let scenes = (1..=2)
            .map(|n| Scene {
                scene_number: n,
                title: format!("Scene {}", n),
                narration: "Ho ho ho".into(),
                image_prompt: format!("keyframe {}", n),
                motion_prompt: "pan".into(),
            })
            .collect();
        Ok(Script {
            title: "North Pole".into(),
            scenes: SceneList::new(scenes).unwrap(),
        })
    }
}

struct EchoImages;

#[async_trait]
impl ImageGenerator for EchoImages {
    async fn generate(&self, prompt: &str) -> GeneratorResult<GeneratedImage> {
        Ok(GeneratedImage {
            bytes: prompt.as_bytes().to_vec(),
            mime_type: "image/png".into(),
        })
    }
}

/// Jobs are `op-{scene}`; polls answer from a table, defaulting to running.
#[derive(Default)]
pub struct FakeVideos {
    answers: Mutex<HashMap<String, OperationStatus>>,
}

impl FakeVideos {
    pub fn complete(&self, scene: u32, url: &str) {
        self.answers.lock().unwrap().insert(
            format!("op-{}", scene),
            OperationStatus::Complete { video_url: url.into() },
        );
    }

    pub fn fail(&self, scene: u32, message: &str) {
        self.answers.lock().unwrap().insert(
            format!("op-{}", scene),
            OperationStatus::Failed { message: message.into() },
        );
    }
}

#[async_trait]
impl SceneVideoGenerator for FakeVideos {
    async fn start(&self, scene: &Scene, _: &GeneratedImage) -> GeneratorResult<OperationHandle> {
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

struct NameFetcher;

#[async_trait]
impl SegmentFetcher for NameFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let name = url.rsplit('/').next().unwrap_or_default();
        tokio::fs::write(dest, name.as_bytes()).await?;
        Ok(name.len() as u64)
    }
}

struct ByteMuxer;

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

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryOrderStore>,
    pub sink: Arc<MemorySink>,
    pub videos: Arc<FakeVideos>,
    pub work: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(ApiConfig::default())
    }

    pub fn with_config(config: ApiConfig) -> Self {
        let config = ApiConfig {
            payment_webhook_secret: Some(WEBHOOK_SECRET.into()),
            ..config
        };
        let work = tempfile::tempdir().unwrap();
        let pipeline = PipelineConfig {
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
            &pipeline,
        )
        .with_upload_retry(retry.clone());
        let generators = Generators {
            script: Arc::new(TwoScenes),
            images: Arc::new(EchoImages),
            videos: videos.clone(),
        };
        let orchestrator =
            Orchestrator::new(store.clone(), generators, sink.clone(), stitcher, pipeline)
                .with_retry(retry);

        let state = AppState::from_parts(
            config,
            orchestrator,
            store.clone(),
            sink.clone(),
            TokenVerifier::shared_secret(JWT_SECRET),
        );
        let router = create_router(state.clone(), None);

        Self {
            router,
            state,
            store,
            sink,
            videos,
            work,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// An order owned by [`OWNER`] awaiting payment.
    pub async fn pending_order(&self) -> OrderId {
        let order = Order::new(OWNER, vec![ChildProfile::new("Leo", 7)]).unwrap();
        self.store.create(&order).await.unwrap();
        order.id
    }

    /// An order driven up to scene kickoff.
    pub async fn generating_order(&self) -> OrderId {
        let id = self.pending_order().await;
        self.state
            .orchestrator
            .confirm_payment(&id, "pay_1")
            .await
            .unwrap();
        self.state.orchestrator.run(&id).await.unwrap();
        id
    }

    pub async fn order(&self, id: &OrderId) -> Order {
        self.state.orchestrator.get_order(id).await.unwrap()
    }
}

pub fn bearer(uid: &str) -> String {
    let claims = Claims {
        sub: uid.into(),
        email: None,
        exp: chrono::Utc::now().timestamp() + 3600,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {}", token)
}

pub fn post_json(uri: &str, uid: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .header("authorization", bearer(uid))
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_as(uri: &str, uid: &str) -> Request<Body> {
    Request::get(uri)
        .header("authorization", bearer(uid))
        .body(Body::empty())
        .unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
