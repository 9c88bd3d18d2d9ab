//! Application state.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use santa_firestore::{FirestoreClient, FirestoreOrderStore, OrderStore};
use santa_generators::{GeminiScriptGenerator, GeneratorConfig, ImagenGenerator, VeoGenerator};
use santa_media::{check_ffmpeg, FfmpegMuxer};
use santa_pipeline::{Generators, HttpFetcher, Orchestrator, PipelineConfig, SegmentStitcher};
use santa_storage::{ArtifactSink, R2Client};

use crate::auth::{JwksCache, TokenVerifier};
use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<dyn OrderStore>,
    pub sink: Arc<dyn ArtifactSink>,
    pub auth: Arc<TokenVerifier>,
}

impl AppState {
    /// Build production state from the environment.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        if config.payment_webhook_secret.is_none() {
            anyhow::bail!("PAYMENT_WEBHOOK_SECRET is required");
        }

        let auth = match (&config.firebase_project_id, &config.auth_jwt_secret) {
            (Some(project), _) => TokenVerifier::Firebase(
                JwksCache::new(project.clone())
                    .await
                    .context("Failed to load Firebase signing keys")?,
            ),
            (None, Some(secret)) if !config.is_production() => {
                warn!("Using shared-secret bearer tokens; not for production");
                TokenVerifier::shared_secret(secret)
            }
            _ => anyhow::bail!("FIREBASE_PROJECT_ID (or AUTH_JWT_SECRET outside production) is required"),
        };

        let sink: Arc<dyn ArtifactSink> = Arc::new(
            R2Client::from_env()
                .await
                .context("Failed to create R2 client")?,
        );
        let store: Arc<dyn OrderStore> = Arc::new(FirestoreOrderStore::new(
            FirestoreClient::from_env()
                .await
                .context("Failed to create Firestore client")?,
        ));

        let generator_config = GeneratorConfig::from_env().context("Invalid generator config")?;
        let generators = Generators {
            script: Arc::new(GeminiScriptGenerator::new(&generator_config)?),
            images: Arc::new(ImagenGenerator::new(&generator_config)?),
            videos: Arc::new(VeoGenerator::new(&generator_config)?),
        };

        let pipeline_config = PipelineConfig::from_env();
        match check_ffmpeg() {
            Ok(path) => info!("Using ffmpeg at {}", path.display()),
            Err(e) => warn!("ffmpeg unavailable, stitching will fail: {}", e),
        }

        // Scene video URIs are served by the generator API and need its key.
        let fetcher = HttpFetcher::new(pipeline_config.fetch_timeout)?
            .with_api_key_for(&generator_config.base_url, generator_config.api_key.clone())
            .context("Invalid GEMINI_BASE_URL")?;
        let stitcher = SegmentStitcher::new(
            Arc::new(fetcher),
            Arc::new(FfmpegMuxer::new(pipeline_config.mux_timeout.as_secs())),
            Arc::clone(&sink),
            &pipeline_config,
        );

        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            generators,
            Arc::clone(&sink),
            stitcher,
            pipeline_config,
        );

        Ok(Self::from_parts(config, orchestrator, store, sink, auth))
    }

    /// Assemble state from already-built collaborators.
    pub fn from_parts(
        config: ApiConfig,
        orchestrator: Orchestrator,
        store: Arc<dyn OrderStore>,
        sink: Arc<dyn ArtifactSink>,
        auth: TokenVerifier,
    ) -> Self {
        Self {
            config,
            orchestrator: Arc::new(orchestrator),
            store,
            sink,
            auth: Arc::new(auth),
        }
    }
}
