//! Segment stitcher: fetch every segment, concatenate, upload.
//!
//! All local files live in a fresh temporary directory under the configured
//! work dir. The directory is removed when the stitch returns, whatever the
//! outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use santa_media::Muxer;
use santa_models::{order_segments, OrderId, Segment};
use santa_storage::{final_video_key, ArtifactSink, StorageError};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::fetch::SegmentFetcher;
use crate::metrics::record_stitch;
use crate::retry::{retry_async, RetryConfig};

/// Result of a successful stitch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StitchOutput {
    pub video_url: String,
    pub segment_count: usize,
}

#[derive(Clone)]
pub struct SegmentStitcher {
    fetcher: Arc<dyn SegmentFetcher>,
    muxer: Arc<dyn Muxer>,
    sink: Arc<dyn ArtifactSink>,
    work_dir: PathBuf,
    max_parallel_fetches: usize,
    upload_retry: RetryConfig,
}

impl SegmentStitcher {
    pub fn new(
        fetcher: Arc<dyn SegmentFetcher>,
        muxer: Arc<dyn Muxer>,
        sink: Arc<dyn ArtifactSink>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            fetcher,
            muxer,
            sink,
            work_dir: config.work_dir.clone(),
            max_parallel_fetches: config.max_parallel_kickoffs.max(1),
            upload_retry: RetryConfig::new("final_video_upload"),
        }
    }

    pub fn with_upload_retry(mut self, retry: RetryConfig) -> Self {
        self.upload_retry = retry;
        self
    }

    /// Stitch `segments` in `order` order and upload under the order's final key.
    ///
    /// Any segment that cannot be fetched aborts the stitch with
    /// [`PipelineError::SegmentFetchFailed`]; no partial video is produced.
    pub async fn stitch(
        &self,
        order_id: &OrderId,
        segments: Vec<Segment>,
    ) -> PipelineResult<StitchOutput> {
        let segments = order_segments(segments)?;
        let started = Instant::now();

        let result = self.stitch_ordered(order_id, &segments).await;
        record_stitch(result.is_ok(), started.elapsed());
        result
    }

    async fn stitch_ordered(
        &self,
        order_id: &OrderId,
        segments: &[Segment],
    ) -> PipelineResult<StitchOutput> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let temp = tempfile::Builder::new()
            .prefix(&format!("stitch-{}-", order_id))
            .tempdir_in(&self.work_dir)?;
        debug!(order_id = %order_id, dir = %temp.path().display(), "Stitch work dir created");

        let inputs = self.fetch_all(order_id, segments, temp.path()).await?;

        let output = temp.path().join("final.mp4");
        self.muxer.concat(&inputs, &output).await?;

        let key = final_video_key(order_id);
        let video_url = retry_async(&self.upload_retry, StorageError::is_retryable, || {
            self.sink.store_file(&output, &key, "video/mp4")
        })
        .await?;

        info!(
            order_id = %order_id,
            segments = segments.len(),
            url = %video_url,
            "Final video stitched and uploaded"
        );

        // Explicit close surfaces removal errors on the success path.
        temp.close()?;

        Ok(StitchOutput {
            video_url,
            segment_count: segments.len(),
        })
    }

    async fn fetch_all(
        &self,
        order_id: &OrderId,
        segments: &[Segment],
        dir: &Path,
    ) -> PipelineResult<Vec<PathBuf>> {
        let semaphore = Semaphore::new(self.max_parallel_fetches);

        let fetches = segments.iter().enumerate().map(|(idx, segment)| {
            let dest = dir.join(format!("segment-{:03}.mp4", idx + 1));
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| fetch_failed(order_id, segment, e.to_string()))?;
                let bytes = self
                    .fetcher
                    .fetch(&segment.url, &dest)
                    .await
                    .map_err(|e| fetch_failed(order_id, segment, e.to_string()))?;
                debug!(order_id = %order_id, order = segment.order, bytes, "Segment fetched");
                Ok::<_, PipelineError>(dest)
            }
        });

        try_join_all(fetches).await
    }
}

fn fetch_failed(order_id: &OrderId, segment: &Segment, reason: String) -> PipelineError {
    PipelineError::SegmentFetchFailed {
        order: order_id.clone(),
        url: segment.url.clone(),
        reason,
    }
}
