//! Pipeline orchestrator.
//!
//! `run` takes a paid order through script, keyframes and scene kickoffs and
//! returns once every scene job handle is persisted. Later triggers call
//! `advance`, which polls, persists and, once every scene finished, either
//! stitches or fails the order. Each step re-reads the order and writes back
//! through [`update_order`], so concurrent triggers cannot lose each other's
//! writes and a repeated trigger never redoes a finished step.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use tokio::sync::Semaphore;
use tracing::{debug, warn, Instrument};

use santa_firestore::{update_order, OrderStore, UpdateError};
use santa_generators::{
    GeneratedImage, GeneratorError, GeneratorResult, ImageGenerator, SceneVideoGenerator,
    ScriptGenerator,
};
use santa_models::{
    order_segments, Order, OrderId, OrderStatus, Scene, SceneOperation, Script, Segment,
};
use santa_storage::{extension_for_mime, keyframe_key, ArtifactSink, StorageError};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::guard::StitchGuard;
use crate::logging::OrderLogger;
use crate::metrics::{record_order_completed, record_stage_failure};
use crate::poller::{OperationPoller, PollReport};
use crate::retry::{retry_async, RetryConfig};
use crate::stitcher::SegmentStitcher;

/// Statuses in which synchronous work is running and an old `updated_at`
/// means the worker died.
const BUSY_STATUSES: [OrderStatus; 4] = [
    OrderStatus::GeneratingScript,
    OrderStatus::GeneratingKeyframes,
    OrderStatus::KeyframesReady,
    OrderStatus::Stitching,
];

/// The three artifact generators.
#[derive(Clone)]
pub struct Generators {
    pub script: Arc<dyn ScriptGenerator>,
    pub images: Arc<dyn ImageGenerator>,
    pub videos: Arc<dyn SceneVideoGenerator>,
}

/// Result of one `advance` trigger.
#[derive(Debug, Clone)]
pub struct AdvanceOutcome {
    pub order: Order,
    /// Aggregate over the persisted operations after this trigger
    pub report: PollReport,
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn OrderStore>,
    generators: Generators,
    sink: Arc<dyn ArtifactSink>,
    poller: OperationPoller,
    stitcher: SegmentStitcher,
    guard: StitchGuard,
    config: PipelineConfig,
    generator_retry: RetryConfig,
    upload_retry: RetryConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn OrderStore>,
        generators: Generators,
        sink: Arc<dyn ArtifactSink>,
        stitcher: SegmentStitcher,
        config: PipelineConfig,
    ) -> Self {
        Self {
            poller: OperationPoller::new(generators.videos.clone(), &config),
            store,
            generators,
            sink,
            stitcher,
            guard: StitchGuard::new(),
            config,
            generator_retry: RetryConfig::new("generator_call"),
            upload_retry: RetryConfig::new("artifact_upload"),
        }
    }

    /// Override both retry policies (tests use millisecond delays).
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.generator_retry = retry.clone();
        self.upload_retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub async fn get_order(&self, id: &OrderId) -> PipelineResult<Order> {
        self.store
            .get(id)
            .await?
            .map(|v| v.value)
            .ok_or_else(|| PipelineError::NotFound(id.clone()))
    }

    /// Apply a payment confirmation. The flag is false for an idempotent replay.
    pub async fn confirm_payment(
        &self,
        id: &OrderId,
        reference: &str,
    ) -> PipelineResult<(Order, bool)> {
        let mut applied = false;
        let order = update_order(self.store.as_ref(), id, |o| {
            applied = o.confirm_payment(reference)?;
            Ok(applied)
        })
        .await?;
        Ok((order, applied))
    }

    /// Reset a failed order to `paid`. The caller starts [`Orchestrator::run`].
    pub async fn retry(&self, id: &OrderId) -> PipelineResult<Order> {
        let order = update_order(self.store.as_ref(), id, |o| {
            o.reset_for_retry()?;
            Ok(true)
        })
        .await?;
        OrderLogger::new(id, "retry")
            .log_start(&format!("reset to paid (retry {})", order.retry_count));
        Ok(order)
    }

    /// Drive the order as far as it can go without waiting.
    ///
    /// A `paid` order is claimed and generated up to scene kickoff; an order
    /// in `generating_scenes` is advanced; anything else is left alone.
    pub async fn run(&self, id: &OrderId) -> PipelineResult<Order> {
        let logger = OrderLogger::new(id, "run");
        let span = logger.create_span();

        async {
            let order = self.get_order(id).await?;
            match order.status {
                OrderStatus::Paid => self.generate(id, &logger).await,
                OrderStatus::GeneratingScenes => Ok(self.advance_inner(id, &logger).await?.order),
                status => {
                    debug!(order_id = %id, status = %status, "Nothing to run");
                    Ok(order)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// One external trigger for an order waiting on scene videos.
    pub async fn advance(&self, id: &OrderId) -> PipelineResult<AdvanceOutcome> {
        let logger = OrderLogger::new(id, "advance");
        let span = logger.create_span();
        self.advance_inner(id, &logger).instrument(span).await
    }

    /// Stitch the order's segments and complete it.
    ///
    /// `segments` defaults to the completed scene videos in scene order. A
    /// complete order returns its existing URL.
    pub async fn finalize(
        &self,
        id: &OrderId,
        segments: Option<Vec<Segment>>,
    ) -> PipelineResult<String> {
        let logger = OrderLogger::new(id, "finalize");
        let span = logger.create_span();
        self.finalize_inner(id, segments, &logger)
            .instrument(span)
            .await
    }

    async fn generate(&self, id: &OrderId, logger: &OrderLogger) -> PipelineResult<Order> {
        let mut claimed = false;
        let order = update_order(self.store.as_ref(), id, |o| {
            claimed = o.status == OrderStatus::Paid;
            if claimed {
                o.begin_script()?;
            }
            Ok(claimed)
        })
        .await?;
        if !claimed {
            logger.log_progress(&format!("already picked up ({})", order.status));
            return Ok(order);
        }

        logger.log_start(&format!("generating for {} children", order.child_count));
        let result = self.generate_claimed(id, order, logger).await;

        if let Err(e) = &result {
            if !e.is_caller_error() {
                record_stage_failure(stage_of(e));
                logger.log_error(&e.to_string());
                self.fail_order(id, &e.to_string()).await;
            }
        }
        result
    }

    async fn generate_claimed(
        &self,
        id: &OrderId,
        order: Order,
        logger: &OrderLogger,
    ) -> PipelineResult<Order> {
        let script = match order.script.clone() {
            Some(script) => {
                logger.log_progress("script already recorded, skipping");
                script
            }
            None => {
                self.call_generator::<Script, _, _>("script", "script generation".to_string(), || {
                    self.generators.script.generate(&order.children)
                })
                .await?
            }
        };
        update_order(self.store.as_ref(), id, |o| {
            o.record_script(script.clone())?;
            Ok(true)
        })
        .await?;
        logger.log_progress(&format!("script ready: {} scenes", script.scene_count()));

        let scenes: Vec<&Scene> = script.scenes.iter().collect();
        let keyframes = self.generate_keyframes(id, &scenes).await?;
        let urls: Vec<String> = keyframes.iter().map(|(_, url)| url.clone()).collect();
        update_order(self.store.as_ref(), id, |o| {
            o.record_keyframes(urls.clone())?;
            Ok(true)
        })
        .await?;
        logger.log_progress(&format!("{} keyframes stored", urls.len()));

        let operations = self.kick_off_scenes(&scenes, &keyframes).await?;
        let order = update_order(self.store.as_ref(), id, |o| {
            o.record_scene_operations(operations.clone())?;
            Ok(true)
        })
        .await?;
        logger.log_progress(&format!(
            "{} scene videos started, waiting for poll triggers",
            operations.len()
        ));
        Ok(order)
    }

    /// One keyframe per scene. The first failure aborts the whole set.
    async fn generate_keyframes(
        &self,
        id: &OrderId,
        scenes: &[&Scene],
    ) -> PipelineResult<Vec<(GeneratedImage, String)>> {
        let semaphore = Semaphore::new(self.config.max_parallel_kickoffs.max(1));

        let tasks = scenes.iter().map(|scene| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| PipelineError::validation(e.to_string()))?;

                let image = self
                    .call_generator(
                        "keyframes",
                        format!("keyframe for scene {}", scene.scene_number),
                        || self.generators.images.generate(&scene.image_prompt),
                    )
                    .await?;

                let key = keyframe_key(id, scene.scene_number, extension_for_mime(&image.mime_type));
                let url = retry_async(&self.upload_retry, StorageError::is_retryable, || {
                    self.sink.store(image.bytes.clone(), &key, &image.mime_type)
                })
                .await?;
                debug!(order_id = %id, scene = scene.scene_number, "Keyframe stored");
                Ok::<_, PipelineError>((image, url))
            }
        });

        try_join_all(tasks).await
    }

    /// Start one scene video job per scene, in scene order.
    async fn kick_off_scenes(
        &self,
        scenes: &[&Scene],
        keyframes: &[(GeneratedImage, String)],
    ) -> PipelineResult<Vec<SceneOperation>> {
        let semaphore = Semaphore::new(self.config.max_parallel_kickoffs.max(1));

        let tasks = scenes.iter().zip(keyframes).map(|(scene, (image, _))| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| PipelineError::validation(e.to_string()))?;
                let handle = self
                    .call_generator(
                        "scene_video",
                        format!("scene {} kickoff", scene.scene_number),
                        || self.generators.videos.start(scene, image),
                    )
                    .await?;
                Ok::<_, PipelineError>(SceneOperation::new(scene.scene_number, handle))
            }
        });

        try_join_all(tasks).await
    }

    async fn advance_inner(
        &self,
        id: &OrderId,
        logger: &OrderLogger,
    ) -> PipelineResult<AdvanceOutcome> {
        let order = self.get_order(id).await?;
        if order.status != OrderStatus::GeneratingScenes {
            let report = PollReport::summarize(order.scene_operations.clone());
            return Ok(AdvanceOutcome { order, report });
        }

        let polled = self
            .poller
            .poll(order.scene_operations.clone(), Utc::now())
            .await;
        let refreshed = polled.operations;
        let order = update_order(self.store.as_ref(), id, |o| {
            if o.status != OrderStatus::GeneratingScenes {
                return Ok(false);
            }
            Ok(o.merge_scene_operations(&refreshed)? > 0)
        })
        .await?;

        let report = PollReport::summarize(order.scene_operations.clone());
        if order.status != OrderStatus::GeneratingScenes || !report.all_complete {
            logger.log_progress(&format!(
                "{}/{} scenes complete",
                report.completed_count, report.total_count
            ));
            return Ok(AdvanceOutcome { order, report });
        }

        if report.any_failed {
            let summary = order
                .scene_failure_summary()
                .unwrap_or_else(|| "scene generation failed".to_string());
            record_stage_failure("scene_video");
            logger.log_error(&summary);
            let order = update_order(self.store.as_ref(), id, |o| {
                if o.status != OrderStatus::GeneratingScenes {
                    return Ok(false);
                }
                o.fail(summary.clone())?;
                Ok(true)
            })
            .await?;
            return Ok(AdvanceOutcome { order, report });
        }

        match self.finalize_inner(id, None, logger).await {
            Ok(_) => {}
            Err(PipelineError::Conflict(_)) => {
                logger.log_progress("stitch already running elsewhere");
            }
            Err(e) if e.is_caller_error() => {
                logger.log_warning(&format!("finalize skipped: {}", e));
            }
            // The order was already marked failed.
            Err(e) => logger.log_warning(&format!("finalize failed: {}", e)),
        }

        let order = self.get_order(id).await?;
        Ok(AdvanceOutcome { order, report })
    }

    async fn finalize_inner(
        &self,
        id: &OrderId,
        segments: Option<Vec<Segment>>,
        logger: &OrderLogger,
    ) -> PipelineResult<String> {
        let order = self.get_order(id).await?;
        match order.status {
            OrderStatus::Complete => return existing_video(&order),
            OrderStatus::Stitching => return Err(PipelineError::Conflict(id.clone())),
            OrderStatus::GeneratingScenes => {}
            other => {
                return Err(PipelineError::InvalidTransition {
                    from: other,
                    to: OrderStatus::Stitching,
                })
            }
        }

        if !order.scene_operations.iter().all(SceneOperation::is_complete) {
            return Err(PipelineError::validation("not every scene video is complete"));
        }
        let segments = match segments {
            Some(segments) => segments,
            None => order
                .completed_segments()
                .ok_or_else(|| PipelineError::validation("order has no completed scenes"))?,
        };
        let segments = order_segments(segments)?;

        if !self.guard.try_acquire(id) {
            return Err(PipelineError::Conflict(id.clone()));
        }
        let _release = scopeguard::guard((), |_| self.guard.release(id));

        let mut claimed = false;
        let order = update_order(self.store.as_ref(), id, |o| {
            claimed = o.status == OrderStatus::GeneratingScenes;
            if claimed {
                o.begin_stitching()?;
            }
            Ok(claimed)
        })
        .await?;
        if !claimed {
            return match order.status {
                OrderStatus::Complete => existing_video(&order),
                OrderStatus::Stitching => Err(PipelineError::Conflict(id.clone())),
                other => Err(PipelineError::InvalidTransition {
                    from: other,
                    to: OrderStatus::Stitching,
                }),
            };
        }

        logger.log_start(&format!("stitching {} segments", segments.len()));
        let result = self.stitch_and_complete(id, segments, logger).await;
        if let Err(e) = &result {
            record_stage_failure("stitching");
            logger.log_error(&e.to_string());
            self.fail_order(id, &format!("stitch failed: {}", e)).await;
        }
        result
    }

    async fn stitch_and_complete(
        &self,
        id: &OrderId,
        segments: Vec<Segment>,
        logger: &OrderLogger,
    ) -> PipelineResult<String> {
        let output = self.stitcher.stitch(id, segments).await?;
        let url = output.video_url;

        let persisted = retry_async(&self.upload_retry, is_transient_update, || {
            update_order(self.store.as_ref(), id, |o| {
                o.complete(url.clone())?;
                Ok(true)
            })
        })
        .await;

        match persisted {
            Ok(_) => {
                record_order_completed();
                logger.log_completion(&format!("final video at {}", url));
                Ok(url)
            }
            Err(e) => {
                logger.log_error(&format!(
                    "final video uploaded to {} but order update failed: {}",
                    url, e
                ));
                Err(e.into())
            }
        }
    }

    /// Mark the order failed unless it already reached a terminal state.
    async fn fail_order(&self, id: &OrderId, message: &str) {
        let result = update_order(self.store.as_ref(), id, |o| {
            if o.status.is_terminal() {
                return Ok(false);
            }
            o.fail(message)?;
            Ok(true)
        })
        .await;

        if let Err(e) = result {
            warn!(order_id = %id, error = %e, "Could not mark order failed");
        }
    }

    /// Run a generator call with transient retries under the call deadline.
    async fn call_generator<T, F, Fut>(
        &self,
        stage: &'static str,
        what: String,
        call: F,
    ) -> PipelineResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = GeneratorResult<T>>,
    {
        let attempt = retry_async(&self.generator_retry, GeneratorError::is_transient, call);
        match tokio::time::timeout(self.config.generator_timeout, attempt).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(PipelineError::generation(stage, e)),
            Err(_) => Err(PipelineError::Timeout(what)),
        }
    }

    /// Advance every order waiting on scene videos. Returns how many were visited.
    pub async fn advance_in_flight(&self, limit: u32) -> PipelineResult<usize> {
        let orders = self
            .store
            .list_by_status(OrderStatus::GeneratingScenes, limit)
            .await?;

        for order in &orders {
            if let Err(e) = self.advance(&order.id).await {
                warn!(order_id = %order.id, error = %e, "Sweep advance failed");
            }
        }
        Ok(orders.len())
    }

    /// Fail orders stuck in a busy status since before `cutoff`.
    pub async fn fail_stale(&self, cutoff: DateTime<Utc>, limit: u32) -> PipelineResult<usize> {
        let mut failed = 0;
        for status in BUSY_STATUSES {
            for order in self.store.list_by_status(status, limit).await? {
                if order.updated_at >= cutoff || self.guard.is_held(&order.id) {
                    continue;
                }
                let mut changed = false;
                let result = update_order(self.store.as_ref(), &order.id, |o| {
                    changed = o.status == status && o.updated_at < cutoff;
                    if changed {
                        o.fail(format!("stale: no progress while {} since {}", status, o.updated_at))?;
                    }
                    Ok(changed)
                })
                .await;

                match result {
                    Ok(_) if changed => {
                        record_stage_failure("stale");
                        OrderLogger::new(&order.id, "sweep")
                            .log_warning(&format!("failed stale order in {}", status));
                        failed += 1;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(order_id = %order.id, error = %e, "Could not fail stale order"),
                }
            }
        }
        Ok(failed)
    }

    /// Paid orders nobody picked up since before `cutoff`.
    pub async fn unclaimed_paid(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> PipelineResult<Vec<OrderId>> {
        Ok(self
            .store
            .list_by_status(OrderStatus::Paid, limit)
            .await?
            .into_iter()
            .filter(|o| o.updated_at < cutoff)
            .map(|o| o.id)
            .collect())
    }
}

fn existing_video(order: &Order) -> PipelineResult<String> {
    order
        .final_video_url
        .clone()
        .ok_or_else(|| PipelineError::Persistence("complete order has no final video".into()))
}

fn is_transient_update(err: &UpdateError) -> bool {
    matches!(err, UpdateError::Store(e) if e.is_retryable())
}

fn stage_of(err: &PipelineError) -> &'static str {
    match err {
        PipelineError::ExternalGeneration { stage, .. } => *stage,
        PipelineError::Timeout(_) => "timeout",
        PipelineError::Storage(_) => "storage",
        _ => "pipeline",
    }
}
