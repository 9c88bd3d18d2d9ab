//! Operation poller.
//!
//! One invocation is one snapshot: every non-terminal scene operation gets a
//! single status query, issued concurrently under a semaphore. The poller has
//! no side effects beyond those queries; persisting the result is the
//! orchestrator's job.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use santa_generators::{OperationStatus, SceneVideoGenerator};
use santa_models::SceneOperation;

use crate::config::PipelineConfig;
use crate::metrics::{record_poll_query, record_scene_timeout};

/// Snapshot of a set of scene operations after one poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollReport {
    pub all_complete: bool,
    pub any_failed: bool,
    pub completed_count: usize,
    pub total_count: usize,
    pub operations: Vec<SceneOperation>,
}

impl PollReport {
    /// Aggregate an operation set. `all_complete` means every entry is terminal.
    pub fn summarize(operations: Vec<SceneOperation>) -> Self {
        let completed_count = operations.iter().filter(|op| op.is_complete()).count();
        Self {
            all_complete: !operations.is_empty() && operations.iter().all(|op| op.is_terminal()),
            any_failed: operations.iter().any(|op| op.is_failed()),
            completed_count,
            total_count: operations.len(),
            operations,
        }
    }

    /// Every entry finished and none failed.
    pub fn succeeded(&self) -> bool {
        self.all_complete && !self.any_failed
    }
}

/// Queries scene-video jobs and applies the timeout boundary.
#[derive(Clone)]
pub struct OperationPoller {
    generator: Arc<dyn SceneVideoGenerator>,
    semaphore: Arc<Semaphore>,
    max_poll_cycles: u32,
    scene_timeout: chrono::Duration,
}

impl OperationPoller {
    pub fn new(generator: Arc<dyn SceneVideoGenerator>, config: &PipelineConfig) -> Self {
        Self {
            generator,
            semaphore: Arc::new(Semaphore::new(config.max_parallel_queries.max(1))),
            max_poll_cycles: config.max_poll_cycles,
            scene_timeout: chrono::Duration::from_std(config.scene_timeout)
                .unwrap_or_else(|_| chrono::Duration::minutes(30)),
        }
    }

    /// Refresh `operations` once. Output has the same length and order as the input.
    pub async fn poll(&self, operations: Vec<SceneOperation>, now: DateTime<Utc>) -> PollReport {
        let refreshed = join_all(operations.into_iter().map(|op| self.refresh(op, now))).await;
        PollReport::summarize(refreshed)
    }

    async fn refresh(&self, op: SceneOperation, now: DateTime<Utc>) -> SceneOperation {
        if op.is_terminal() {
            return op;
        }

        let queried = {
            let _permit = match self.semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return op,
            };
            self.generator.poll(&op.external_handle).await
        };

        let op = match queried {
            Ok(OperationStatus::Running) => {
                record_poll_query("running");
                op.polled()
            }
            Ok(OperationStatus::Complete { video_url }) => {
                record_poll_query("complete");
                debug!(scene = op.scene_number, "Scene video complete");
                op.completed(video_url)
            }
            Ok(OperationStatus::Failed { message }) => {
                record_poll_query("failed");
                warn!(scene = op.scene_number, error = %message, "Scene video failed");
                op.failed(message)
            }
            Err(e) => {
                // Transport faults leave the entry as it was; the next cycle retries.
                record_poll_query("error");
                warn!(
                    scene = op.scene_number,
                    operation = %op.external_handle,
                    error = %e,
                    "Scene status query failed"
                );
                op
            }
        };

        self.apply_timeout(op, now)
    }

    fn apply_timeout(&self, op: SceneOperation, now: DateTime<Utc>) -> SceneOperation {
        if op.is_terminal() {
            return op;
        }
        let elapsed = now.signed_duration_since(op.started_at);
        if op.poll_count >= self.max_poll_cycles || elapsed >= self.scene_timeout {
            record_scene_timeout();
            let message = format!(
                "no result after {} polls and {}s",
                op.poll_count,
                elapsed.num_seconds()
            );
            warn!(scene = op.scene_number, "Scene video timed out: {}", message);
            return op.timed_out(message);
        }
        op
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use santa_generators::{GeneratedImage, GeneratorError, GeneratorResult};
    use santa_models::{OperationHandle, Scene, SceneErrorCode, SceneOpStatus};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Answers polls from a per-handle script; unknown handles error.
    #[derive(Default)]
    struct ScriptedVideos {
        answers: Mutex<HashMap<String, OperationStatus>>,
        queries: AtomicU32,
    }

    impl ScriptedVideos {
        fn answer(&self, handle: &str, status: OperationStatus) {
            self.answers.lock().unwrap().insert(handle.to_string(), status);
        }

        fn queries(&self) -> u32 {
            self.queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SceneVideoGenerator for ScriptedVideos {
        async fn start(&self, _: &Scene, _: &GeneratedImage) -> GeneratorResult<OperationHandle> {
            unreachable!("poller never starts jobs")
        }

        async fn poll(&self, handle: &OperationHandle) -> GeneratorResult<OperationStatus> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.answers
                .lock()
                .unwrap()
                .get(handle.as_str())
                .cloned()
                .ok_or_else(|| GeneratorError::Api {
                    status: 503,
                    message: "unavailable".into(),
                })
        }
    }

    fn ops(n: u32) -> Vec<SceneOperation> {
        (1..=n)
            .map(|i| SceneOperation::new(i, OperationHandle::new(format!("op-{}", i))))
            .collect()
    }

    fn complete(url: &str) -> OperationStatus {
        OperationStatus::Complete {
            video_url: url.to_string(),
        }
    }

    fn poller(videos: Arc<ScriptedVideos>) -> OperationPoller {
        OperationPoller::new(videos, &PipelineConfig::default())
    }

    #[tokio::test]
    async fn maps_remote_states_and_keeps_order() {
        let videos = Arc::new(ScriptedVideos::default());
        videos.answer("op-1", complete("https://v/1.mp4"));
        videos.answer("op-2", OperationStatus::Running);
        videos.answer(
            "op-3",
            OperationStatus::Failed {
                message: "filtered".into(),
            },
        );

        let report = poller(videos.clone()).poll(ops(3), Utc::now()).await;

        let statuses: Vec<_> = report.operations.iter().map(|op| op.status).collect();
        assert_eq!(
            statuses,
            vec![SceneOpStatus::Complete, SceneOpStatus::Running, SceneOpStatus::Failed]
        );
        assert_eq!(report.operations[0].video_url.as_deref(), Some("https://v/1.mp4"));
        assert!(!report.all_complete);
        assert!(report.any_failed);
        assert_eq!(report.completed_count, 1);
        assert_eq!(report.total_count, 3);
    }

    #[tokio::test]
    async fn second_poll_of_finished_set_is_identical_and_queries_nothing() {
        let videos = Arc::new(ScriptedVideos::default());
        videos.answer("op-1", complete("https://v/1.mp4"));
        videos.answer("op-2", complete("https://v/2.mp4"));
        let poller = poller(videos.clone());

        let first = poller.poll(ops(2), Utc::now()).await;
        assert!(first.succeeded());
        assert_eq!(videos.queries(), 2);

        let second = poller.poll(first.operations.clone(), Utc::now()).await;
        assert_eq!(second, first);
        assert_eq!(videos.queries(), 2);
    }

    #[tokio::test]
    async fn terminal_entry_never_regresses() {
        let videos = Arc::new(ScriptedVideos::default());
        videos.answer("op-1", complete("https://v/1.mp4"));
        let poller = poller(videos.clone());
        let done = poller.poll(ops(1), Utc::now()).await;

        videos.answer(
            "op-1",
            OperationStatus::Failed {
                message: "changed its mind".into(),
            },
        );
        let again = poller.poll(done.operations, Utc::now()).await;

        assert_eq!(again.operations[0].status, SceneOpStatus::Complete);
        assert_eq!(again.operations[0].video_url.as_deref(), Some("https://v/1.mp4"));
    }

    #[tokio::test]
    async fn query_error_leaves_entry_unchanged() {
        let videos = Arc::new(ScriptedVideos::default());
        let input = ops(1);

        let report = poller(videos).poll(input.clone(), Utc::now()).await;

        assert_eq!(report.operations, input);
        assert!(!report.any_failed);
    }

    #[tokio::test]
    async fn partial_failure_reports_all_complete_with_failure() {
        let videos = Arc::new(ScriptedVideos::default());
        videos.answer("op-1", complete("https://v/1.mp4"));
        videos.answer(
            "op-2",
            OperationStatus::Failed {
                message: "boom".into(),
            },
        );
        videos.answer("op-3", OperationStatus::Running);
        let poller = poller(videos.clone());

        let first = poller.poll(ops(3), Utc::now()).await;
        assert!(first.any_failed);
        assert!(!first.all_complete);

        videos.answer("op-3", complete("https://v/3.mp4"));
        let second = poller.poll(first.operations, Utc::now()).await;
        assert!(second.all_complete);
        assert!(second.any_failed);
        assert!(!second.succeeded());
        assert_eq!(second.completed_count, 2);
    }

    #[tokio::test]
    async fn poll_budget_exhaustion_times_out() {
        let videos = Arc::new(ScriptedVideos::default());
        videos.answer("op-1", OperationStatus::Running);
        let config = PipelineConfig {
            max_poll_cycles: 2,
            ..PipelineConfig::default()
        };
        let poller = OperationPoller::new(videos, &config);

        let first = poller.poll(ops(1), Utc::now()).await;
        assert_eq!(first.operations[0].status, SceneOpStatus::Running);

        let second = poller.poll(first.operations, Utc::now()).await;
        let op = &second.operations[0];
        assert_eq!(op.status, SceneOpStatus::Failed);
        assert_eq!(op.error.as_ref().map(|e| e.code), Some(SceneErrorCode::Timeout));
        assert!(second.all_complete && second.any_failed);
    }

    #[tokio::test]
    async fn wall_clock_timeout_applies_even_when_queries_fail() {
        let videos = Arc::new(ScriptedVideos::default());
        let later = Utc::now() + chrono::Duration::hours(2);

        let report = poller(videos).poll(ops(1), later).await;

        assert_eq!(
            report.operations[0].error.as_ref().map(|e| e.code),
            Some(SceneErrorCode::Timeout)
        );
    }
}
