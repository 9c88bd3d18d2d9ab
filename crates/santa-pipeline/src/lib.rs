//! Content-generation pipeline for Santa video orders.
//!
//! This crate drives an order from `paid` to `complete`:
//! - [`Orchestrator`]: sequences script, keyframes and scene kickoffs, then
//!   resumes on each external trigger to poll and stitch
//! - [`OperationPoller`]: one snapshot query per in-flight scene job
//! - [`SegmentStitcher`]: fetch, concatenate and upload the final video
//! - [`StitchGuard`]: at most one stitch per order in this process
//!
//! Every decision is re-derived from the persisted order, so any instance can
//! service any trigger.

pub mod config;
pub mod egress;
pub mod error;
pub mod fetch;
pub mod guard;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod poller;
pub mod retry;
pub mod stitcher;

pub use config::PipelineConfig;
pub use egress::{is_internal_host, UrlScope};
pub use error::{PipelineError, PipelineResult};
pub use fetch::{FetchError, HttpFetcher, SegmentFetcher};
pub use guard::StitchGuard;
pub use logging::OrderLogger;
pub use orchestrator::{AdvanceOutcome, Generators, Orchestrator};
pub use poller::{OperationPoller, PollReport};
pub use retry::{retry_async, RetryConfig};
pub use stitcher::{SegmentStitcher, StitchOutput};
