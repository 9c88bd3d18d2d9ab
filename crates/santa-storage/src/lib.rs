//! Cloudflare R2 storage for pipeline artifacts.
//!
//! This crate provides:
//! - Upload of keyframes and final videos to R2 with replace-on-conflict
//! - Public URL construction for stored objects
//! - The `ArtifactSink` seam used by the pipeline, plus an in-memory sink
//! - The object key layout for order artifacts

pub mod client;
pub mod error;
pub mod keys;
pub mod sink;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use keys::{extension_for_mime, final_video_key, keyframe_key};
pub use sink::{ArtifactSink, MemorySink, StoredObject};
