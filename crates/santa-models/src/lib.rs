//! Shared data models for the Santa video pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Orders and the order status state machine
//! - Child profiles used as script input
//! - Bounded scene lists produced by the script generator
//! - Scene-video operations tracked while polling
//! - Video segments handed to the stitcher

pub mod child;
pub mod error;
pub mod operation;
pub mod order;
pub mod script;
pub mod segment;

// Re-export common types
pub use child::{validate_children, ChildProfile, MAX_CHILDREN};
pub use error::{ModelError, ModelResult};
pub use operation::{OperationHandle, SceneError, SceneErrorCode, SceneOpStatus, SceneOperation};
pub use order::{GenerationProgress, GenerationStage, Order, OrderId, OrderStatus};
pub use script::{Scene, SceneList, Script, MAX_SCENES};
pub use segment::{order_segments, Segment, SegmentKind};
