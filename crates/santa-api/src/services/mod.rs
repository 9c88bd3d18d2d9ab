//! Background work and fire-and-forget triggers.

pub mod scene_sweeper;
pub mod trigger;

pub use scene_sweeper::{SceneSweeper, SweepReport};
pub use trigger::spawn_run;
