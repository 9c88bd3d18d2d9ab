//! Clients for the three artifact generators the pipeline drives.
//!
//! - [`ScriptGenerator`]: child profiles to a bounded scene list (Gemini)
//! - [`ImageGenerator`]: one keyframe image per scene prompt (Imagen)
//! - [`SceneVideoGenerator`]: long-running scene video jobs (Veo), started
//!   once and then polled by handle
//!
//! The pipeline only sees the traits, so tests substitute scripted fakes.

pub mod config;
pub mod error;
pub mod gemini;
pub mod imagen;
pub mod traits;
pub mod veo;

mod http;

pub use config::GeneratorConfig;
pub use error::{GeneratorError, GeneratorResult};
pub use gemini::GeminiScriptGenerator;
pub use imagen::ImagenGenerator;
pub use traits::{
    GeneratedImage, ImageGenerator, OperationStatus, SceneVideoGenerator, ScriptGenerator,
};
pub use veo::VeoGenerator;
