//! Generator configuration.

use std::time::Duration;

use crate::error::{GeneratorError, GeneratorResult};

/// Default script models, tried in order until one returns a usable script.
pub const DEFAULT_SCRIPT_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
    "gemini-2.5-pro",
];

/// Settings shared by the Google generative API clients.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub api_key: String,
    /// API root, without a trailing slash
    pub base_url: String,
    pub script_models: Vec<String>,
    pub image_model: String,
    pub video_model: String,
    pub scene_video_duration_secs: u32,
    pub request_timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            script_models: DEFAULT_SCRIPT_MODELS.iter().map(|m| m.to_string()).collect(),
            image_model: "imagen-4.0-generate-001".to_string(),
            video_model: "veo-3.0-generate-001".to_string(),
            scene_video_duration_secs: 8,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl GeneratorConfig {
    /// Load from environment variables. `GEMINI_API_KEY` is required.
    pub fn from_env() -> GeneratorResult<Self> {
        let defaults = Self::default();

        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GeneratorError::config("GEMINI_API_KEY not set"))?;

        let script_models = std::env::var("SCRIPT_MODELS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|models| !models.is_empty())
            .unwrap_or(defaults.script_models);

        Ok(Self {
            api_key,
            base_url: std::env::var("GEMINI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            script_models,
            image_model: std::env::var("IMAGE_MODEL").unwrap_or(defaults.image_model),
            video_model: std::env::var("VIDEO_MODEL").unwrap_or(defaults.video_model),
            scene_video_duration_secs: std::env::var("SCENE_VIDEO_DURATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.scene_video_duration_secs),
            request_timeout: std::env::var("GENERATOR_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        })
    }

    /// Config pointing at a local mock server.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            api_key: "test-key".to_string(),
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "GEMINI_API_KEY",
            "GEMINI_BASE_URL",
            "SCRIPT_MODELS",
            "IMAGE_MODEL",
            "VIDEO_MODEL",
            "SCENE_VIDEO_DURATION_SECS",
            "GENERATOR_REQUEST_TIMEOUT_SECS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn missing_api_key_is_an_error() {
        clear_env();
        assert!(matches!(
            GeneratorConfig::from_env(),
            Err(GeneratorError::Config(_))
        ));
    }

    #[test]
    #[serial]
    fn script_models_parse_as_ordered_list() {
        clear_env();
        std::env::set_var("GEMINI_API_KEY", "k");
        std::env::set_var("SCRIPT_MODELS", " model-a, ,model-b ");
        std::env::set_var("GEMINI_BASE_URL", "http://localhost:9999/");

        let config = GeneratorConfig::from_env().unwrap();
        assert_eq!(config.script_models, vec!["model-a", "model-b"]);
        assert_eq!(config.base_url, "http://localhost:9999");
        assert_eq!(config.scene_video_duration_secs, 8);
        clear_env();
    }
}
