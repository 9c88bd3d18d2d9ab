//! Gemini script generator.
//!
//! Builds a prompt from the child profiles, asks Gemini for a JSON script
//! matching [`DraftScript`]'s schema and validates the result into a bounded
//! [`SceneList`]. Models are tried in configured order until one succeeds.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use santa_models::{ChildProfile, Scene, SceneList, Script, MAX_SCENES};

use crate::config::GeneratorConfig;
use crate::error::{GeneratorError, GeneratorResult};
use crate::http::ApiClient;
use crate::traits::ScriptGenerator;

/// Shape the model is asked to return.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct DraftScript {
    title: String,
    scenes: Vec<Scene>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// [`ScriptGenerator`] backed by Gemini `generateContent`.
#[derive(Clone)]
pub struct GeminiScriptGenerator {
    api: ApiClient,
    models: Vec<String>,
}

impl GeminiScriptGenerator {
    pub fn new(config: &GeneratorConfig) -> GeneratorResult<Self> {
        if config.script_models.is_empty() {
            return Err(GeneratorError::config("no script models configured"));
        }
        Ok(Self {
            api: ApiClient::new(config)?,
            models: config.script_models.clone(),
        })
    }

    async fn call_model(&self, model: &str, prompt: &str) -> GeneratorResult<Script> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let response: GenerateContentResponse = self
            .api
            .post("script", &format!("models/{}:generateContent", model), &request)
            .await?;

        let text = response
            .candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
            .find_map(|p| p.text.as_deref())
            .ok_or_else(|| GeneratorError::invalid_response("no content in Gemini response"))?;

        parse_script(text)
    }
}

#[async_trait]
impl ScriptGenerator for GeminiScriptGenerator {
    async fn generate(&self, children: &[ChildProfile]) -> GeneratorResult<Script> {
        let prompt = build_prompt(children);
        let mut last_error = None;

        for model in &self.models {
            info!(model = %model, "Requesting script");
            match self.call_model(model, &prompt).await {
                Ok(script) => {
                    info!(model = %model, scenes = script.scene_count(), "Script generated");
                    return Ok(script);
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "Script model failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| GeneratorError::rejected("all script models failed")))
    }
}

/// Parse model output into a validated script, tolerating a markdown fence.
fn parse_script(text: &str) -> GeneratorResult<Script> {
    let text = strip_code_fence(text);
    let draft: DraftScript = serde_json::from_str(text)
        .map_err(|e| GeneratorError::invalid_response(format!("script JSON: {}", e)))?;

    if draft.title.trim().is_empty() {
        return Err(GeneratorError::invalid_response("script has no title"));
    }
    let scenes = SceneList::new(draft.scenes)
        .map_err(|e| GeneratorError::invalid_response(e.to_string()))?;

    Ok(Script {
        title: draft.title,
        scenes,
    })
}

fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

fn describe_child(child: &ChildProfile) -> String {
    let mut line = format!("- {} (age {}", child.name, child.age);
    if let Some(pronoun) = &child.pronoun {
        line.push_str(&format!(", pronoun {}", pronoun));
    }
    line.push(')');
    if !child.interests.is_empty() {
        line.push_str(&format!("; interests: {}", child.interests.join(", ")));
    }
    if !child.wishlist.is_empty() {
        line.push_str(&format!("; wishes for: {}", child.wishlist.join(", ")));
    }
    if let Some(deed) = &child.good_deed {
        line.push_str(&format!("; good deed this year: {}", deed));
    }
    if let Some(message) = &child.personal_message {
        line.push_str(&format!("; message from parents: {}", message));
    }
    line
}

fn build_prompt(children: &[ChildProfile]) -> String {
    let schema = schemars::schema_for!(DraftScript);
    let schema = serde_json::to_string_pretty(&schema).unwrap_or_default();
    let kids: Vec<String> = children.iter().map(describe_child).collect();

    format!(
        r#"Write a short personalized video message from Santa Claus.

The video is for these children:
{kids}

Return ONLY a single JSON object matching this JSON schema:
{schema}

Rules:
- Between 1 and {max} scenes, numbered from 1 with no gaps.
- Each narration is what Santa says aloud and fits in about 8 seconds.
- imagePrompt describes one still frame of Santa's workshop for the scene.
- motionPrompt describes camera and character motion starting from that frame.
- Mention every child by name at least once.
"#,
        kids = kids.join("\n"),
        schema = schema,
        max = MAX_SCENES,
    )
}
