//! Video segments handed to the stitcher.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

use crate::{ModelError, ModelResult};

/// Which producer a segment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// A generated scene video
    #[default]
    Scene,
    /// A fixed opening clip
    Intro,
    /// A fixed closing clip
    Outro,
}

/// One input to a stitch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    pub url: String,

    #[serde(rename = "type", default)]
    pub kind: SegmentKind,

    /// Position in the final video
    pub order: u32,
}

impl Segment {
    pub fn scene(url: impl Into<String>, order: u32) -> Self {
        Self {
            url: url.into(),
            kind: SegmentKind::Scene,
            order,
        }
    }
}

/// Validate caller-supplied segments and return them in playback order.
///
/// Rejects an empty list, duplicate `order` values and URLs that are not
/// absolute http(s) URLs.
pub fn order_segments(mut segments: Vec<Segment>) -> ModelResult<Vec<Segment>> {
    if segments.is_empty() {
        return Err(ModelError::validation("no segments to stitch"));
    }

    let mut seen = HashSet::with_capacity(segments.len());
    for segment in &segments {
        if !seen.insert(segment.order) {
            return Err(ModelError::validation(format!(
                "duplicate segment order {}",
                segment.order
            )));
        }
        let parsed = Url::parse(&segment.url).map_err(|e| {
            ModelError::validation(format!("segment {} has invalid url: {}", segment.order, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ModelError::validation(format!(
                "segment {} url must be http(s)",
                segment.order
            )));
        }
    }

    segments.sort_by_key(|s| s.order);
    Ok(segments)
}
