//! Orders and the order status state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{
    validate_children, ChildProfile, ModelError, ModelResult, SceneOperation, Script, Segment,
};

/// Unique identifier for an order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    /// Generate a new random order ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Pipeline progress of an order.
///
/// ```text
/// pending_payment -> paid -> generating_script -> generating_keyframes
///   -> keyframes_ready -> generating_scenes -> stitching -> complete
/// ```
/// `failed` is reachable from every non-terminal state; `failed -> paid` is the retry edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    PendingPayment,
    Paid,
    GeneratingScript,
    GeneratingKeyframes,
    KeyframesReady,
    GeneratingScenes,
    Stitching,
    Complete,
    Failed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::PendingPayment,
        OrderStatus::Paid,
        OrderStatus::GeneratingScript,
        OrderStatus::GeneratingKeyframes,
        OrderStatus::KeyframesReady,
        OrderStatus::GeneratingScenes,
        OrderStatus::Stitching,
        OrderStatus::Complete,
        OrderStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::GeneratingScript => "generating_script",
            OrderStatus::GeneratingKeyframes => "generating_keyframes",
            OrderStatus::KeyframesReady => "keyframes_ready",
            OrderStatus::GeneratingScenes => "generating_scenes",
            OrderStatus::Stitching => "stitching",
            OrderStatus::Complete => "complete",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Complete | OrderStatus::Failed)
    }

    /// A generation run may pick the order up from this state.
    pub fn is_generation_eligible(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid
                | OrderStatus::GeneratingScript
                | OrderStatus::GeneratingKeyframes
                | OrderStatus::KeyframesReady
                | OrderStatus::GeneratingScenes
        )
    }

    /// Synchronous work is under way; an order parked here for long was abandoned.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            OrderStatus::GeneratingScript
                | OrderStatus::GeneratingKeyframes
                | OrderStatus::KeyframesReady
                | OrderStatus::Stitching
        )
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (*self, next) {
            (PendingPayment, Paid)
            | (Paid, GeneratingScript)
            | (GeneratingScript, GeneratingKeyframes)
            | (GeneratingKeyframes, KeyframesReady)
            | (KeyframesReady, GeneratingScenes)
            | (GeneratingScenes, Stitching)
            | (Stitching, Complete)
            | (Failed, Paid) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStage {
    Script,
    Keyframes,
    Scenes,
    Stitching,
}

/// Operator-facing progress marker. Never used to resume work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationProgress {
    pub stage: GenerationStage,
    pub completed: u32,
    pub total: u32,
}

impl GenerationProgress {
    pub fn new(stage: GenerationStage, completed: u32, total: u32) -> Self {
        Self {
            stage,
            completed,
            total,
        }
    }
}

/// One purchase and its generation pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,

    /// Owner (auth subject)
    pub user_id: String,

    #[serde(default)]
    pub status: OrderStatus,

    pub child_count: u32,

    pub children: Vec<ChildProfile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<Script>,

    /// One image per scene, in scene order
    #[serde(default)]
    pub keyframe_urls: Vec<String>,

    /// One operation per scene, in scene order
    #[serde(default)]
    pub scene_operations: Vec<SceneOperation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_video_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_progress: Option<GenerationProgress>,

    #[serde(default)]
    pub retry_count: u32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create an order awaiting payment.
    pub fn new(user_id: impl Into<String>, children: Vec<ChildProfile>) -> ModelResult<Self> {
        validate_children(&children)?;
        let now = Utc::now();

        Ok(Self {
            id: OrderId::new(),
            user_id: user_id.into(),
            status: OrderStatus::PendingPayment,
            child_count: children.len() as u32,
            children,
            payment_reference: None,
            script: None,
            keyframe_urls: Vec::new(),
            scene_operations: Vec::new(),
            final_video_url: None,
            error_message: None,
            generation_progress: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            paid_at: None,
            completed_at: None,
        })
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    pub fn scene_count(&self) -> Option<usize> {
        self.script.as_ref().map(Script::scene_count)
    }

    fn transition(&mut self, next: OrderStatus) -> ModelResult<()> {
        self.ensure_can(next)?;
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn ensure_can(&self, next: OrderStatus) -> ModelResult<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(ModelError::invalid_transition(self.status, next))
        }
    }

    /// Apply a payment confirmation.
    ///
    /// Returns `Ok(false)` for a replay of the reference already recorded.
    pub fn confirm_payment(&mut self, reference: impl Into<String>) -> ModelResult<bool> {
        let reference = reference.into();
        if reference.trim().is_empty() {
            return Err(ModelError::validation("payment reference is empty"));
        }
        if self.status != OrderStatus::PendingPayment
            && self.payment_reference.as_deref() == Some(reference.as_str())
        {
            return Ok(false);
        }

        self.transition(OrderStatus::Paid)?;
        self.payment_reference = Some(reference);
        self.paid_at = Some(self.updated_at);
        Ok(true)
    }

    pub fn begin_script(&mut self) -> ModelResult<()> {
        self.transition(OrderStatus::GeneratingScript)?;
        self.generation_progress = Some(GenerationProgress::new(GenerationStage::Script, 0, 1));
        Ok(())
    }

    pub fn record_script(&mut self, script: Script) -> ModelResult<()> {
        let total = script.scene_count() as u32;
        self.transition(OrderStatus::GeneratingKeyframes)?;
        self.script = Some(script);
        self.generation_progress =
            Some(GenerationProgress::new(GenerationStage::Keyframes, 0, total));
        Ok(())
    }

    /// Record the full keyframe set. Partial sets are rejected.
    pub fn record_keyframes(&mut self, urls: Vec<String>) -> ModelResult<()> {
        self.ensure_can(OrderStatus::KeyframesReady)?;
        let expected = self.scene_count().unwrap_or(0);
        if urls.len() != expected {
            return Err(ModelError::validation(format!(
                "expected {} keyframes, got {}",
                expected,
                urls.len()
            )));
        }

        self.transition(OrderStatus::KeyframesReady)?;
        self.generation_progress = Some(GenerationProgress::new(
            GenerationStage::Keyframes,
            expected as u32,
            expected as u32,
        ));
        self.keyframe_urls = urls;
        Ok(())
    }

    /// Record one kicked-off operation per scene.
    pub fn record_scene_operations(&mut self, mut ops: Vec<SceneOperation>) -> ModelResult<()> {
        self.ensure_can(OrderStatus::GeneratingScenes)?;
        ops.sort_by_key(|op| op.scene_number);

        let expected: Vec<u32> = self
            .script
            .as_ref()
            .map(|s| s.scenes.scene_numbers().collect())
            .unwrap_or_default();
        let actual: Vec<u32> = ops.iter().map(|op| op.scene_number).collect();
        if expected != actual {
            return Err(ModelError::validation(format!(
                "scene operations {:?} do not match script scenes {:?}",
                actual, expected
            )));
        }

        self.transition(OrderStatus::GeneratingScenes)?;
        self.scene_operations = ops;
        self.refresh_scene_progress();
        Ok(())
    }

    /// Fold refreshed poll results into the persisted operations.
    ///
    /// An entry is replaced only when the refreshed one supersedes it, so a
    /// stale poll cycle can never regress a newer write. Returns the number of
    /// entries that changed.
    pub fn merge_scene_operations(&mut self, refreshed: &[SceneOperation]) -> ModelResult<usize> {
        if self.status != OrderStatus::GeneratingScenes {
            return Err(ModelError::invalid_transition(
                self.status,
                OrderStatus::GeneratingScenes,
            ));
        }

        let mut changed = 0;
        for update in refreshed {
            let current = self
                .scene_operations
                .iter_mut()
                .find(|op| op.scene_number == update.scene_number)
                .ok_or_else(|| {
                    ModelError::validation(format!("unknown scene {}", update.scene_number))
                })?;
            if current.external_handle != update.external_handle {
                return Err(ModelError::validation(format!(
                    "scene {} handle mismatch",
                    update.scene_number
                )));
            }
            if update.supersedes(current) {
                *current = update.clone();
                changed += 1;
            }
        }

        if changed > 0 {
            self.refresh_scene_progress();
            self.updated_at = Utc::now();
        }
        Ok(changed)
    }

    fn refresh_scene_progress(&mut self) {
        let done = self
            .scene_operations
            .iter()
            .filter(|op| op.is_complete())
            .count() as u32;
        self.generation_progress = Some(GenerationProgress::new(
            GenerationStage::Scenes,
            done,
            self.scene_operations.len() as u32,
        ));
    }

    pub fn begin_stitching(&mut self) -> ModelResult<()> {
        self.transition(OrderStatus::Stitching)?;
        self.generation_progress = Some(GenerationProgress::new(GenerationStage::Stitching, 0, 1));
        Ok(())
    }

    /// Set the final video. The only way into `complete`.
    pub fn complete(&mut self, final_video_url: impl Into<String>) -> ModelResult<()> {
        let url = final_video_url.into();
        if url.trim().is_empty() {
            return Err(ModelError::validation("final video url is empty"));
        }

        self.transition(OrderStatus::Complete)?;
        self.final_video_url = Some(url);
        self.completed_at = Some(self.updated_at);
        self.generation_progress = None;
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> ModelResult<()> {
        self.transition(OrderStatus::Failed)?;
        self.error_message = Some(error.into());
        Ok(())
    }

    /// Reset a failed, paid order so the pipeline restarts from the script.
    pub fn reset_for_retry(&mut self) -> ModelResult<()> {
        if self.status != OrderStatus::Failed || self.payment_reference.is_none() {
            return Err(ModelError::invalid_transition(self.status, OrderStatus::Paid));
        }

        self.transition(OrderStatus::Paid)?;
        self.error_message = None;
        self.generation_progress = None;
        self.script = None;
        self.keyframe_urls.clear();
        self.scene_operations.clear();
        self.final_video_url = None;
        self.completed_at = None;
        self.retry_count += 1;
        Ok(())
    }

    /// Segments for every scene when all operations completed, in scene order.
    pub fn completed_segments(&self) -> Option<Vec<Segment>> {
        if self.scene_operations.is_empty() {
            return None;
        }
        self.scene_operations
            .iter()
            .map(|op| match (&op.video_url, op.is_complete()) {
                (Some(url), true) => Some(Segment::scene(url.clone(), op.scene_number)),
                _ => None,
            })
            .collect()
    }

    /// Human-readable summary of failed scene operations.
    pub fn scene_failure_summary(&self) -> Option<String> {
        let failures: Vec<String> = self
            .scene_operations
            .iter()
            .filter(|op| op.is_failed())
            .map(|op| match &op.error {
                Some(err) => format!("scene {}: {}", op.scene_number, err),
                None => format!("scene {}: failed", op.scene_number),
            })
            .collect();

        if failures.is_empty() {
            None
        } else {
            Some(format!(
                "{} of {} scenes failed ({})",
                failures.len(),
                self.scene_operations.len(),
                failures.join("; ")
            ))
        }
    }

    /// Check the structural invariants of a persisted order.
    pub fn check_invariants(&self) -> ModelResult<()> {
        if self.final_video_url.is_some() != (self.status == OrderStatus::Complete) {
            return Err(ModelError::validation(format!(
                "final video url present={} with status {}",
                self.final_video_url.is_some(),
                self.status
            )));
        }
        if self.child_count as usize != self.children.len() {
            return Err(ModelError::validation("child count does not match children"));
        }
        if matches!(
            self.status,
            OrderStatus::GeneratingScenes | OrderStatus::Stitching | OrderStatus::Complete
        ) && Some(self.scene_operations.len()) != self.scene_count()
        {
            return Err(ModelError::validation(
                "scene operation count does not match script",
            ));
        }
        Ok(())
    }
}
