//! Scene-video generation operations.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque reference to a long-running external video-generation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct OperationHandle(pub String);

impl OperationHandle {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of one scene operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SceneOpStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Failed,
}

impl SceneOpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneOpStatus::Pending => "pending",
            SceneOpStatus::Running => "running",
            SceneOpStatus::Complete => "complete",
            SceneOpStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SceneOpStatus::Complete | SceneOpStatus::Failed)
    }

    /// Position in the lifecycle; statuses only ever move to a higher rank.
    fn rank(&self) -> u8 {
        match self {
            SceneOpStatus::Pending => 0,
            SceneOpStatus::Running => 1,
            SceneOpStatus::Complete | SceneOpStatus::Failed => 2,
        }
    }
}

impl fmt::Display for SceneOpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distinguishes why a scene operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SceneErrorCode {
    /// The generator reported an explicit failure
    Generation,
    /// The operation never resolved within the poll budget
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SceneError {
    pub code: SceneErrorCode,
    pub message: String,
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            SceneErrorCode::Generation => write!(f, "{}", self.message),
            SceneErrorCode::Timeout => write!(f, "timeout: {}", self.message),
        }
    }
}

/// One scene's video-generation job as persisted on the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SceneOperation {
    pub scene_number: u32,

    pub external_handle: OperationHandle,

    #[serde(default)]
    pub status: SceneOpStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SceneError>,

    /// Status queries issued so far
    #[serde(default)]
    pub poll_count: u32,

    pub started_at: DateTime<Utc>,
}

impl SceneOperation {
    pub fn new(scene_number: u32, handle: OperationHandle) -> Self {
        Self {
            scene_number,
            external_handle: handle,
            status: SceneOpStatus::Pending,
            video_url: None,
            error: None,
            poll_count: 0,
            started_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_failed(&self) -> bool {
        self.status == SceneOpStatus::Failed
    }

    pub fn is_complete(&self) -> bool {
        self.status == SceneOpStatus::Complete
    }

    /// Record one status query that came back still running.
    pub fn polled(mut self) -> Self {
        if !self.is_terminal() {
            self.status = SceneOpStatus::Running;
            self.poll_count += 1;
        }
        self
    }

    /// Mark complete. No-op when already terminal.
    pub fn completed(mut self, video_url: impl Into<String>) -> Self {
        if !self.is_terminal() {
            self.status = SceneOpStatus::Complete;
            self.video_url = Some(video_url.into());
            self.poll_count += 1;
        }
        self
    }

    /// Mark failed with a generator error. No-op when already terminal.
    pub fn failed(self, message: impl Into<String>) -> Self {
        self.fail_with(SceneErrorCode::Generation, message.into())
    }

    /// Mark failed because the poll budget ran out. No-op when already terminal.
    pub fn timed_out(self, message: impl Into<String>) -> Self {
        self.fail_with(SceneErrorCode::Timeout, message.into())
    }

    fn fail_with(mut self, code: SceneErrorCode, message: String) -> Self {
        if !self.is_terminal() {
            self.status = SceneOpStatus::Failed;
            self.error = Some(SceneError { code, message });
        }
        self
    }

    /// Whether `self` carries strictly newer information than `other` for the same scene.
    ///
    /// Terminal entries are never superseded; otherwise a higher lifecycle rank
    /// wins, then a higher poll count.
    pub fn supersedes(&self, other: &SceneOperation) -> bool {
        if other.is_terminal() {
            return false;
        }
        match self.status.rank().cmp(&other.status.rank()) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.poll_count > other.poll_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op() -> SceneOperation {
        SceneOperation::new(1, OperationHandle::new("operations/abc"))
    }

    #[test]
    fn test_lifecycle() {
        let running = op().polled();
        assert_eq!(running.status, SceneOpStatus::Running);
        assert_eq!(running.poll_count, 1);

        let done = running.completed("https://cdn/1.mp4");
        assert!(done.is_complete());
        assert_eq!(done.video_url.as_deref(), Some("https://cdn/1.mp4"));
    }

    #[test]
    fn test_terminal_never_regresses() {
        let done = op().completed("https://cdn/1.mp4");
        let again = done.clone().polled().failed("late failure").timed_out("late");
        assert_eq!(again, done);

        let failed = op().failed("safety filter");
        let again = failed.clone().completed("https://cdn/x.mp4");
        assert_eq!(again, failed);
    }

    #[test]
    fn test_timeout_code() {
        let t = op().timed_out("no result after 3 polls");
        assert!(t.is_failed());
        let err = t.error.unwrap();
        assert_eq!(err.code, SceneErrorCode::Timeout);
        assert!(err.to_string().starts_with("timeout:"));
    }

    #[test]
    fn test_supersedes() {
        let pending = op();
        let running = op().polled();
        let running_twice = running.clone().polled();
        let done = running.clone().completed("u");

        assert!(running.supersedes(&pending));
        assert!(running_twice.supersedes(&running));
        assert!(done.supersedes(&running_twice));
        assert!(!running.supersedes(&running_twice));
        assert!(!running_twice.supersedes(&done));
        assert!(!op().failed("x").supersedes(&done));
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(op().polled()).unwrap();
        assert_eq!(json["sceneNumber"], 1);
        assert_eq!(json["externalHandle"], "operations/abc");
        assert_eq!(json["status"], "running");
        assert!(json.get("videoUrl").is_none());
    }
}
