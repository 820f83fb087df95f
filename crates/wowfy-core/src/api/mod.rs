//! ============================================================================
//! API Module - Wowfy backend client
//! ============================================================================
//! The backend is a set of PHP endpoints taking form or query parameters and
//! answering with a `{ success, message, data }` envelope:
//! - `userTaskProgress.php`: periodic progress ping
//! - `userEndProgress.php`: closes a task assignment
//! - `checkNextTaskExist.php`: looks up the next task in a challenge
//! - `createUserTasks.php`: creates a task assignment
//!
//! Route distances for map tasks come from a separate distance matrix API.
//! No call is retried; failures are returned to the caller.
//! ============================================================================

mod distance;
mod http;

pub use distance::{DistanceMatrixClient, RouteDistance};
pub use http::HttpWowfyApi;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{
    value_to_text, CaptureKind, ProgressSample, Task, TaskAssignment, WowfyError, WowfyResult,
};

pub const PROGRESS_ENDPOINT: &str = "userTaskProgress.php";
pub const END_PROGRESS_ENDPOINT: &str = "userEndProgress.php";
pub const CHECK_NEXT_TASK_ENDPOINT: &str = "checkNextTaskExist.php";
pub const CREATE_USER_TASK_ENDPOINT: &str = "createUserTasks.php";

/// Client interface for the challenge backend
#[async_trait]
pub trait WowfyApi: Send + Sync {
    /// Send the current step count for an assignment
    async fn report_progress(&self, assignment: &TaskAssignment, steps: u32) -> WowfyResult<()>;

    /// Close an assignment with its final progress
    async fn end_progress(&self, report: &EndProgress) -> WowfyResult<()>;

    /// The task that follows `task_id` in the challenge, if any
    async fn check_next_task_exist(
        &self,
        task_id: &str,
        challenge_id: &str,
    ) -> WowfyResult<Option<Task>>;

    /// Create an assignment of `task` for the user
    async fn create_user_task(
        &self,
        user_id: &str,
        task: &Task,
        challenge_id: &str,
    ) -> WowfyResult<TaskAssignment>;
}

/// Final progress sent when a task assignment closes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndProgress {
    pub assignment: TaskAssignment,
    pub steps: Option<u32>,
    pub distance_m: Option<f64>,
    /// Captured photo/video uploaded along with the completion
    pub media: Option<MediaUpload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaUpload {
    pub path: std::path::PathBuf,
    pub capture: CaptureKind,
}

impl EndProgress {
    pub fn from_sample(assignment: TaskAssignment, sample: &ProgressSample) -> Self {
        let mut report = Self {
            assignment,
            steps: None,
            distance_m: None,
            media: None,
        };
        match sample {
            ProgressSample::Steps { steps } => report.steps = Some(*steps),
            ProgressSample::Distance { route_m, straight_m } => {
                report.distance_m = Some(route_m.unwrap_or(*straight_m))
            }
            ProgressSample::Captured { path, capture } => {
                report.media = Some(MediaUpload {
                    path: path.clone(),
                    capture: *capture,
                })
            }
        }
        report
    }

    /// Text fields of the request, in a stable order
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("user_id", self.assignment.user_id.clone()),
            ("user_task_id", self.assignment.user_task_id.clone()),
            ("task_id", self.assignment.task_id.clone()),
            ("challenge_id", self.assignment.challenge_id.clone()),
        ];
        if let Some(steps) = self.steps {
            fields.push(("steps", steps.to_string()));
        }
        if let Some(distance) = self.distance_m {
            fields.push(("distance", format!("{:.1}", distance)));
        }
        fields
    }
}

// ============================================================================
// Response envelope
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    success: Value,
    #[serde(default)]
    status: Value,
    #[serde(default)]
    message: Value,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// `success` (or, on older endpoints, `status`) is truthy
    pub fn is_success(&self) -> bool {
        truthy(&self.success) || truthy(&self.status)
    }

    pub fn message(&self) -> String {
        value_to_text(&self.message).unwrap_or_else(|| "no message".to_string())
    }

    pub fn into_result(self, endpoint: &str) -> WowfyResult<Value> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(WowfyError::Server {
                endpoint: endpoint.to_string(),
                message: self.message(),
            })
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "1" | "success" | "ok" | "yes"
        ),
        _ => false,
    }
}

/// Pull the next task out of a `checkNextTaskExist` payload.
/// The endpoint answers with null/false/[] when the challenge is finished.
pub(crate) fn parse_next_task(data: Value) -> WowfyResult<Option<Task>> {
    let candidate = match data {
        Value::Array(mut items) => {
            if items.is_empty() {
                return Ok(None);
            }
            items.swap_remove(0)
        }
        Value::Object(mut map) => match map.remove("task") {
            Some(inner @ Value::Object(_)) => inner,
            Some(other) => {
                map.insert("task".to_string(), other);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        _ => return Ok(None),
    };

    serde_json::from_value(candidate)
        .map(Some)
        .map_err(|e| WowfyError::MalformedResponse {
            endpoint: CHECK_NEXT_TASK_ENDPOINT.to_string(),
            detail: e.to_string(),
        })
}

/// Pull the new assignment id out of a `createUserTasks` payload
pub(crate) fn parse_user_task_id(data: &Value) -> WowfyResult<String> {
    let id = match data {
        Value::Object(map) => ["user_task_id", "userTaskId", "id"]
            .iter()
            .find_map(|key| map.get(*key).and_then(value_to_text)),
        other => value_to_text(other),
    };

    id.ok_or_else(|| WowfyError::MalformedResponse {
        endpoint: CREATE_USER_TASK_ENDPOINT.to_string(),
        detail: format!("no user task id in {}", data),
    })
}
