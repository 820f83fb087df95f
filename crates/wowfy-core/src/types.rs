//! ============================================================================
//! Core Types for Wowfy
//! ============================================================================
//! Challenge, task and session records as the PHP backend returns them, the
//! transient progress samples tracked while a task runs, and the error type
//! shared by every module.
//! ============================================================================

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ============================================================================
// Lenient field decoding
// ============================================================================
// The backend is inconsistent about JSON types: ids and numeric fields show up
// as strings, numbers or null depending on the endpoint.

pub(crate) fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid id: {}", other))),
    }
}

pub(crate) fn de_opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_text(&Value::deserialize(deserializer)?))
}

pub(crate) fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// "yes" / "1" / "true" flags used across challenge and task records
fn is_yes(flag: &Option<String>) -> bool {
    flag.as_deref()
        .map(|f| matches!(f.trim().to_lowercase().as_str(), "yes" | "y" | "1" | "true"))
        .unwrap_or(false)
}

// ============================================================================
// Session
// ============================================================================

/// Logged-in user as cached on the device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSession {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Onboarding stage reached by the user
    #[serde(default, deserialize_with = "de_opt_text")]
    pub steps: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub mobile: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub email: Option<String>,
    /// Unix timestamp of the last write to the local cache
    #[serde(default)]
    pub cached_at: Option<i64>,
    /// Any other profile fields the backend sent along
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl UserSession {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            steps: None,
            mobile: None,
            email: None,
            cached_at: None,
            extra: serde_json::Map::new(),
        }
    }
}

// ============================================================================
// Challenges & Tasks
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Challenge {
    #[serde(deserialize_with = "de_id")]
    pub challenge_id: String,
    #[serde(default)]
    pub title: String,
    /// "contest" or a recurrence label
    #[serde(default, deserialize_with = "de_opt_text")]
    pub frequency: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub entry_points: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub reward_points: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub multiple: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub visit: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub single_task: Option<String>,
}

impl Challenge {
    pub fn is_contest(&self) -> bool {
        self.frequency
            .as_deref()
            .map(|f| f.eq_ignore_ascii_case("contest"))
            .unwrap_or(false)
    }

    pub fn allows_multiple(&self) -> bool {
        is_yes(&self.multiple)
    }

    pub fn requires_visit(&self) -> bool {
        is_yes(&self.visit)
    }

    pub fn is_single_task(&self) -> bool {
        is_yes(&self.single_task)
    }
}

/// Declared kind of a task; decides which sensors run and which screen opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskType {
    Map,
    StepCounter,
    MediaCapture,
    VideoCapture,
    Quiz,
    #[default]
    Other,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Map => "map",
            TaskType::StepCounter => "stepCounter",
            TaskType::MediaCapture => "mediaCapture",
            TaskType::VideoCapture => "videoCapture",
            TaskType::Quiz => "quiz",
            TaskType::Other => "other",
        }
    }
}

impl FromStr for TaskType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        Ok(match normalized.as_str() {
            "map" => TaskType::Map,
            "stepcounter" => TaskType::StepCounter,
            "mediacapture" => TaskType::MediaCapture,
            "videocapture" => TaskType::VideoCapture,
            "quiz" => TaskType::Quiz,
            _ => TaskType::Other,
        })
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TaskType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = value_to_text(&Value::deserialize(deserializer)?).unwrap_or_default();
        Ok(raw.parse().unwrap_or_default())
    }
}

/// A single unit of work within a challenge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    #[serde(deserialize_with = "de_id")]
    pub task_id: String,
    #[serde(default)]
    pub task_name: String,
    #[serde(default)]
    pub task_type: TaskType,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub reward_points: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub multiple: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub challenge_id: Option<String>,
    /// Step goal for stepCounter tasks
    #[serde(default, alias = "maxSteps", deserialize_with = "de_opt_text")]
    pub max_steps: Option<String>,
    /// Arrival radius in meters for map tasks
    #[serde(default, deserialize_with = "de_opt_text")]
    pub reach_distance: Option<String>,
    #[serde(default, alias = "lat", deserialize_with = "de_opt_text")]
    pub latitude: Option<String>,
    #[serde(default, alias = "lng", deserialize_with = "de_opt_text")]
    pub longitude: Option<String>,
}

impl Task {
    pub fn allows_multiple(&self) -> bool {
        is_yes(&self.multiple)
    }

    /// Parsed step goal; None when missing or not a positive integer
    pub fn step_goal(&self) -> Option<u32> {
        self.max_steps
            .as_deref()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 1.0)
            .map(|v| v.round() as u32)
    }

    /// Target location of a map task
    pub fn target(&self) -> Option<crate::geo::Coordinates> {
        let latitude = self.latitude.as_deref()?.trim().parse::<f64>().ok()?;
        let longitude = self.longitude.as_deref()?.trim().parse::<f64>().ok()?;
        crate::geo::Coordinates::new(latitude, longitude)
    }
}

/// Server-side record linking a user to a task instance.
/// `user_task_id` is opaque; progress and completion are reported against it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TaskAssignment {
    pub user_task_id: String,
    pub task_id: String,
    pub challenge_id: String,
    pub user_id: String,
}

// ============================================================================
// Progress
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    Photo,
    Video,
}

/// Transient progress toward a task's completion condition.
/// Lives only while the task screen is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressSample {
    Steps { steps: u32 },
    Distance {
        /// Driving-route distance, when a route provider answered
        route_m: Option<f64>,
        /// Great-circle distance
        straight_m: f64,
    },
    Captured { path: PathBuf, capture: CaptureKind },
}

/// Screens the app can transition to after a task event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Home,
    TaskDetail,
    StepCounter,
    Map,
    PhotoCapture,
    VideoRecording,
    Quiz,
    Share,
    Certificate,
}

impl Screen {
    /// Screen that runs a task of the given type
    pub fn for_task_type(task_type: TaskType) -> Self {
        match task_type {
            TaskType::VideoCapture => Screen::VideoRecording,
            TaskType::MediaCapture => Screen::PhotoCapture,
            TaskType::StepCounter => Screen::StepCounter,
            TaskType::Map => Screen::Map,
            TaskType::Quiz => Screen::Quiz,
            TaskType::Other => Screen::TaskDetail,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error types for the task progression core
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, thiserror::Error)]
pub enum WowfyError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server rejected {endpoint}: {message}")]
    Server { endpoint: String, message: String },

    #[error("Malformed response from {endpoint}: {detail}")]
    MalformedResponse { endpoint: String, detail: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid task {task_id}: {reason}")]
    InvalidTask { task_id: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Sensor stream closed before the task completed")]
    StreamClosed,
}

pub type WowfyResult<T> = std::result::Result<T, WowfyError>;
