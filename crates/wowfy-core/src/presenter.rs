//! ============================================================================
//! Navigation Presenter - What the task screen shows and where it goes next
//! ============================================================================
//! Pure mapping from controller state (plus the resolved next step) to a
//! view. Modal actions become screen transitions whose parameters are copied
//! from the completed assignment or the resolver output; nothing here talks
//! to the backend.
//! ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::controller::ControllerState;
use crate::resolver::NextStep;
use crate::types::{ProgressSample, Screen, Task, TaskAssignment, WowfyError, WowfyResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalAction {
    Share,
    ViewCertificate,
    NextTask,
    GoHome,
}

const COMPLETED_ACTIONS: [ModalAction; 3] = [
    ModalAction::Share,
    ModalAction::ViewCertificate,
    ModalAction::NextTask,
];

const FULLY_COMPLETED_ACTIONS: [ModalAction; 3] = [
    ModalAction::Share,
    ModalAction::ViewCertificate,
    ModalAction::GoHome,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum View {
    InProgress {
        task_name: String,
        progress: Option<ProgressSample>,
        /// The end call is in flight
        submitting: bool,
    },
    CompletedModal {
        task_name: String,
        actions: Vec<ModalAction>,
    },
    FullyCompletedModal {
        challenge_id: String,
        actions: Vec<ModalAction>,
    },
    Blocked {
        message: String,
    },
}

/// A screen transition with its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub screen: Screen,
    pub params: BTreeMap<String, String>,
}

impl Route {
    pub fn new(screen: Screen) -> Self {
        Self {
            screen,
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

/// Performs screen transitions on behalf of the presenter
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn navigate(&self, route: &Route) -> WowfyResult<()>;
}

pub struct NavigationPresenter {
    completed: TaskAssignment,
    next: Option<NextStep>,
}

impl NavigationPresenter {
    pub fn new(completed: TaskAssignment) -> Self {
        Self {
            completed,
            next: None,
        }
    }

    pub fn with_next(mut self, next: NextStep) -> Self {
        self.next = Some(next);
        self
    }

    pub fn next(&self) -> Option<&NextStep> {
        self.next.as_ref()
    }

    /// View for the current controller state.
    /// Until the next step is resolved the completed modal offers no
    /// next-task action.
    pub fn view(
        &self,
        state: &ControllerState,
        task: &Task,
        sample: Option<&ProgressSample>,
    ) -> View {
        match state {
            ControllerState::Idle | ControllerState::Tracking => View::InProgress {
                task_name: task.task_name.clone(),
                progress: sample.cloned(),
                submitting: false,
            },
            ControllerState::Completing => View::InProgress {
                task_name: task.task_name.clone(),
                progress: sample.cloned(),
                submitting: true,
            },
            ControllerState::Blocked(message) => View::Blocked {
                message: message.clone(),
            },
            ControllerState::Completed => match &self.next {
                Some(NextStep::ChallengeComplete) => View::FullyCompletedModal {
                    challenge_id: self.completed.challenge_id.clone(),
                    actions: FULLY_COMPLETED_ACTIONS.to_vec(),
                },
                Some(NextStep::Task { .. }) => View::CompletedModal {
                    task_name: task.task_name.clone(),
                    actions: COMPLETED_ACTIONS.to_vec(),
                },
                None => View::CompletedModal {
                    task_name: task.task_name.clone(),
                    actions: vec![ModalAction::Share, ModalAction::ViewCertificate],
                },
            },
        }
    }

    pub fn route_for(&self, action: ModalAction) -> WowfyResult<Route> {
        let done = &self.completed;
        match action {
            ModalAction::Share => Ok(Route::new(Screen::Share)
                .param("user_task_id", &done.user_task_id)
                .param("task_id", &done.task_id)
                .param("challenge_id", &done.challenge_id)),
            ModalAction::ViewCertificate => Ok(Route::new(Screen::Certificate)
                .param("user_id", &done.user_id)
                .param("user_task_id", &done.user_task_id)
                .param("challenge_id", &done.challenge_id)),
            ModalAction::GoHome => Ok(Route::new(Screen::Home)),
            ModalAction::NextTask => match &self.next {
                Some(NextStep::Task {
                    task,
                    assignment,
                    screen,
                }) => Ok(Route::new(*screen)
                    .param("task_id", &task.task_id)
                    .param("task_name", &task.task_name)
                    .param("task_type", task.task_type.as_str())
                    .param("user_task_id", &assignment.user_task_id)
                    .param("challenge_id", &assignment.challenge_id)),
                Some(NextStep::ChallengeComplete) => Err(WowfyError::InvalidState(
                    "challenge has no further task".to_string(),
                )),
                None => Err(WowfyError::InvalidState(
                    "next task not resolved yet".to_string(),
                )),
            },
        }
    }

    pub async fn perform(
        &self,
        action: ModalAction,
        navigator: &dyn Navigator,
    ) -> WowfyResult<Route> {
        let route = self.route_for(action)?;
        info!("{:?} -> {:?}", action, route.screen);
        navigator.navigate(&route).await?;
        Ok(route)
    }
}

// ============================================================================
// Error presentation
// ============================================================================

/// User-facing rendering of an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub title: String,
    pub message: String,
    /// The task screen cannot continue
    pub blocking: bool,
}

impl Alert {
    fn new(title: &str, message: impl Into<String>, blocking: bool) -> Self {
        Self {
            title: title.to_string(),
            message: message.into(),
            blocking,
        }
    }
}

pub fn present_error(err: &WowfyError) -> Alert {
    match err {
        WowfyError::Network(_) => Alert::new(
            "Connection problem",
            "Check your internet connection and try again.",
            false,
        ),
        WowfyError::Server { message, .. } => Alert::new("Something went wrong", message.clone(), false),
        WowfyError::MalformedResponse { .. } => Alert::new(
            "Something went wrong",
            "The server sent an unexpected response.",
            false,
        ),
        WowfyError::PermissionDenied(what) => Alert::new(
            "Permission required",
            format!("Allow access to {} to continue this task.", what),
            true,
        ),
        WowfyError::InvalidTask { reason, .. } => Alert::new("Task unavailable", reason.clone(), true),
        WowfyError::NotFound(what) => Alert::new("Not found", what.clone(), false),
        WowfyError::Storage(_) => Alert::new(
            "Storage error",
            "Your session could not be saved on this device.",
            false,
        ),
        WowfyError::Config(detail) => Alert::new("Configuration error", detail.clone(), true),
        WowfyError::InvalidState(detail) => Alert::new("Please wait", detail.clone(), false),
        WowfyError::StreamClosed => Alert::new(
            "Tracking stopped",
            "Sensors stopped before the task was completed.",
            false,
        ),
    }
}
