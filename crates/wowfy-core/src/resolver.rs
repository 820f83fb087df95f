//! ============================================================================
//! Next Task Resolver - What follows a completed task
//! ============================================================================
//! After a task closes, the backend is asked whether the challenge has a
//! following task. If it does, an assignment is created for it and the screen
//! that runs its task type is picked; otherwise the challenge is complete.
//!
//! Resolutions are memoized per (completed task, challenge), so re-running
//! the completion handler never creates a second assignment for the same
//! predecessor. Failures are not memoized.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::api::WowfyApi;
use crate::types::{Screen, Task, TaskAssignment, WowfyResult};

/// Where the flow goes after a task completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "next", rename_all = "snake_case")]
pub enum NextStep {
    Task {
        task: Task,
        assignment: TaskAssignment,
        screen: Screen,
    },
    ChallengeComplete,
}

impl NextStep {
    pub fn is_challenge_complete(&self) -> bool {
        matches!(self, NextStep::ChallengeComplete)
    }
}

type Slot = Arc<Mutex<Option<NextStep>>>;

pub struct NextTaskResolver {
    api: Arc<dyn WowfyApi>,
    /// (completed task id, challenge id) -> resolution, one lock per key
    slots: Mutex<HashMap<(String, String), Slot>>,
}

impl NextTaskResolver {
    pub fn new(api: Arc<dyn WowfyApi>) -> Self {
        Self {
            api,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the step after `completed_task_id` in `challenge_id`
    pub async fn resolve(
        &self,
        user_id: &str,
        completed_task_id: &str,
        challenge_id: &str,
    ) -> WowfyResult<NextStep> {
        let key = (completed_task_id.to_string(), challenge_id.to_string());
        let slot = Arc::clone(self.slots.lock().await.entry(key).or_default());

        // held across the lookups: concurrent resolves of one predecessor
        // must not both create an assignment
        let mut resolved = slot.lock().await;
        if let Some(step) = resolved.as_ref() {
            debug!("Next step after task {} already resolved", completed_task_id);
            return Ok(step.clone());
        }

        let step = self
            .lookup(user_id, completed_task_id, challenge_id)
            .await
            .inspect_err(|e| {
                error!(
                    "Resolving the task after {} in challenge {} failed: {}",
                    completed_task_id, challenge_id, e
                )
            })?;

        *resolved = Some(step.clone());
        Ok(step)
    }

    async fn lookup(
        &self,
        user_id: &str,
        completed_task_id: &str,
        challenge_id: &str,
    ) -> WowfyResult<NextStep> {
        let Some(task) = self
            .api
            .check_next_task_exist(completed_task_id, challenge_id)
            .await?
        else {
            info!("Challenge {} complete after task {}", challenge_id, completed_task_id);
            return Ok(NextStep::ChallengeComplete);
        };

        let assignment = self
            .api
            .create_user_task(user_id, &task, challenge_id)
            .await?;
        let screen = Screen::for_task_type(task.task_type);

        info!(
            "Next task {} ({}) -> {:?}, assignment {}",
            task.task_id, task.task_type, screen, assignment.user_task_id
        );

        Ok(NextStep::Task {
            task,
            assignment,
            screen,
        })
    }

    /// Drop the memoized resolution for a predecessor
    pub async fn forget(&self, completed_task_id: &str, challenge_id: &str) -> bool {
        let slot = self
            .slots
            .lock()
            .await
            .remove(&(completed_task_id.to_string(), challenge_id.to_string()));
        match slot {
            Some(slot) => slot.lock().await.take().is_some(),
            None => false,
        }
    }
}
