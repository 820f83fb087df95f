//! In-memory doubles for the backend, route provider and navigator.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use crate::api::{EndProgress, RouteDistance, WowfyApi};
use crate::geo::Coordinates;
use crate::presenter::{Navigator, Route};
use crate::types::{Task, TaskAssignment, WowfyError, WowfyResult};

#[derive(Default)]
struct ApiState {
    progress: Vec<(String, u32)>,
    ends: Vec<EndProgress>,
    checks: Vec<(String, String)>,
    creates: Vec<(String, String, String)>,
    fail_progress: bool,
    end_failures_remaining: u32,
    fail_check: bool,
    create_failures_remaining: u32,
    next_tasks: HashMap<String, Task>,
    held_checks: HashMap<String, Arc<Notify>>,
    created: u32,
}

/// Records every call; failures are scripted per endpoint
#[derive(Default)]
pub struct MockApi {
    state: Mutex<ApiState>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assignment(user_task_id: &str) -> TaskAssignment {
        TaskAssignment {
            user_task_id: user_task_id.to_string(),
            task_id: "12".to_string(),
            challenge_id: "3".to_string(),
            user_id: "42".to_string(),
        }
    }

    pub async fn fail_progress(&self, fail: bool) {
        self.state.lock().await.fail_progress = fail;
    }

    pub async fn fail_end_times(&self, times: u32) {
        self.state.lock().await.end_failures_remaining = times;
    }

    pub async fn fail_check(&self, fail: bool) {
        self.state.lock().await.fail_check = fail;
    }

    pub async fn fail_create_times(&self, times: u32) {
        self.state.lock().await.create_failures_remaining = times;
    }

    pub async fn set_next_task(&self, after_task_id: &str, task: Task) {
        self.state
            .lock()
            .await
            .next_tasks
            .insert(after_task_id.to_string(), task);
    }

    /// Park next-task lookups for `task_id` until the returned handle is notified
    pub async fn hold_check(&self, task_id: &str) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        self.state
            .lock()
            .await
            .held_checks
            .insert(task_id.to_string(), Arc::clone(&release));
        release
    }

    pub async fn progress_calls(&self) -> Vec<(String, u32)> {
        self.state.lock().await.progress.clone()
    }

    pub async fn end_calls(&self) -> Vec<EndProgress> {
        self.state.lock().await.ends.clone()
    }

    pub async fn check_calls(&self) -> Vec<(String, String)> {
        self.state.lock().await.checks.clone()
    }

    pub async fn create_calls(&self) -> Vec<(String, String, String)> {
        self.state.lock().await.creates.clone()
    }
}

#[async_trait]
impl WowfyApi for MockApi {
    async fn report_progress(&self, assignment: &TaskAssignment, steps: u32) -> WowfyResult<()> {
        let mut state = self.state.lock().await;
        state.progress.push((assignment.user_task_id.clone(), steps));
        if state.fail_progress {
            return Err(WowfyError::Network("progress endpoint down".into()));
        }
        Ok(())
    }

    async fn end_progress(&self, report: &EndProgress) -> WowfyResult<()> {
        let mut state = self.state.lock().await;
        state.ends.push(report.clone());
        if state.end_failures_remaining > 0 {
            state.end_failures_remaining -= 1;
            return Err(WowfyError::Network("end endpoint down".into()));
        }
        Ok(())
    }

    async fn check_next_task_exist(
        &self,
        task_id: &str,
        challenge_id: &str,
    ) -> WowfyResult<Option<Task>> {
        let held = {
            let mut state = self.state.lock().await;
            state
                .checks
                .push((task_id.to_string(), challenge_id.to_string()));
            state.held_checks.get(task_id).cloned()
        };
        if let Some(release) = held {
            release.notified().await;
        }

        let state = self.state.lock().await;
        if state.fail_check {
            return Err(WowfyError::Network("check endpoint down".into()));
        }
        Ok(state.next_tasks.get(task_id).cloned())
    }

    async fn create_user_task(
        &self,
        user_id: &str,
        task: &Task,
        challenge_id: &str,
    ) -> WowfyResult<TaskAssignment> {
        let mut state = self.state.lock().await;
        state.creates.push((
            user_id.to_string(),
            task.task_id.clone(),
            challenge_id.to_string(),
        ));
        if state.create_failures_remaining > 0 {
            state.create_failures_remaining -= 1;
            return Err(WowfyError::Server {
                endpoint: "createUserTasks.php".into(),
                message: "insert failed".into(),
            });
        }
        state.created += 1;
        Ok(TaskAssignment {
            user_task_id: format!("ut-{}", state.created),
            task_id: task.task_id.clone(),
            challenge_id: challenge_id.to_string(),
            user_id: user_id.to_string(),
        })
    }
}

/// Route provider answering from a fixed script, in order
pub struct ScriptedRoute {
    answers: Mutex<Vec<WowfyResult<f64>>>,
}

impl ScriptedRoute {
    pub fn new(answers: Vec<WowfyResult<f64>>) -> Self {
        let mut answers = answers;
        answers.reverse();
        Self {
            answers: Mutex::new(answers),
        }
    }
}

#[async_trait]
impl RouteDistance for ScriptedRoute {
    async fn route_distance_m(&self, _: Coordinates, _: Coordinates) -> WowfyResult<f64> {
        self.answers
            .lock()
            .await
            .pop()
            .unwrap_or_else(|| Err(WowfyError::Network("script exhausted".into())))
    }
}

/// Navigator that remembers every route it was asked to open
#[derive(Default)]
pub struct RecordingNavigator {
    pub routes: Mutex<Vec<Route>>,
}

#[async_trait]
impl Navigator for RecordingNavigator {
    async fn navigate(&self, route: &Route) -> WowfyResult<()> {
        self.routes.lock().await.push(route.clone());
        Ok(())
    }
}

pub fn task(value: serde_json::Value) -> Task {
    serde_json::from_value(value).expect("test task json")
}
