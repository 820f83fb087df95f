//! ============================================================================
//! Task Completion Controller - Lifecycle of one task assignment
//! ============================================================================
//! ```text
//!   Idle ──start──▶ Tracking ──goal edge──▶ Completing ──end ok──▶ Completed
//!     │                │                        │ ▲
//!     └────────────────┴──── permission ──▶ Blocked  └─┘ end failed (retry)
//! ```
//! - Sensors are unsubscribed before the end call goes out, so a late reading
//!   cannot trigger a second completion while the request is in flight.
//! - The end call is sent at most once per successful close; after Completed
//!   every `complete()` returns the recorded outcome without touching the
//!   network.
//! - A failed end call leaves the controller in Completing; calling
//!   `complete()` again retries it.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::api::{EndProgress, RouteDistance, WowfyApi};
use crate::config::ClientConfig;
use crate::detector::{Goal, GoalDetector, StepCounter};
use crate::geo::{haversine_m, Coordinates};
use crate::progress::{ProgressCadence, ProgressReporter};
use crate::sensor::{SensorEvent, SensorReading, SensorSource, Subscription};
use crate::types::{ProgressSample, Task, TaskAssignment, WowfyError, WowfyResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ControllerState {
    Idle,
    Tracking,
    Completing,
    Completed,
    Blocked(String),
}

impl ControllerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ControllerState::Completed)
    }
}

/// What a finished task reports back to the flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub assignment: TaskAssignment,
    pub final_sample: ProgressSample,
}

/// The task being run and the assignment it reports against
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task: Task,
    pub assignment: TaskAssignment,
}

pub struct TaskCompletionController {
    ctx: TaskContext,
    api: Arc<dyn WowfyApi>,
    route: Option<Arc<dyn RouteDistance>>,
    reporter: ProgressReporter,
    detector: GoalDetector,
    steps: StepCounter,
    step_threshold_g: f64,
    target: Option<Coordinates>,
    state: ControllerState,
    subscription: Option<Subscription>,
    last_sample: Option<ProgressSample>,
    outcome: Option<CompletionOutcome>,
}

impl TaskCompletionController {
    /// Build a controller for a task. Fails for task types without a
    /// sensor-driven completion, or map tasks without a target.
    pub fn new(ctx: TaskContext, api: Arc<dyn WowfyApi>, config: &ClientConfig) -> WowfyResult<Self> {
        let goal = Goal::for_task(&ctx.task, config.default_reach_m)?;
        let target = ctx.task.target();
        if matches!(goal, Goal::Distance { .. }) && target.is_none() {
            return Err(WowfyError::InvalidTask {
                task_id: ctx.task.task_id.clone(),
                reason: "map task without target coordinates".to_string(),
            });
        }

        debug!(
            "Controller for task {} (assignment {}): {:?}",
            ctx.task.task_id, ctx.assignment.user_task_id, goal
        );

        Ok(Self {
            reporter: ProgressReporter::new(
                Arc::clone(&api),
                ProgressCadence::new(config.progress_every),
            ),
            ctx,
            api,
            route: None,
            detector: GoalDetector::new(goal),
            steps: StepCounter::new(config.step_threshold_g),
            step_threshold_g: config.step_threshold_g,
            target,
            state: ControllerState::Idle,
            subscription: None,
            last_sample: None,
            outcome: None,
        })
    }

    /// Measure map tasks along the driving route instead of straight-line
    pub fn with_route_distance(mut self, route: Arc<dyn RouteDistance>) -> Self {
        self.route = Some(route);
        self
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    pub fn goal(&self) -> &Goal {
        self.detector.goal()
    }

    pub fn last_sample(&self) -> Option<&ProgressSample> {
        self.last_sample.as_ref()
    }

    pub fn outcome(&self) -> Option<&CompletionOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .as_ref()
            .map(Subscription::is_active)
            .unwrap_or(false)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Idle -> Tracking, from zero progress. A permission refusal moves to
    /// Blocked and is returned.
    pub async fn start(&mut self, source: &dyn SensorSource) -> WowfyResult<()> {
        if self.state != ControllerState::Idle {
            return Err(WowfyError::InvalidState(format!(
                "cannot start tracking from {:?}",
                self.state
            )));
        }

        let kinds = self.detector.goal().sensor_kinds();
        match source.start(&kinds).await {
            Ok(subscription) => {
                self.reset_progress();
                self.subscription = Some(subscription);
                self.state = ControllerState::Tracking;
                info!(
                    "Tracking task {} ({})",
                    self.ctx.task.task_id, self.ctx.task.task_type
                );
                Ok(())
            }
            Err(WowfyError::PermissionDenied(reason)) => {
                self.block(reason.clone());
                Err(WowfyError::PermissionDenied(reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Any state but Completed -> Blocked
    pub fn block(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.state.is_terminal() {
            debug!(
                "Task {} already completed, not blocking: {}",
                self.ctx.task.task_id, reason
            );
            return;
        }
        warn!("Task {} blocked: {}", self.ctx.task.task_id, reason);
        self.release_sensors();
        self.state = ControllerState::Blocked(reason);
    }

    /// Unsubscribe sensors (screen teardown). Tracking falls back to Idle.
    pub fn stop(&mut self) {
        self.release_sensors();
        if self.state == ControllerState::Tracking {
            self.state = ControllerState::Idle;
        }
    }

    /// Re-entering a task never resumes partial progress
    fn reset_progress(&mut self) {
        let goal = self.detector.goal().clone();
        self.detector = GoalDetector::new(goal);
        self.steps = StepCounter::new(self.step_threshold_g);
        self.last_sample = None;
    }

    fn release_sensors(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.stop();
        }
    }

    /// Start, then pump sensor events until the task completes
    pub async fn run(&mut self, source: &dyn SensorSource) -> WowfyResult<CompletionOutcome> {
        self.start(source).await?;

        loop {
            let event = match self.subscription.as_mut() {
                Some(subscription) => subscription.next().await,
                None => None,
            };

            match event {
                Some(SensorEvent::Reading(reading)) => {
                    if let Some(outcome) = self.on_reading(reading).await? {
                        return Ok(outcome);
                    }
                }
                Some(SensorEvent::PermissionRevoked) => {
                    self.block("sensor permission revoked");
                    return Err(WowfyError::PermissionDenied(
                        "sensor permission revoked".to_string(),
                    ));
                }
                None => {
                    debug!("Sensor stream for task {} ended", self.ctx.task.task_id);
                    self.stop();
                    return Err(WowfyError::StreamClosed);
                }
            }
        }
    }

    // ========================================================================
    // Readings
    // ========================================================================

    /// Feed one reading. Returns the outcome if this reading completed the task.
    /// Readings outside Tracking are ignored.
    pub async fn on_reading(
        &mut self,
        reading: SensorReading,
    ) -> WowfyResult<Option<CompletionOutcome>> {
        if self.state != ControllerState::Tracking {
            debug!("Ignoring {:?} reading in {:?}", reading.kind(), self.state);
            return Ok(None);
        }

        let (sample, crossed) = match self.detector.goal().clone() {
            Goal::Steps { .. } => {
                let previous = self.steps.steps();
                if !self.steps.observe(&reading) {
                    return Ok(None);
                }
                let current = self.steps.steps();
                let sample = ProgressSample::Steps { steps: current };
                let crossed = self.detector.observe(&sample);
                // the end call carries the final count
                if !crossed {
                    self.reporter
                        .observe(&self.ctx.assignment, previous, current);
                }
                (sample, crossed)
            }
            Goal::Distance { .. } => {
                let Some(position) = reading.position() else {
                    return Ok(None);
                };
                let Some(sample) = self.measure_distance(position).await else {
                    return Ok(None);
                };
                let crossed = self.detector.observe(&sample);
                (sample, crossed)
            }
            Goal::Capture { .. } => {
                let SensorReading::Capture { path, capture } = reading else {
                    return Ok(None);
                };
                let sample = ProgressSample::Captured { path, capture };
                let crossed = self.detector.observe(&sample);
                (sample, crossed)
            }
        };

        self.last_sample = Some(sample);
        if !crossed {
            return Ok(None);
        }

        info!("Task {} goal reached", self.ctx.task.task_id);
        self.release_sensors();
        self.state = ControllerState::Completing;
        self.complete().await.map(Some)
    }

    async fn measure_distance(&self, position: Coordinates) -> Option<ProgressSample> {
        let target = self.target?;
        let straight_m = haversine_m(position, target);

        let route_m = match &self.route {
            Some(route) => match route.route_distance_m(position, target).await {
                Ok(meters) => Some(meters),
                Err(e) => {
                    // no trigger without a route answer
                    warn!(
                        "Route distance for task {} unavailable: {}",
                        self.ctx.task.task_id, e
                    );
                    return None;
                }
            },
            None => None,
        };

        debug!(
            "Task {}: straight {:.0} m, route {:?}",
            self.ctx.task.task_id, straight_m, route_m
        );
        Some(ProgressSample::Distance {
            route_m,
            straight_m,
        })
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Close the assignment. Sends the end call from Completing; returns the
    /// recorded outcome once Completed.
    pub async fn complete(&mut self) -> WowfyResult<CompletionOutcome> {
        match &self.state {
            ControllerState::Completed => {
                return self.outcome.clone().ok_or_else(|| {
                    WowfyError::InvalidState("completed without an outcome".to_string())
                });
            }
            ControllerState::Completing => {}
            other => {
                return Err(WowfyError::InvalidState(format!(
                    "cannot complete from {:?}",
                    other
                )));
            }
        }

        let sample = self.last_sample.clone().ok_or_else(|| {
            WowfyError::InvalidState("no progress recorded before completion".to_string())
        })?;
        let report = EndProgress::from_sample(self.ctx.assignment.clone(), &sample);

        match self.api.end_progress(&report).await {
            Ok(()) => {
                let outcome = CompletionOutcome {
                    assignment: self.ctx.assignment.clone(),
                    final_sample: sample,
                };
                self.outcome = Some(outcome.clone());
                self.state = ControllerState::Completed;
                info!(
                    "Task {} completed (assignment {})",
                    self.ctx.task.task_id, self.ctx.assignment.user_task_id
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(
                    "Closing assignment {} failed: {}",
                    self.ctx.assignment.user_task_id, e
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{channel_sensor, SensorKind};
    use crate::testing::{task, MockApi, ScriptedRoute};
    use crate::types::CaptureKind;
    use serde_json::json;
    use std::path::PathBuf;

    fn step_task(max_steps: u32) -> TaskContext {
        TaskContext {
            task: task(json!({
                "task_id": "12",
                "task_name": "50 steps",
                "task_type": "stepCounter",
                "max_steps": max_steps.to_string(),
                "challenge_id": "3"
            })),
            assignment: MockApi::assignment("501"),
        }
    }

    fn map_task(reach: Option<&str>) -> TaskContext {
        TaskContext {
            task: task(json!({
                "task_id": "12",
                "task_type": "map",
                "latitude": "0.0",
                "longitude": "0.0",
                "reach_distance": reach,
                "challenge_id": "3"
            })),
            assignment: MockApi::assignment("501"),
        }
    }

    /// A fix `meters` north of the equator/meridian origin
    fn north_of_origin(meters: f64) -> SensorReading {
        SensorReading::Position {
            latitude: meters / 111_194.93,
            longitude: 0.0,
            accuracy_m: Some(5.0),
        }
    }

    fn stride() -> [SensorReading; 2] {
        [
            SensorReading::Accelerometer { x: 0.0, y: 0.3, z: 1.5 },
            SensorReading::Accelerometer { x: 0.0, y: 0.0, z: 1.0 },
        ]
    }

    fn controller(ctx: TaskContext, api: &Arc<MockApi>) -> TaskCompletionController {
        let api: Arc<dyn WowfyApi> = api.clone();
        TaskCompletionController::new(ctx, api, &ClientConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_fifty_steps_single_end_call() {
        let api = Arc::new(MockApi::new());
        let (source, feed) = channel_sensor(512);
        let mut ctrl = controller(step_task(50), &api);

        for _ in 0..60 {
            for reading in stride() {
                feed.push(reading);
            }
        }

        let outcome = ctrl.run(&source).await.unwrap();
        assert_eq!(outcome.final_sample, ProgressSample::Steps { steps: 50 });
        assert_eq!(ctrl.state(), &ControllerState::Completed);
        assert!(!ctrl.is_subscribed());
        assert_eq!(feed.subscriber_count(), 0);

        let ends = api.end_calls().await;
        assert_eq!(ends.len(), 1);
        assert_eq!(ends[0].steps, Some(50));
        assert_eq!(ends[0].assignment.user_task_id, "501");
    }

    #[tokio::test]
    async fn test_progress_pings_every_ten_steps() {
        let api = Arc::new(MockApi::new());
        let (source, _feed) = channel_sensor(8);
        let mut ctrl = controller(step_task(25), &api);
        ctrl.start(&source).await.unwrap();

        for _ in 0..25 {
            for reading in stride() {
                ctrl.on_reading(reading).await.unwrap();
            }
        }
        // let the spawned pings land
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let mut pings = api.progress_calls().await;
        pings.sort();
        assert_eq!(pings, vec![("501".to_string(), 10), ("501".to_string(), 20)]);
        assert_eq!(api.end_calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_completion_sample_skips_progress_ping() {
        let api = Arc::new(MockApi::new());
        let (source, _feed) = channel_sensor(8);
        let mut ctrl = controller(step_task(10), &api);
        ctrl.start(&source).await.unwrap();

        ctrl.on_reading(SensorReading::Pedometer { steps_delta: 10 })
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(api.progress_calls().await.is_empty());
        assert_eq!(api.end_calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_geofence_completes_once() {
        let api = Arc::new(MockApi::new());
        let (source, _feed) = channel_sensor(8);
        let mut ctrl = controller(map_task(Some("100")), &api);
        ctrl.start(&source).await.unwrap();

        assert!(ctrl.on_reading(north_of_origin(1000.0)).await.unwrap().is_none());
        assert!(ctrl.on_reading(north_of_origin(400.0)).await.unwrap().is_none());
        let outcome = ctrl.on_reading(north_of_origin(80.0)).await.unwrap().unwrap();
        match outcome.final_sample {
            ProgressSample::Distance { straight_m, route_m } => {
                assert!(route_m.is_none());
                assert!((straight_m - 80.0).abs() < 1.0);
            }
            other => panic!("unexpected sample {:?}", other),
        }

        // still inside the radius, and re-entering it
        assert!(ctrl.on_reading(north_of_origin(50.0)).await.unwrap().is_none());
        assert!(ctrl.on_reading(north_of_origin(300.0)).await.unwrap().is_none());
        assert!(ctrl.on_reading(north_of_origin(20.0)).await.unwrap().is_none());

        assert_eq!(api.end_calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unparsable_reach_defaults_to_100m() {
        let api = Arc::new(MockApi::new());
        let ctrl = controller(map_task(Some("by the fountain")), &api);
        assert_eq!(ctrl.goal(), &Goal::Distance { reach_m: 100.0 });

        let ctrl = controller(map_task(None), &api);
        assert_eq!(ctrl.goal(), &Goal::Distance { reach_m: 100.0 });
    }

    #[tokio::test]
    async fn test_route_distance_drives_completion() {
        let api = Arc::new(MockApi::new());
        let route = Arc::new(ScriptedRoute::new(vec![
            Ok(900.0),
            Err(WowfyError::Network("timeout".into())),
            Ok(70.0),
        ]));
        let (source, _feed) = channel_sensor(8);
        let mut ctrl = controller(map_task(Some("100")), &api).with_route_distance(route);
        ctrl.start(&source).await.unwrap();

        // straight-line already inside the radius, but the route is long
        assert!(ctrl.on_reading(north_of_origin(60.0)).await.unwrap().is_none());
        // route lookup fails: nothing fires
        assert!(ctrl.on_reading(north_of_origin(60.0)).await.unwrap().is_none());
        assert_eq!(ctrl.state(), &ControllerState::Tracking);

        let outcome = ctrl.on_reading(north_of_origin(60.0)).await.unwrap().unwrap();
        assert!(matches!(
            outcome.final_sample,
            ProgressSample::Distance { route_m: Some(r), .. } if r == 70.0
        ));
        assert_eq!(api.end_calls().await[0].distance_m, Some(70.0));
    }

    #[tokio::test]
    async fn test_failed_end_call_stays_completing_and_retries() {
        let api = Arc::new(MockApi::new());
        api.fail_end_times(1).await;
        let (source, feed) = channel_sensor(8);
        let mut ctrl = controller(step_task(5), &api);
        ctrl.start(&source).await.unwrap();

        let err = ctrl
            .on_reading(SensorReading::Pedometer { steps_delta: 5 })
            .await
            .unwrap_err();
        assert!(matches!(err, WowfyError::Network(_)));
        assert_eq!(ctrl.state(), &ControllerState::Completing);
        // sensors were released before the call went out
        assert_eq!(feed.subscriber_count(), 0);

        // more readings cannot re-trigger
        assert!(ctrl
            .on_reading(SensorReading::Pedometer { steps_delta: 5 })
            .await
            .unwrap()
            .is_none());

        let outcome = ctrl.complete().await.unwrap();
        assert_eq!(outcome.final_sample, ProgressSample::Steps { steps: 5 });
        assert_eq!(ctrl.state(), &ControllerState::Completed);
        assert_eq!(api.end_calls().await.len(), 2);

        // completed: no more network calls
        ctrl.complete().await.unwrap();
        assert_eq!(api.end_calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_complete_before_goal_is_rejected() {
        let api = Arc::new(MockApi::new());
        let mut ctrl = controller(step_task(5), &api);
        assert!(matches!(
            ctrl.complete().await,
            Err(WowfyError::InvalidState(_))
        ));
        assert!(api.end_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_permission_denied_blocks() {
        let api = Arc::new(MockApi::new());
        let (source, feed) = channel_sensor(8);
        feed.set_permission(false);
        let mut ctrl = controller(map_task(None), &api);

        let err = ctrl.run(&source).await.unwrap_err();
        assert!(matches!(err, WowfyError::PermissionDenied(_)));
        assert!(matches!(ctrl.state(), ControllerState::Blocked(_)));
    }

    #[tokio::test]
    async fn test_permission_revoked_mid_task() {
        let api = Arc::new(MockApi::new());
        let (source, feed) = channel_sensor(8);
        let mut ctrl = controller(map_task(None), &api);

        let handle = {
            let feed = feed.clone();
            tokio::spawn(async move {
                while feed.subscriber_count() == 0 {
                    tokio::task::yield_now().await;
                }
                feed.send(north_of_origin(5000.0)).await;
                feed.set_permission(false);
            })
        };

        let err = ctrl.run(&source).await.unwrap_err();
        handle.await.unwrap();
        assert!(matches!(err, WowfyError::PermissionDenied(_)));
        assert!(matches!(ctrl.state(), ControllerState::Blocked(_)));
        assert!(api.end_calls().await.is_empty());
    }

    /// Source that replays a fixed list of readings, then hangs up
    struct FiniteSource(Vec<SensorReading>);

    #[async_trait::async_trait]
    impl SensorSource for FiniteSource {
        async fn start(&self, _kinds: &[SensorKind]) -> WowfyResult<Subscription> {
            let (tx, rx) = tokio::sync::mpsc::channel(16);
            for reading in &self.0 {
                tx.try_send(SensorEvent::Reading(reading.clone())).unwrap();
            }
            Ok(Subscription::new(rx, || {}))
        }
    }

    #[tokio::test]
    async fn test_stream_closed_before_goal() {
        let api = Arc::new(MockApi::new());
        let source = FiniteSource(vec![
            SensorReading::Pedometer { steps_delta: 4 },
            SensorReading::Pedometer { steps_delta: 3 },
        ]);
        let mut ctrl = controller(step_task(50), &api);

        let err = ctrl.run(&source).await.unwrap_err();
        assert_eq!(err, WowfyError::StreamClosed);
        assert_eq!(ctrl.state(), &ControllerState::Idle);
        assert_eq!(ctrl.last_sample(), Some(&ProgressSample::Steps { steps: 7 }));
        assert!(api.end_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_restart_discards_partial_progress() {
        let api = Arc::new(MockApi::new());
        let (source, _feed) = channel_sensor(8);
        let mut ctrl = controller(step_task(10), &api);

        ctrl.start(&source).await.unwrap();
        assert!(ctrl
            .on_reading(SensorReading::Pedometer { steps_delta: 7 })
            .await
            .unwrap()
            .is_none());
        ctrl.stop();
        // progress stays visible until the screen is entered again
        assert_eq!(ctrl.last_sample(), Some(&ProgressSample::Steps { steps: 7 }));

        ctrl.start(&source).await.unwrap();
        assert!(ctrl.last_sample().is_none());
        assert!(ctrl
            .on_reading(SensorReading::Pedometer { steps_delta: 3 })
            .await
            .unwrap()
            .is_none());
        assert_eq!(ctrl.last_sample(), Some(&ProgressSample::Steps { steps: 3 }));
        assert_eq!(ctrl.state(), &ControllerState::Tracking);
        assert!(api.end_calls().await.is_empty());

        let outcome = ctrl
            .on_reading(SensorReading::Pedometer { steps_delta: 7 })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.final_sample, ProgressSample::Steps { steps: 10 });
        assert_eq!(api.end_calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_completed_task_cannot_be_blocked() {
        let api = Arc::new(MockApi::new());
        let (source, _feed) = channel_sensor(8);
        let mut ctrl = controller(step_task(1), &api);
        ctrl.start(&source).await.unwrap();

        let outcome = ctrl
            .on_reading(SensorReading::Pedometer { steps_delta: 1 })
            .await
            .unwrap()
            .unwrap();

        ctrl.block("location permission denied");
        assert_eq!(ctrl.state(), &ControllerState::Completed);
        assert_eq!(ctrl.complete().await.unwrap(), outcome);
        assert_eq!(api.end_calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_releases_sensors() {
        let api = Arc::new(MockApi::new());
        let (source, feed) = channel_sensor(8);
        let mut ctrl = controller(step_task(50), &api);

        ctrl.start(&source).await.unwrap();
        assert_eq!(feed.subscriber_count(), 1);

        ctrl.stop();
        assert_eq!(ctrl.state(), &ControllerState::Idle);
        assert!(!ctrl.is_subscribed());
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_capture_task_completes_with_media() {
        let api = Arc::new(MockApi::new());
        let (source, feed) = channel_sensor(8);
        let ctx = TaskContext {
            task: task(json!({ "task_id": "14", "task_type": "videoCapture" })),
            assignment: MockApi::assignment("503"),
        };
        let mut ctrl = controller(ctx, &api);
        ctrl.start(&source).await.unwrap();

        assert_eq!(
            feed.push(SensorReading::Pedometer { steps_delta: 1 }),
            0,
            "capture tasks subscribe to the camera only"
        );
        assert!(ctrl
            .on_reading(SensorReading::Capture {
                path: PathBuf::from("/sdcard/a.jpg"),
                capture: CaptureKind::Photo,
            })
            .await
            .unwrap()
            .is_none());

        ctrl.on_reading(SensorReading::Capture {
            path: PathBuf::from("/sdcard/a.mp4"),
            capture: CaptureKind::Video,
        })
        .await
        .unwrap()
        .unwrap();

        let ends = api.end_calls().await;
        assert_eq!(ends.len(), 1);
        assert_eq!(
            ends[0].media.as_ref().map(|m| m.path.clone()),
            Some(PathBuf::from("/sdcard/a.mp4"))
        );
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid() {
        let api = Arc::new(MockApi::new());
        let (source, _feed) = channel_sensor(8);
        let mut ctrl = controller(step_task(5), &api);
        ctrl.start(&source).await.unwrap();
        assert!(matches!(
            ctrl.start(&source).await,
            Err(WowfyError::InvalidState(_))
        ));
    }

    #[test]
    fn test_map_task_needs_target() {
        let api: Arc<dyn WowfyApi> = Arc::new(MockApi::new());
        let ctx = TaskContext {
            task: task(json!({ "task_id": "12", "task_type": "map" })),
            assignment: MockApi::assignment("501"),
        };
        assert!(matches!(
            TaskCompletionController::new(ctx, api, &ClientConfig::default()),
            Err(WowfyError::InvalidTask { .. })
        ));
    }

    #[test]
    fn test_goal_sensor_kinds() {
        let api = Arc::new(MockApi::new());
        let ctrl = controller(step_task(5), &api);
        assert_eq!(
            ctrl.goal().sensor_kinds(),
            vec![SensorKind::Accelerometer, SensorKind::Pedometer]
        );
    }
}
