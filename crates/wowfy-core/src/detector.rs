//! ============================================================================
//! Threshold Detection - Edge-triggered completion conditions
//! ============================================================================
//! Turns a stream of progress samples into a single "condition met" edge:
//! - Step tasks: steps so far >= the task's step goal
//! - Map tasks: distance to the target <= the task's reach distance
//! - Capture tasks: a photo/video of the right kind was saved
//!
//! A detector fires at most once per task instance. Staying inside the
//! satisfied region, or leaving and re-entering it, never fires again.
//! ============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sensor::{SensorKind, SensorReading};
use crate::types::{CaptureKind, ProgressSample, Task, TaskType, WowfyError, WowfyResult};

/// Arrival radius used when a task's reach distance is unusable
pub const DEFAULT_REACH_DISTANCE_M: f64 = 100.0;

/// Accelerometer magnitude (g) that counts as one step
pub const DEFAULT_STEP_THRESHOLD_G: f64 = 1.2;

/// Parse a reach distance in meters, falling back to 100 m
pub fn parse_reach_distance(raw: Option<&str>) -> f64 {
    parse_reach_distance_or(raw, DEFAULT_REACH_DISTANCE_M)
}

/// Parse a reach distance in meters, falling back to `default_m` when the
/// value is missing, unparsable, non-finite or not positive
pub fn parse_reach_distance_or(raw: Option<&str>, default_m: f64) -> f64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(default_m)
}

// ============================================================================
// Step counting
// ============================================================================

/// Counts steps from accelerometer threshold crossings and pedometer deltas.
/// A crossing is a rise above the threshold; the counter re-arms once the
/// magnitude drops back to or below it.
#[derive(Debug, Clone)]
pub struct StepCounter {
    threshold_g: f64,
    armed: bool,
    steps: u32,
}

impl StepCounter {
    pub fn new(threshold_g: f64) -> Self {
        Self {
            threshold_g,
            armed: true,
            steps: 0,
        }
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Feed a reading; returns true if the step count changed
    pub fn observe(&mut self, reading: &SensorReading) -> bool {
        match reading {
            SensorReading::Pedometer { steps_delta } if *steps_delta > 0 => {
                self.steps = self.steps.saturating_add(*steps_delta);
                true
            }
            SensorReading::Accelerometer { .. } => {
                let magnitude = reading.magnitude().unwrap_or(0.0);
                if magnitude > self.threshold_g {
                    if self.armed {
                        self.armed = false;
                        self.steps = self.steps.saturating_add(1);
                        return true;
                    }
                } else {
                    self.armed = true;
                }
                false
            }
            _ => false,
        }
    }
}

impl Default for StepCounter {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_THRESHOLD_G)
    }
}

// ============================================================================
// Edge latch
// ============================================================================

/// Emits `true` on the first false→true transition and never again
#[derive(Debug, Clone, Default)]
pub struct ThresholdDetector {
    was_satisfied: bool,
    fired: bool,
}

impl ThresholdDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, satisfied: bool) -> bool {
        let edge = satisfied && !self.was_satisfied && !self.fired;
        self.was_satisfied = satisfied;
        if edge {
            self.fired = true;
        }
        edge
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn is_satisfied(&self) -> bool {
        self.was_satisfied
    }
}

// ============================================================================
// Goals
// ============================================================================

/// Completion condition derived from a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "goal", rename_all = "snake_case")]
pub enum Goal {
    Steps { max_steps: u32 },
    Distance { reach_m: f64 },
    Capture { capture: CaptureKind },
}

impl Goal {
    /// Derive the goal for a task
    pub fn for_task(task: &Task, default_reach_m: f64) -> WowfyResult<Self> {
        let invalid = |reason: &str| WowfyError::InvalidTask {
            task_id: task.task_id.clone(),
            reason: reason.to_string(),
        };

        match task.task_type {
            TaskType::StepCounter => task
                .step_goal()
                .map(|max_steps| Goal::Steps { max_steps })
                .ok_or_else(|| invalid("step counter task without a step goal")),
            TaskType::Map => Ok(Goal::Distance {
                reach_m: parse_reach_distance_or(task.reach_distance.as_deref(), default_reach_m),
            }),
            TaskType::MediaCapture => Ok(Goal::Capture {
                capture: CaptureKind::Photo,
            }),
            TaskType::VideoCapture => Ok(Goal::Capture {
                capture: CaptureKind::Video,
            }),
            TaskType::Quiz | TaskType::Other => {
                Err(invalid("task type has no sensor-driven completion"))
            }
        }
    }

    /// Sensors needed to track this goal
    pub fn sensor_kinds(&self) -> Vec<SensorKind> {
        match self {
            Goal::Steps { .. } => vec![SensorKind::Accelerometer, SensorKind::Pedometer],
            Goal::Distance { .. } => vec![SensorKind::Position],
            Goal::Capture { .. } => vec![SensorKind::Camera],
        }
    }

    pub fn is_met(&self, sample: &ProgressSample) -> bool {
        match (self, sample) {
            (Goal::Steps { max_steps }, ProgressSample::Steps { steps }) => steps >= max_steps,
            (Goal::Distance { reach_m }, ProgressSample::Distance { route_m, straight_m }) => {
                // route distance wins when the provider answered
                route_m.unwrap_or(*straight_m) <= *reach_m
            }
            (Goal::Capture { capture }, ProgressSample::Captured { capture: got, .. }) => {
                capture == got
            }
            _ => false,
        }
    }
}

/// A goal paired with its edge latch
#[derive(Debug, Clone)]
pub struct GoalDetector {
    goal: Goal,
    latch: ThresholdDetector,
}

impl GoalDetector {
    pub fn new(goal: Goal) -> Self {
        Self {
            goal,
            latch: ThresholdDetector::new(),
        }
    }

    pub fn goal(&self) -> &Goal {
        &self.goal
    }

    /// True exactly once: on the first sample that meets the goal
    pub fn observe(&mut self, sample: &ProgressSample) -> bool {
        let met = self.goal.is_met(sample);
        let edge = self.latch.observe(met);
        if edge {
            debug!("Goal {:?} met by {:?}", self.goal, sample);
        }
        edge
    }

    pub fn has_fired(&self) -> bool {
        self.latch.has_fired()
    }
}
