//! ============================================================================
//! Progress Reporting - Periodic step pings
//! ============================================================================
//! While a step task is tracking, the current count is sent to the backend
//! every N steps (default 10). Pings are fire-and-forget: a failed ping is
//! logged and lost. Counts that jump over a multiple in one update send
//! nothing (9 -> 11 skips the ping for 10).
//!
//! The closing "end progress" call is owned by the completion controller.
//! ============================================================================

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::WowfyApi;
use crate::types::TaskAssignment;

/// Steps between progress pings
pub const DEFAULT_PROGRESS_EVERY: u32 = 10;

/// Decides which step counts get reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressCadence {
    every: u32,
}

impl ProgressCadence {
    pub fn new(every: u32) -> Self {
        Self {
            every: every.max(1),
        }
    }

    pub fn every(&self) -> u32 {
        self.every
    }

    /// True iff the count moved to a positive exact multiple of the cadence
    pub fn should_report(&self, previous: u32, current: u32) -> bool {
        current != previous && current > 0 && current % self.every == 0
    }
}

impl Default for ProgressCadence {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_EVERY)
    }
}

/// Sends progress pings in the background
#[derive(Clone)]
pub struct ProgressReporter {
    api: Arc<dyn WowfyApi>,
    cadence: ProgressCadence,
}

impl ProgressReporter {
    pub fn new(api: Arc<dyn WowfyApi>, cadence: ProgressCadence) -> Self {
        Self { api, cadence }
    }

    pub fn cadence(&self) -> ProgressCadence {
        self.cadence
    }

    /// Report `current` if the cadence calls for it. Returns the handle of the
    /// spawned ping, or None when nothing was sent.
    pub fn observe(
        &self,
        assignment: &TaskAssignment,
        previous: u32,
        current: u32,
    ) -> Option<JoinHandle<()>> {
        if !self.cadence.should_report(previous, current) {
            return None;
        }
        Some(self.report(assignment.clone(), current))
    }

    /// Unconditionally send a ping in the background
    pub fn report(&self, assignment: TaskAssignment, steps: u32) -> JoinHandle<()> {
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            match api.report_progress(&assignment, steps).await {
                Ok(()) => debug!("Progress ping {} for {}", steps, assignment.user_task_id),
                Err(e) => warn!(
                    "Progress ping {} for {} lost: {}",
                    steps, assignment.user_task_id, e
                ),
            }
        })
    }
}
