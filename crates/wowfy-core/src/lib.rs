//! ============================================================================
//! WOWFY-CORE: Task progression for Wowfy challenges
//! ============================================================================
//! This crate handles the lifecycle of a single task assignment:
//! - Sensor streams (steps, location, captures) feeding goal detection
//! - Completion controller with at-most-once end reporting
//! - Periodic progress pings and next-task resolution
//! - Navigation views and the local user session cache
//! ============================================================================

pub mod api;
pub mod config;
pub mod controller;
pub mod detector;
pub mod geo;
pub mod presenter;
pub mod progress;
pub mod resolver;
pub mod sensor;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use types::*;
pub use api::{DistanceMatrixClient, EndProgress, HttpWowfyApi, RouteDistance, WowfyApi};
pub use config::ClientConfig;
pub use controller::{CompletionOutcome, ControllerState, TaskCompletionController, TaskContext};
pub use presenter::{present_error, Alert, ModalAction, NavigationPresenter, Navigator, Route, View};
pub use resolver::{NextStep, NextTaskResolver};
pub use sensor::{
    channel_sensor, SensorEvent, SensorFeed, SensorKind, SensorReading, SensorSource, Subscription,
};
pub use session::SessionStore;
