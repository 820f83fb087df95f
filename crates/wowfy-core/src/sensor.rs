//! ============================================================================
//! Sensor Streams - Normalized readings with scoped subscriptions
//! ============================================================================
//! Device sensors (accelerometer, magnetometer, pedometer, GPS, camera) are
//! push-based. A `SensorSource` hands out a `Subscription` whose drop always
//! unsubscribes, so a controller that completes or is torn down cannot keep
//! receiving callbacks.
//!
//! `ChannelSensor` is the in-process source: the platform bridge (or the CLI)
//! pushes readings into its `SensorFeed`.
//! ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::geo::Coordinates;
use crate::types::{CaptureKind, WowfyError, WowfyResult};

/// Default per-subscription buffer
pub const DEFAULT_SENSOR_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Accelerometer,
    Magnetometer,
    Pedometer,
    Position,
    Camera,
}

/// One sample from a physical sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sensor", rename_all = "snake_case")]
pub enum SensorReading {
    /// Acceleration per axis, in g
    Accelerometer { x: f64, y: f64, z: f64 },
    /// Field strength per axis, in microtesla
    Magnetometer { x: f64, y: f64, z: f64 },
    /// Steps reported by the OS pedometer since the previous reading
    Pedometer { steps_delta: u32 },
    Position {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        accuracy_m: Option<f64>,
    },
    /// Photo or video saved by the camera
    Capture { path: PathBuf, capture: CaptureKind },
}

impl SensorReading {
    pub fn kind(&self) -> SensorKind {
        match self {
            SensorReading::Accelerometer { .. } => SensorKind::Accelerometer,
            SensorReading::Magnetometer { .. } => SensorKind::Magnetometer,
            SensorReading::Pedometer { .. } => SensorKind::Pedometer,
            SensorReading::Position { .. } => SensorKind::Position,
            SensorReading::Capture { .. } => SensorKind::Camera,
        }
    }

    /// Acceleration magnitude in g
    pub fn magnitude(&self) -> Option<f64> {
        match self {
            SensorReading::Accelerometer { x, y, z } => Some((x * x + y * y + z * z).sqrt()),
            _ => None,
        }
    }

    /// Compass heading in degrees, 0..360
    pub fn heading_deg(&self) -> Option<f64> {
        match self {
            SensorReading::Magnetometer { x, y, .. } => {
                let angle = y.atan2(*x).to_degrees();
                Some(if angle < 0.0 { angle + 360.0 } else { angle })
            }
            _ => None,
        }
    }

    /// GPS fix, if this is a valid position reading
    pub fn position(&self) -> Option<Coordinates> {
        match self {
            SensorReading::Position { latitude, longitude, .. } => {
                Coordinates::new(*latitude, *longitude)
            }
            _ => None,
        }
    }
}

/// What a subscriber receives
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    Reading(SensorReading),
    /// The OS permission was withdrawn while subscribed
    PermissionRevoked,
}

// ============================================================================
// Subscription
// ============================================================================

type CancelFn = Box<dyn FnOnce() + Send + Sync>;

/// Live stream of sensor events. Unsubscribes on `stop()` or drop.
pub struct Subscription {
    rx: mpsc::Receiver<SensorEvent>,
    cancel: Option<CancelFn>,
}

impl Subscription {
    pub fn new<F>(rx: mpsc::Receiver<SensorEvent>, cancel: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            rx,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Next event; None once stopped or the source is gone
    pub async fn next(&mut self) -> Option<SensorEvent> {
        if self.cancel.is_none() {
            return None;
        }
        self.rx.recv().await
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
            self.rx.close();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Anything that can stream sensor readings to a controller
#[async_trait]
pub trait SensorSource: Send + Sync {
    /// Subscribe to the given kinds.
    /// Fails with `PermissionDenied` when the OS permission is missing.
    async fn start(&self, kinds: &[SensorKind]) -> WowfyResult<Subscription>;
}

// ============================================================================
// ChannelSensor
// ============================================================================

struct Subscriber {
    id: u64,
    kinds: Vec<SensorKind>,
    tx: mpsc::Sender<SensorEvent>,
}

struct Shared {
    subscribers: Vec<Subscriber>,
    next_id: u64,
    permission_granted: bool,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sensor source fed from the host side
#[derive(Clone)]
pub struct ChannelSensor {
    shared: Arc<Mutex<Shared>>,
    buffer: usize,
}

/// Host-side handle that pushes readings into a `ChannelSensor`
#[derive(Clone)]
pub struct SensorFeed {
    shared: Arc<Mutex<Shared>>,
}

/// Create a connected source/feed pair
pub fn channel_sensor(buffer: usize) -> (ChannelSensor, SensorFeed) {
    let shared = Arc::new(Mutex::new(Shared {
        subscribers: Vec::new(),
        next_id: 0,
        permission_granted: true,
    }));
    (
        ChannelSensor {
            shared: Arc::clone(&shared),
            buffer: buffer.max(1),
        },
        SensorFeed { shared },
    )
}

#[async_trait]
impl SensorSource for ChannelSensor {
    async fn start(&self, kinds: &[SensorKind]) -> WowfyResult<Subscription> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = {
            let mut shared = lock(&self.shared);
            if !shared.permission_granted {
                warn!("Sensor subscription refused: permission not granted");
                return Err(WowfyError::PermissionDenied(format!(
                    "sensor access for {:?}",
                    kinds
                )));
            }
            let id = shared.next_id;
            shared.next_id += 1;
            shared.subscribers.push(Subscriber {
                id,
                kinds: kinds.to_vec(),
                tx,
            });
            id
        };

        debug!("Sensor subscription {} started for {:?}", id, kinds);

        let shared = Arc::clone(&self.shared);
        Ok(Subscription::new(rx, move || {
            lock(&shared).subscribers.retain(|s| s.id != id);
            debug!("Sensor subscription {} stopped", id);
        }))
    }
}

impl SensorFeed {
    /// Deliver a reading without waiting. Returns how many subscribers got it;
    /// readings nobody listens for, or that overflow a full buffer, are dropped.
    pub fn push(&self, reading: SensorReading) -> usize {
        let shared = lock(&self.shared);
        let kind = reading.kind();
        let mut delivered = 0;
        for sub in shared.subscribers.iter().filter(|s| s.kinds.contains(&kind)) {
            match sub.tx.try_send(SensorEvent::Reading(reading.clone())) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Dropping {:?} reading for subscription {}: {}", kind, sub.id, e),
            }
        }
        delivered
    }

    /// Deliver a reading, waiting for buffer space
    pub async fn send(&self, reading: SensorReading) -> usize {
        let kind = reading.kind();
        let targets: Vec<mpsc::Sender<SensorEvent>> = lock(&self.shared)
            .subscribers
            .iter()
            .filter(|s| s.kinds.contains(&kind))
            .map(|s| s.tx.clone())
            .collect();

        let mut delivered = 0;
        for tx in targets {
            if tx.send(SensorEvent::Reading(reading.clone())).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared).subscribers.len()
    }

    /// Grant or withdraw the OS permission. Withdrawing notifies and drops
    /// every live subscription.
    pub fn set_permission(&self, granted: bool) {
        let mut shared = lock(&self.shared);
        shared.permission_granted = granted;
        info!("Sensor permission granted: {}", granted);
        if !granted {
            for sub in shared.subscribers.drain(..) {
                let _ = sub.tx.try_send(SensorEvent::PermissionRevoked);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude_and_heading() {
        let accel = SensorReading::Accelerometer { x: 0.0, y: 0.6, z: 0.8 };
        assert!((accel.magnitude().unwrap() - 1.0).abs() < 1e-9);
        assert!(accel.heading_deg().is_none());

        let west = SensorReading::Magnetometer { x: 0.0, y: -20.0, z: 5.0 };
        assert!((west.heading_deg().unwrap() - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_reading_json_shape() {
        let reading: SensorReading = serde_json::from_str(
            r#"{"sensor":"position","latitude":18.52,"longitude":73.85}"#,
        )
        .unwrap();
        assert_eq!(reading.kind(), SensorKind::Position);
        assert!(reading.position().is_some());
    }

    #[tokio::test]
    async fn test_feed_routes_by_kind() {
        let (source, feed) = channel_sensor(8);
        let mut sub = source.start(&[SensorKind::Pedometer]).await.unwrap();

        assert_eq!(feed.push(SensorReading::Accelerometer { x: 0.0, y: 0.0, z: 1.0 }), 0);
        assert_eq!(feed.push(SensorReading::Pedometer { steps_delta: 3 }), 1);

        assert_eq!(
            sub.next().await,
            Some(SensorEvent::Reading(SensorReading::Pedometer { steps_delta: 3 }))
        );
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let (source, feed) = channel_sensor(8);
        let sub = source.start(&[SensorKind::Position]).await.unwrap();
        assert_eq!(feed.subscriber_count(), 1);

        drop(sub);
        assert_eq!(feed.subscriber_count(), 0);
        assert_eq!(
            feed.push(SensorReading::Position { latitude: 1.0, longitude: 1.0, accuracy_m: None }),
            0
        );
    }

    #[tokio::test]
    async fn test_stop_ends_stream() {
        let (source, feed) = channel_sensor(8);
        let mut sub = source.start(&[SensorKind::Pedometer]).await.unwrap();
        feed.push(SensorReading::Pedometer { steps_delta: 1 });

        sub.stop();
        assert!(!sub.is_active());
        assert_eq!(sub.next().await, None);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let (source, feed) = channel_sensor(8);
        feed.set_permission(false);

        let err = source.start(&[SensorKind::Position]).await.unwrap_err();
        assert!(matches!(err, WowfyError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_revoking_permission_notifies_subscriber() {
        let (source, feed) = channel_sensor(8);
        let mut sub = source.start(&[SensorKind::Camera]).await.unwrap();

        feed.set_permission(false);
        assert_eq!(sub.next().await, Some(SensorEvent::PermissionRevoked));
        assert_eq!(sub.next().await, None);
    }
}
