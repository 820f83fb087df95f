//! ============================================================================
//! Client Configuration
//! ============================================================================
//! Settings are read from the environment (after loading `.env`, if any):
//!
//! | variable                   | default                          |
//! |----------------------------|----------------------------------|
//! | `WOWFY_API_BASE`           | `http://localhost/wowfy/api`     |
//! | `WOWFY_HTTP_TIMEOUT_SECS`  | `30`                             |
//! | `WOWFY_PROGRESS_EVERY`     | `10`                             |
//! | `WOWFY_STEP_THRESHOLD_G`   | `1.2`                            |
//! | `WOWFY_DEFAULT_REACH_M`    | `100`                            |
//! | `WOWFY_DB_PATH`            | `~/.wowfy/session.redb`          |
//! | `DISTANCE_MATRIX_API_KEY`  | unset (haversine only)           |
//! | `DISTANCE_MATRIX_URL`      | Google distance matrix endpoint  |
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use crate::detector::{DEFAULT_REACH_DISTANCE_M, DEFAULT_STEP_THRESHOLD_G};
use crate::progress::DEFAULT_PROGRESS_EVERY;
use crate::types::{WowfyError, WowfyResult};

const DEFAULT_API_BASE: &str = "http://localhost/wowfy/api";
const DEFAULT_DISTANCE_MATRIX_URL: &str =
    "https://maps.googleapis.com/maps/api/distancematrix/json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Base URL the PHP endpoints hang off
    pub api_base: String,
    pub http_timeout_secs: u64,
    /// Progress ping cadence in steps
    pub progress_every: u32,
    /// Accelerometer magnitude (in g) that counts as a step
    pub step_threshold_g: f64,
    /// Arrival radius used when a task's reach distance is unusable
    pub default_reach_m: f64,
    pub db_path: Option<String>,
    pub distance_matrix_api_key: Option<String>,
    pub distance_matrix_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            http_timeout_secs: 30,
            progress_every: DEFAULT_PROGRESS_EVERY,
            step_threshold_g: DEFAULT_STEP_THRESHOLD_G,
            default_reach_m: DEFAULT_REACH_DISTANCE_M,
            db_path: None,
            distance_matrix_api_key: None,
            distance_matrix_url: DEFAULT_DISTANCE_MATRIX_URL.to_string(),
        }
    }
}

impl ClientConfig {
    /// Load `.env` and build the config from the process environment
    pub fn from_env() -> WowfyResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> WowfyResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            api_base: lookup("WOWFY_API_BASE").unwrap_or(defaults.api_base),
            http_timeout_secs: parse_var(&lookup, "WOWFY_HTTP_TIMEOUT_SECS")?
                .unwrap_or(defaults.http_timeout_secs),
            progress_every: parse_var(&lookup, "WOWFY_PROGRESS_EVERY")?
                .unwrap_or(defaults.progress_every),
            step_threshold_g: parse_var(&lookup, "WOWFY_STEP_THRESHOLD_G")?
                .unwrap_or(defaults.step_threshold_g),
            default_reach_m: parse_var(&lookup, "WOWFY_DEFAULT_REACH_M")?
                .unwrap_or(defaults.default_reach_m),
            db_path: lookup("WOWFY_DB_PATH"),
            distance_matrix_api_key: lookup("DISTANCE_MATRIX_API_KEY"),
            distance_matrix_url: lookup("DISTANCE_MATRIX_URL")
                .unwrap_or(defaults.distance_matrix_url),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> WowfyResult<()> {
        if self.api_base.trim().is_empty() {
            return Err(WowfyError::Config("WOWFY_API_BASE is empty".into()));
        }
        if self.progress_every == 0 {
            return Err(WowfyError::Config("WOWFY_PROGRESS_EVERY must be at least 1".into()));
        }
        if !(self.step_threshold_g.is_finite() && self.step_threshold_g > 0.0) {
            return Err(WowfyError::Config("WOWFY_STEP_THRESHOLD_G must be positive".into()));
        }
        if !(self.default_reach_m.is_finite() && self.default_reach_m > 0.0) {
            return Err(WowfyError::Config("WOWFY_DEFAULT_REACH_M must be positive".into()));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> WowfyResult<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| WowfyError::Config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(None),
    }
}
