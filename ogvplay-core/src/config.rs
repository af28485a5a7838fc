//! Playback configuration
//!
//! Loaded from an optional JSON file; every field has a default so a partial
//! file (or none at all) is fine.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::DEFAULT_STALL_THRESHOLD_MS;
use crate::ogg::DEFAULT_INTAKE_LIMIT;
use crate::reader::BUFFER_SIZE;
use crate::sync::{EffortRecovery, PacingPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkFailurePolicy {
    /// Log the failure and keep decoding
    Continue,
    /// End playback with an error
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialEffort {
    /// Start at the engine's maximum
    Max,
    Level(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub read_buffer_size: usize,
    pub intake_limit: usize,
    pub stall_threshold_ms: u64,
    /// Present every frame immediately instead of waiting for its time
    pub pacing: bool,
    pub late_tolerance_secs: f64,
    pub drop_threshold_secs: f64,
    pub late_streak_limit: u32,
    pub effort_recovery: EffortRecovery,
    pub initial_effort: InitialEffort,
    pub max_idle_sleep_ms: u64,
    pub sink_failure: SinkFailurePolicy,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: BUFFER_SIZE,
            intake_limit: DEFAULT_INTAKE_LIMIT,
            stall_threshold_ms: DEFAULT_STALL_THRESHOLD_MS,
            pacing: true,
            late_tolerance_secs: 0.05,
            drop_threshold_secs: 0.5,
            late_streak_limit: 3,
            effort_recovery: EffortRecovery::Hold,
            initial_effort: InitialEffort::Max,
            max_idle_sleep_ms: 10,
            sink_failure: SinkFailurePolicy::Continue,
        }
    }
}

impl PlaybackConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: "<inline>".into(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_buffer_size == 0 {
            return Err(ConfigError::Invalid("read_buffer_size must be non-zero".into()));
        }
        if self.intake_limit < crate::ogg::MAX_PAGE_SIZE + self.read_buffer_size {
            return Err(ConfigError::Invalid(format!(
                "intake_limit must hold at least one maximum-size page plus a read ({} bytes)",
                crate::ogg::MAX_PAGE_SIZE + self.read_buffer_size
            )));
        }
        if !(self.late_tolerance_secs >= 0.0) {
            return Err(ConfigError::Invalid("late_tolerance_secs must be >= 0".into()));
        }
        if !(self.drop_threshold_secs >= self.late_tolerance_secs) {
            return Err(ConfigError::Invalid(
                "drop_threshold_secs must be >= late_tolerance_secs".into(),
            ));
        }
        if self.late_streak_limit == 0 {
            return Err(ConfigError::Invalid("late_streak_limit must be at least 1".into()));
        }
        if let EffortRecovery::AfterOnTime { frames: 0 } = self.effort_recovery {
            return Err(ConfigError::Invalid("effort_recovery frames must be at least 1".into()));
        }
        Ok(())
    }

    pub fn pacing_policy(&self) -> PacingPolicy {
        PacingPolicy {
            enabled: self.pacing,
            late_tolerance: self.late_tolerance_secs,
            drop_threshold: self.drop_threshold_secs,
            late_streak_limit: self.late_streak_limit,
            recovery: self.effort_recovery,
        }
    }

    pub fn initial_effort(&self, max: u32) -> u32 {
        match self.initial_effort {
            InitialEffort::Max => max,
            InitialEffort::Level(level) => level.min(max),
        }
    }
}
