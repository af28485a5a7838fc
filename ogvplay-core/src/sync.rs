//! Frame Pacing
//!
//! Video is paced against the playback clock. A decoded frame is held until
//! its presentation time, shown when due, and dropped when hopelessly late.
//! Sustained lateness lowers the decoder's effort level one step at a time;
//! the change is scheduled here and applied before the next decode.

use serde::{Deserialize, Serialize};

/// Sync action for a decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Due and within tolerance
    Display,
    /// Due, late, but still worth showing
    DisplayLate,
    /// Too late to be useful
    Drop,
    /// Not due yet; wait this long before asking again
    WaitMs(u32),
}

/// How effort comes back up after it has been lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffortRecovery {
    /// Never raise effort again during a session
    Hold,
    /// Raise one level after this many consecutive on-time frames
    AfterOnTime { frames: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingPolicy {
    /// When false every frame is displayed as soon as it is decoded
    pub enabled: bool,
    /// Lateness (seconds) still counted as on time
    pub late_tolerance: f64,
    /// Lateness (seconds) past which a frame is dropped
    pub drop_threshold: f64,
    /// Consecutive late frames that trigger one effort decrease
    pub late_streak_limit: u32,
    pub recovery: EffortRecovery,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            late_tolerance: 0.05,
            drop_threshold: 0.5,
            late_streak_limit: 3,
            recovery: EffortRecovery::Hold,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PacingStats {
    /// Frames handed to the sink, late ones included
    pub shown: u64,
    pub dropped: u64,
    /// Frames shown past the tolerance
    pub late: u64,
    pub effort: u32,
    /// Every effort level applied, starting with the initial one
    pub effort_trajectory: Vec<u32>,
}

pub struct PacingController {
    policy: PacingPolicy,
    effort: u32,
    max_effort: u32,
    pending_delta: i32,
    late_streak: u32,
    on_time_streak: u32,
    stats: PacingStats,
}

impl PacingController {
    pub fn new(policy: PacingPolicy, initial_effort: u32, max_effort: u32) -> Self {
        let effort = initial_effort.min(max_effort);
        Self {
            policy,
            effort,
            max_effort,
            pending_delta: 0,
            late_streak: 0,
            on_time_streak: 0,
            stats: PacingStats {
                effort,
                effort_trajectory: vec![effort],
                ..PacingStats::default()
            },
        }
    }

    pub fn policy(&self) -> &PacingPolicy {
        &self.policy
    }

    pub fn effort(&self) -> u32 {
        self.effort
    }

    /// Effort change scheduled for the next decode, if any.
    pub fn pending_delta(&self) -> i32 {
        self.pending_delta
    }

    /// Consume the scheduled effort change.
    ///
    /// Returns the new level only if it differs from the current one.
    pub fn take_effort_change(&mut self) -> Option<u32> {
        if self.pending_delta == 0 {
            return None;
        }
        let target = (self.effort as i64 + self.pending_delta as i64).clamp(0, self.max_effort as i64) as u32;
        self.pending_delta = 0;
        if target == self.effort {
            return None;
        }
        tracing::debug!("Decoder effort {} -> {}", self.effort, target);
        self.effort = target;
        self.stats.effort = target;
        self.stats.effort_trajectory.push(target);
        Some(target)
    }

    /// Decide what to do with a frame due at `frame_time` when the clock
    /// reads `now` (both in seconds).
    pub fn action(&mut self, frame_time: f64, now: f64) -> SyncAction {
        if !self.policy.enabled {
            self.stats.shown += 1;
            return SyncAction::Display;
        }

        let lateness = now - frame_time;
        if lateness < 0.0 {
            let wait_ms = (-lateness * 1000.0).ceil().min(u32::MAX as f64) as u32;
            return SyncAction::WaitMs(wait_ms.max(1));
        }

        if lateness <= self.policy.late_tolerance {
            self.late_streak = 0;
            self.pending_delta = 0;
            self.stats.shown += 1;
            self.note_on_time();
            return SyncAction::Display;
        }

        self.on_time_streak = 0;
        self.late_streak += 1;
        if self.late_streak >= self.policy.late_streak_limit {
            self.late_streak = 0;
            if self.effort > 0 {
                self.pending_delta = -1;
            }
        }

        if lateness > self.policy.drop_threshold {
            self.stats.dropped += 1;
            tracing::trace!("Dropping frame at {:.3}s, {:.3}s late", frame_time, lateness);
            SyncAction::Drop
        } else {
            self.stats.shown += 1;
            self.stats.late += 1;
            SyncAction::DisplayLate
        }
    }

    fn note_on_time(&mut self) {
        let EffortRecovery::AfterOnTime { frames } = self.policy.recovery else {
            return;
        };
        self.on_time_streak += 1;
        if self.on_time_streak >= frames {
            self.on_time_streak = 0;
            if self.effort < self.max_effort {
                self.pending_delta = 1;
            }
        }
    }

    pub fn stats(&self) -> &PacingStats {
        &self.stats
    }

    pub fn into_stats(self) -> PacingStats {
        self.stats
    }
}
