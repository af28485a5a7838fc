//! Playback clock
//!
//! Wall-clock time since playback start, with stalls removed. A gap between
//! two readings larger than the stall threshold (process suspended, machine
//! asleep, debugger attached) is folded into a calibration offset so frames
//! do not all appear late afterwards. Backward jumps are folded the same way.

use std::time::{Duration, Instant};

pub const DEFAULT_STALL_THRESHOLD_MS: u64 = 1000;

/// Source of wall-clock readings in milliseconds.
pub trait TimeSource {
    fn now_ms(&mut self) -> i64;

    /// Block until roughly `duration` has passed.
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Monotonic system clock.
#[derive(Debug, Clone)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now_ms(&mut self) -> i64 {
        self.origin.elapsed().as_millis() as i64
    }
}

/// Scripted readings, for deterministic tests and replays.
///
/// Returns each reading in turn and repeats the last one when exhausted.
/// Sleeping does not block; it moves every later reading forward instead.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    readings: Vec<i64>,
    next: usize,
    slept: i64,
}

impl ManualTimeSource {
    pub fn new(readings: impl Into<Vec<i64>>) -> Self {
        Self {
            readings: readings.into(),
            next: 0,
            slept: 0,
        }
    }

    pub fn push(&mut self, ms: i64) {
        self.readings.push(ms);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&mut self) -> i64 {
        let idx = self.next.min(self.readings.len().saturating_sub(1));
        if self.next < self.readings.len() {
            self.next += 1;
        }
        self.readings.get(idx).copied().unwrap_or(0) + self.slept
    }

    fn sleep(&mut self, duration: Duration) {
        self.slept += duration.as_millis() as i64;
    }
}

pub struct PlaybackClock<S: TimeSource> {
    source: S,
    stall_threshold_ms: i64,
    start: Option<i64>,
    last: i64,
    offset: i64,
    stalls: u64,
}

impl<S: TimeSource> PlaybackClock<S> {
    pub fn new(source: S, stall_threshold_ms: u64) -> Self {
        Self {
            source,
            stall_threshold_ms: stall_threshold_ms as i64,
            start: None,
            last: 0,
            offset: 0,
            stalls: 0,
        }
    }

    /// Seconds since the first call, stalls excluded.
    pub fn now(&mut self) -> f64 {
        let now = self.source.now_ms();
        let start = match self.start {
            Some(start) => start,
            None => {
                self.start = Some(now);
                self.last = now;
                return 0.0;
            }
        };

        let gap = now - self.last;
        if gap > self.stall_threshold_ms || gap < 0 {
            self.offset += gap;
            self.stalls += 1;
            tracing::debug!("Clock stall of {} ms absorbed", gap);
        }
        self.last = now;

        (now - start - self.offset).max(0) as f64 / 1000.0
    }

    /// Number of stalls (or backward jumps) absorbed so far.
    pub fn stalls(&self) -> u64 {
        self.stalls
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset
    }

    pub fn sleep(&mut self, duration: Duration) {
        self.source.sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn clock(readings: &[i64]) -> PlaybackClock<ManualTimeSource> {
        PlaybackClock::new(ManualTimeSource::new(readings.to_vec()), DEFAULT_STALL_THRESHOLD_MS)
    }

    #[test]
    fn test_first_reading_is_zero() {
        let mut c = clock(&[123_456]);
        assert_eq!(c.now(), 0.0);
    }

    #[test]
    fn test_normal_progress() {
        let mut c = clock(&[5000, 5040, 5080, 5500]);
        assert_eq!(c.now(), 0.0);
        assert!((c.now() - 0.040).abs() < 1e-9);
        assert!((c.now() - 0.080).abs() < 1e-9);
        assert!((c.now() - 0.500).abs() < 1e-9);
        assert_eq!(c.stalls(), 0);
    }

    #[test]
    fn test_stall_is_excluded() {
        // 40 ms, then a 30 s suspension, then 40 ms more
        let mut c = clock(&[0, 40, 30_040, 30_080]);
        c.now();
        let before = c.now();
        let across = c.now();
        let after = c.now();
        assert!((before - 0.040).abs() < 1e-9);
        assert!((across - before).abs() < 1e-9);
        assert!((after - across - 0.040).abs() < 1e-9);
        assert_eq!(c.stalls(), 1);
        assert_eq!(c.offset_ms(), 30_000);
    }

    #[test]
    fn test_backward_jump_does_not_rewind() {
        let mut c = clock(&[10_000, 10_500, 9_000, 9_100]);
        c.now();
        let a = c.now();
        let b = c.now();
        let d = c.now();
        assert!(b >= a);
        assert!((d - b - 0.100).abs() < 1e-9);
    }

    #[test]
    fn test_manual_source_repeats_last() {
        let mut src = ManualTimeSource::new(vec![1, 2]);
        assert_eq!(src.now_ms(), 1);
        assert_eq!(src.now_ms(), 2);
        assert_eq!(src.now_ms(), 2);
    }

    #[test]
    fn test_manual_sleep_advances_readings() {
        let mut c = clock(&[0]);
        c.now();
        c.sleep(Duration::from_millis(40));
        assert!((c.now() - 0.040).abs() < 1e-9);
        assert_eq!(c.stalls(), 0);
    }

    proptest! {
        #[test]
        fn prop_clock_never_decreases(steps in proptest::collection::vec(-2_000i64..5_000, 1..60)) {
            let mut wall = 1_000_000i64;
            let mut readings = vec![wall];
            for s in &steps {
                wall += s;
                readings.push(wall);
            }
            let mut c = clock(&readings);
            let mut prev = c.now();
            for _ in &steps {
                let t = c.now();
                prop_assert!(t >= prev);
                prev = t;
            }
        }

        #[test]
        fn prop_reported_time_excludes_stalls(steps in proptest::collection::vec(0i64..3_000, 1..60)) {
            let mut wall = 0i64;
            let mut readings = vec![wall];
            let mut expected = 0i64;
            for s in &steps {
                wall += s;
                readings.push(wall);
                if *s <= DEFAULT_STALL_THRESHOLD_MS as i64 {
                    expected += s;
                }
            }
            let mut c = clock(&readings);
            c.now();
            let mut last = 0.0;
            for _ in &steps {
                last = c.now();
            }
            prop_assert!((last - expected as f64 / 1000.0).abs() < 1e-9);
        }
    }
}
