// GRANULE POSITION - frame numbering for Theora
//
// granule = (keyframe_number << shift) | frames_since_keyframe
//
// Bitstreams from 3.2.1 on store a frame *count* (first frame is 1); 3.2.0
// stored a frame *index* (first frame is 0).

use super::TheoraInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GranuleClock {
    shift: u8,
    fps_numerator: u32,
    fps_denominator: u32,
    count_base: i64,
}

impl GranuleClock {
    pub fn from_info(info: &TheoraInfo) -> Self {
        Self {
            shift: info.keyframe_granule_shift,
            fps_numerator: info.fps_numerator,
            fps_denominator: info.fps_denominator,
            count_base: if info.version.at_least(3, 2, 1) { 1 } else { 0 },
        }
    }

    pub fn shift(&self) -> u8 {
        self.shift
    }

    /// Keyframe numbering offset: 1 for frame-count streams, 0 otherwise.
    pub fn bias(&self) -> i64 {
        self.count_base
    }

    /// Split a granule into (keyframe number, offset since keyframe).
    pub fn split(&self, granule: i64) -> (i64, i64) {
        let iframe = granule >> self.shift;
        (iframe, granule - (iframe << self.shift))
    }

    /// Build a granule from its parts, or `None` if it does not fit.
    pub fn join(&self, iframe: i64, pframe: i64) -> Option<i64> {
        iframe.checked_mul(1i64 << self.shift)?.checked_add(pframe)
    }

    /// Zero-based frame index, or `None` for a negative granule.
    pub fn frame_index(&self, granule: i64) -> Option<i64> {
        if granule < 0 {
            return None;
        }
        let (iframe, pframe) = self.split(granule);
        Some(iframe + pframe - self.count_base)
    }

    /// Presentation (start) time in seconds.
    pub fn time(&self, granule: i64) -> Option<f64> {
        let frame = self.frame_index(granule)?;
        Some(frame as f64 * self.fps_denominator as f64 / self.fps_numerator as f64)
    }

    /// Granule the first frame of the stream carries.
    pub fn first_granule(&self) -> i64 {
        self.count_base << self.shift
    }
}
