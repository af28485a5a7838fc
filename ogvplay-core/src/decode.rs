//! # Video Decode Module
//!
//! The decode engine is opaque to the playback core: packets go in, frames
//! come out, and a coarse effort knob trades quality for speed. Engines are
//! built once from a complete [`CodecHeaders`] set.
//!
//! [`BlankDecoder`] honours the full contract (granule tracking, frame
//! geometry, effort range) without reconstructing pixels. It drives headless
//! timing runs and the tests.

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::ogg::Packet;
use crate::theora::{CodecHeaders, GranuleClock, PixelFormat, TheoraInfo};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported stream: {0}")]
    Unsupported(String),
    #[error("corrupt packet {packet_no}: {reason}")]
    Corrupt { packet_no: u64, reason: String },
}

impl DecodeError {
    /// A bad packet can be skipped; an unsupported stream cannot.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

// ============================================================================
// Frames
// ============================================================================

/// Visible region inside the coded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PictureRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub data: Bytes,
}

impl Plane {
    fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            stride: width as usize,
            data: Bytes::from(vec![value; width as usize * height as usize]),
        }
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize]
    }
}

/// A decoded video frame. Planes are shared, so clones are cheap.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Y, Cb, Cr
    pub planes: [Plane; 3],
    pub format: PixelFormat,
    pub picture: PictureRect,
    pub granule: i64,
    pub frame_index: i64,
    /// Presentation time in seconds
    pub time: f64,
    pub keyframe: bool,
    /// Produced from a zero-length packet (repeat of the previous frame)
    pub duplicate: bool,
}

#[derive(Debug)]
pub enum DecodeStatus {
    Frame(DecodedFrame),
    /// The packet was absorbed but no frame is ready
    NeedMore,
}

// ============================================================================
// Engine Trait
// ============================================================================

/// Decoder trait - implemented by all decode backends
pub trait DecodeEngine {
    /// Decode one payload packet.
    fn decode(&mut self, packet: &Packet) -> Result<DecodeStatus, DecodeError>;

    /// Adjust the quality/speed trade-off, clamped to `max_effort()`.
    fn set_effort(&mut self, level: u32);

    fn effort(&self) -> u32;

    fn max_effort(&self) -> u32;

    /// Force the granule position of the next decoded frame.
    fn override_granule(&mut self, granule: i64);

    /// Get decoder name for debugging
    fn name(&self) -> &str;
}

// ============================================================================
// Blank Decoder
// ============================================================================

/// Post-processing levels exposed as effort
pub const BLANK_MAX_EFFORT: u32 = 7;

/// Refuse absurd frame sizes before allocating planes
const MAX_PIXELS: u64 = 1 << 26;

// Video-range black
const LUMA_BLACK: u8 = 16;
const CHROMA_NEUTRAL: u8 = 128;

pub struct BlankDecoder {
    clock: GranuleClock,
    keyframe_num: i64,
    curframe_num: i64,
    effort: u32,
    blank: DecodedFrame,
    last: Option<DecodedFrame>,
    frames: u64,
}

impl BlankDecoder {
    pub fn open(headers: &CodecHeaders) -> Result<Self, DecodeError> {
        let info = &headers.info;
        let pixels = info.frame_width as u64 * info.frame_height as u64;
        if pixels > MAX_PIXELS {
            return Err(DecodeError::Unsupported(format!(
                "{}x{} frame",
                info.frame_width, info.frame_height
            )));
        }

        tracing::debug!(
            "Blank decoder: {}x{} {:?}, {} byte setup header",
            info.frame_width,
            info.frame_height,
            info.pixel_format,
            headers.setup.data.len()
        );

        Ok(Self {
            clock: headers.granule_clock(),
            blank: blank_frame(info),
            keyframe_num: 0,
            curframe_num: 0,
            effort: BLANK_MAX_EFFORT,
            last: None,
            frames: 0,
        })
    }
}

fn blank_frame(info: &TheoraInfo) -> DecodedFrame {
    let (sx, sy) = info.pixel_format.chroma_shift();
    let (w, h) = (info.frame_width, info.frame_height);
    let (cw, ch) = (w >> sx, h >> sy);
    DecodedFrame {
        planes: [
            Plane::filled(w, h, LUMA_BLACK),
            Plane::filled(cw, ch, CHROMA_NEUTRAL),
            Plane::filled(cw, ch, CHROMA_NEUTRAL),
        ],
        format: info.pixel_format,
        picture: PictureRect {
            x: info.pic_x,
            y: info.pic_y,
            width: info.pic_width,
            height: info.pic_height,
        },
        granule: -1,
        frame_index: -1,
        time: 0.0,
        keyframe: false,
        duplicate: false,
    }
}

impl DecodeEngine for BlankDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<DecodeStatus, DecodeError> {
        let (keyframe, duplicate) = match packet.data.first() {
            // Zero-length packet: repeat the previous frame
            None => (false, true),
            // Header packets after negotiation carry no picture
            Some(&b) if b & 0x80 != 0 => return Ok(DecodeStatus::NeedMore),
            Some(&b) => (b & 0x40 == 0, false),
        };

        if self.frames == 0 && !keyframe && !duplicate {
            return Err(DecodeError::Corrupt {
                packet_no: packet.packet_no,
                reason: "first frame is not a keyframe".into(),
            });
        }

        let keyframe_num = if keyframe { self.curframe_num } else { self.keyframe_num };
        let granule = keyframe_num
            .checked_add(self.clock.bias())
            .and_then(|iframe| self.clock.join(iframe, self.curframe_num - keyframe_num))
            .ok_or_else(|| DecodeError::Corrupt {
                packet_no: packet.packet_no,
                reason: "granule position out of range".into(),
            })?;
        self.keyframe_num = keyframe_num;
        self.curframe_num += 1;

        let mut frame = match (&self.last, duplicate) {
            (Some(prev), true) => prev.clone(),
            _ => self.blank.clone(),
        };
        frame.granule = granule;
        frame.frame_index = self.clock.frame_index(granule).unwrap_or(-1);
        frame.time = self.clock.time(granule).unwrap_or(0.0);
        frame.keyframe = keyframe;
        frame.duplicate = duplicate;

        self.frames += 1;
        self.last = Some(frame.clone());
        Ok(DecodeStatus::Frame(frame))
    }

    fn set_effort(&mut self, level: u32) {
        self.effort = level.min(BLANK_MAX_EFFORT);
    }

    fn effort(&self) -> u32 {
        self.effort
    }

    fn max_effort(&self) -> u32 {
        BLANK_MAX_EFFORT
    }

    fn override_granule(&mut self, granule: i64) {
        if granule < 0 {
            return;
        }
        let (iframe, pframe) = self.clock.split(granule);
        self.keyframe_num = iframe - self.clock.bias();
        self.curframe_num = self.keyframe_num + pframe;
    }

    fn name(&self) -> &str {
        "blank"
    }
}
