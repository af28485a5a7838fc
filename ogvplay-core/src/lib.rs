//! # ogvplay Core
//!
//! Ogg/Theora playback core: container demultiplexing, header negotiation,
//! a stall-tolerant playback clock and frame pacing with decoder effort
//! control. Drawing is left to a [`sink::PresentationSink`].

// ============================================================================
// Container
// ============================================================================
pub mod reader;
pub mod ogg;

// ============================================================================
// Codec
// ============================================================================
pub mod theora;
pub mod classify;
pub mod negotiate;
pub mod decode;

// ============================================================================
// Timing
// ============================================================================
pub mod clock;
pub mod sync;

// ============================================================================
// Playback
// ============================================================================
pub mod sink;
pub mod config;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use config::PlaybackConfig;
pub use decode::{BlankDecoder, DecodeEngine, DecodedFrame};
pub use session::{Command, EndReason, PlaybackError, PlaybackEvent, PlaybackSummary, Session};
pub use sink::{NullSink, PresentationSink, SinkError, Y4mSink};
pub use theora::CodecHeaders;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
