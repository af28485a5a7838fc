//! Theora stream headers and granule timing.
//!
//! Only what sits outside the codec proper lives here: the three mandatory
//! header packets and the granule position arithmetic. Pixel reconstruction
//! belongs to a [`crate::decode::DecodeEngine`].

pub mod granule;
pub mod header;

pub use granule::GranuleClock;
pub use header::{
    looks_like_theora, parse_comment, parse_identification, parse_setup, ColorSpace, HeaderKind,
    PixelFormat, SetupHeader, TheoraComment, TheoraInfo, TheoraVersion,
};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("empty header packet")]
    Empty,
    #[error("data packet where a header was expected")]
    UnexpectedData,
    #[error("missing theora signature")]
    BadSignature,
    #[error("unknown header type {0:#04x}")]
    UnknownType(u8),
    #[error("expected {expected:?} header, found {found:?}")]
    OutOfOrder {
        expected: HeaderKind,
        found: HeaderKind,
    },
    #[error("{kind:?} header truncated at {len} bytes")]
    Truncated { kind: HeaderKind, len: usize },
    #[error("unsupported bitstream version {}.{}.{}", .0.major, .0.minor, .0.revision)]
    UnsupportedVersion(TheoraVersion),
    #[error("invalid header: {0}")]
    Invalid(&'static str),
}

/// The complete header set a decode engine is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodecHeaders {
    pub info: TheoraInfo,
    pub comment: TheoraComment,
    #[serde(skip)]
    pub setup: SetupHeader,
}

impl CodecHeaders {
    pub fn granule_clock(&self) -> GranuleClock {
        GranuleClock::from_info(&self.info)
    }
}
