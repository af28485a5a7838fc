//! Codec identification from the first packet of a logical stream.
//!
//! Only Theora is decoded; the rest are named so diagnostics can say what
//! was skipped.

use serde::Serialize;

use crate::theora::looks_like_theora;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamKind {
    Theora,
    Vorbis,
    Opus,
    Flac,
    Speex,
    Skeleton,
    Kate,
    Unknown,
}

const SIGNATURES: &[(&[u8], StreamKind)] = &[
    (b"\x01vorbis", StreamKind::Vorbis),
    (b"OpusHead", StreamKind::Opus),
    (b"\x7fFLAC", StreamKind::Flac),
    (b"Speex   ", StreamKind::Speex),
    (b"fishead\0", StreamKind::Skeleton),
    (b"\x80kate\0\0\0", StreamKind::Kate),
];

pub fn identify(first_packet: &[u8]) -> StreamKind {
    if looks_like_theora(first_packet) {
        return StreamKind::Theora;
    }
    SIGNATURES
        .iter()
        .find(|(sig, _)| first_packet.starts_with(sig))
        .map(|&(_, kind)| kind)
        .unwrap_or(StreamKind::Unknown)
}

/// A logical stream seen during header negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    pub serial: u32,
    pub kind: StreamKind,
    pub selected: bool,
}
