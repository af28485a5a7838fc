//! # Ogg Demultiplexer
//!
//! Ogg is a chunked, self-describing transport: a byte stream of *pages*,
//! each tagged with the serial number of the logical stream it belongs to.
//! Several logical streams (video, audio, metadata) interleave in one file.
//!
//! ```text
//! bytes ──► OggSync ──► Page ──► StreamRegistry ──► LogicalStream ──► Packet
//!           (intake)            (route by serial)   (reassembly)
//! ```
//!
//! Page header layout (27 bytes + lacing table):
//!
//! | offset | size | field                 |
//! |--------|------|-----------------------|
//! | 0      | 4    | capture pattern `OggS`|
//! | 4      | 1    | version (0)           |
//! | 5      | 1    | header type flags     |
//! | 6      | 8    | granule position      |
//! | 14     | 4    | serial number         |
//! | 18     | 4    | page sequence number  |
//! | 22     | 4    | CRC-32                |
//! | 26     | 1    | segment count         |
//! | 27     | n    | lacing values         |

pub mod registry;
pub mod stream;
pub mod sync;

pub use registry::{Disposition, Routed, StreamRegistry};
pub use stream::{LogicalStream, Packet};
pub use sync::{OggSync, Page, SyncStats};

use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

pub const CAPTURE_PATTERN: &[u8; 4] = b"OggS";
pub const PAGE_HEADER_SIZE: usize = 27;
/// Largest possible page: header, 255 lacing values, 255 * 255 body bytes.
pub const MAX_PAGE_SIZE: usize = PAGE_HEADER_SIZE + 255 + 255 * 255;

pub const FLAG_CONTINUED: u8 = 0x01;
pub const FLAG_BOS: u8 = 0x02;
pub const FLAG_EOS: u8 = 0x04;

/// Default ceiling on buffered-but-unparsed intake bytes.
pub const DEFAULT_INTAKE_LIMIT: usize = 16 * 1024 * 1024;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum OggError {
    #[error("intake buffer overflow: {buffered} buffered + {incoming} incoming exceeds {limit} bytes")]
    IntakeOverflow {
        buffered: usize,
        incoming: usize,
        limit: usize,
    },
    #[error("page for stream {page:#010x} fed to stream {stream:#010x}")]
    SerialMismatch { page: u32, stream: u32 },
}

// ============================================================================
// Demuxer
// ============================================================================

/// Intake buffer plus per-serial routing.
pub struct Demuxer {
    sync: OggSync,
    registry: StreamRegistry,
}

impl Demuxer {
    pub fn new(intake_limit: usize) -> Self {
        Self {
            sync: OggSync::with_limit(intake_limit),
            registry: StreamRegistry::new(),
        }
    }

    pub fn ingest(&mut self, bytes: &[u8]) -> Result<(), OggError> {
        self.sync.ingest(bytes)
    }

    pub fn next_page(&mut self) -> Option<Page> {
        self.sync.next_page()
    }

    pub fn route(&mut self, page: Page) -> Result<Routed, OggError> {
        self.registry.route(page)
    }

    /// Move every complete buffered page into its stream.
    pub fn pump(&mut self) -> Result<Vec<Routed>, OggError> {
        let mut routed = Vec::new();
        while let Some(page) = self.sync.next_page() {
            routed.push(self.registry.route(page)?);
        }
        Ok(routed)
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut StreamRegistry {
        &mut self.registry
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.sync.stats()
    }

    pub fn buffered(&self) -> usize {
        self.sync.buffered()
    }

    /// Next packet of the selected stream, if one is queued.
    pub fn next_packet(&mut self) -> Option<Packet> {
        self.registry.selected_mut()?.packet_out()
    }
}

impl Default for Demuxer {
    fn default() -> Self {
        Self::new(DEFAULT_INTAKE_LIMIT)
    }
}

/// Read a little-endian value without panicking on short slices.
pub(crate) fn le_u32(data: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    if let Some(src) = data.get(at..at + 4) {
        b.copy_from_slice(src);
    }
    u32::from_le_bytes(b)
}

pub(crate) fn le_i64(data: &[u8], at: usize) -> i64 {
    let mut b = [0u8; 8];
    if let Some(src) = data.get(at..at + 8) {
        b.copy_from_slice(src);
    }
    i64::from_le_bytes(b)
}

/// Sum of a lacing table, i.e. the page body length.
pub(crate) fn body_len(lacing: &[u8]) -> usize {
    lacing.iter().map(|&v| v as usize).sum()
}
