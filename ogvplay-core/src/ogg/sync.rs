// OGG SYNC - page framing over a byte intake buffer
//
// Bytes arrive in arbitrary chunks. Pages come out whole, in arrival order,
// with their CRC verified. Anything that does not frame as a page is skipped
// until the next capture pattern.

use bytes::{Buf, Bytes, BytesMut};

use super::{
    body_len, le_i64, le_u32, OggError, CAPTURE_PATTERN, DEFAULT_INTAKE_LIMIT, FLAG_BOS,
    FLAG_CONTINUED, FLAG_EOS, PAGE_HEADER_SIZE,
};

// ============================================================================
// CRC
// ============================================================================

const CRC_TABLE: [u32; 256] = generate_crc_table();

/// Ogg CRC32: polynomial 0x04c11db7, no reflection, zero init, no final xor.
pub fn ogg_crc(data: &[u8]) -> u32 {
    let mut crc: u32 = 0;
    for &byte in data {
        crc = (crc << 8) ^ CRC_TABLE[((crc >> 24) ^ byte as u32) as usize];
    }
    crc
}

const fn generate_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut r = (i as u32) << 24;
        let mut j = 0;
        while j < 8 {
            if (r & 0x8000_0000) != 0 {
                r = (r << 1) ^ 0x04c1_1db7;
            } else {
                r <<= 1;
            }
            j += 1;
        }
        table[i] = r;
        i += 1;
    }
    table
}

/// CRC of a full page with the checksum field treated as zero.
fn page_crc(page: &[u8]) -> u32 {
    let mut crc: u32 = 0;
    for (i, &byte) in page.iter().enumerate() {
        let b = if (22..26).contains(&i) { 0 } else { byte };
        crc = (crc << 8) ^ CRC_TABLE[((crc >> 24) ^ b as u32) as usize];
    }
    crc
}

// ============================================================================
// Page
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    serial: u32,
    sequence: u32,
    granule: i64,
    flags: u8,
    lacing: Vec<u8>,
    body: Bytes,
}

impl Page {
    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn granule(&self) -> Option<i64> {
        (self.granule != -1).then_some(self.granule)
    }

    pub fn is_bos(&self) -> bool {
        self.flags & FLAG_BOS != 0
    }

    pub fn is_eos(&self) -> bool {
        self.flags & FLAG_EOS != 0
    }

    pub fn is_continued(&self) -> bool {
        self.flags & FLAG_CONTINUED != 0
    }

    pub fn lacing(&self) -> &[u8] {
        &self.lacing
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

// ============================================================================
// Sync State
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub pages: u64,
    pub bytes_skipped: u64,
    pub crc_failures: u64,
}

pub struct OggSync {
    buf: BytesMut,
    limit: usize,
    stats: SyncStats,
}

impl OggSync {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_INTAKE_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(8192),
            limit,
            stats: SyncStats::default(),
        }
    }

    /// Append raw bytes to the intake buffer.
    pub fn ingest(&mut self, bytes: &[u8]) -> Result<(), OggError> {
        if self.buf.len() + bytes.len() > self.limit {
            return Err(OggError::IntakeOverflow {
                buffered: self.buf.len(),
                incoming: bytes.len(),
                limit: self.limit,
            });
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Extract the next complete page, or `None` if more input is needed.
    pub fn next_page(&mut self) -> Option<Page> {
        loop {
            if self.buf.len() < PAGE_HEADER_SIZE {
                return None;
            }

            if &self.buf[..4] != CAPTURE_PATTERN {
                match find_capture(&self.buf[1..]) {
                    Some(pos) => self.skip(pos + 1),
                    None => {
                        // Keep a tail that may be the start of a split pattern
                        let keep = CAPTURE_PATTERN.len() - 1;
                        let drop = self.buf.len() - keep;
                        self.skip(drop);
                        return None;
                    }
                }
                continue;
            }

            if self.buf[4] != 0 {
                tracing::warn!("Unsupported Ogg page version {}, resyncing", self.buf[4]);
                self.skip(1);
                continue;
            }

            let segments = self.buf[26] as usize;
            let header_len = PAGE_HEADER_SIZE + segments;
            if self.buf.len() < header_len {
                return None;
            }

            let total = header_len + body_len(&self.buf[PAGE_HEADER_SIZE..header_len]);
            if self.buf.len() < total {
                return None;
            }

            let stored = le_u32(&self.buf, 22);
            let computed = page_crc(&self.buf[..total]);
            if stored != computed {
                self.stats.crc_failures += 1;
                tracing::warn!(
                    "Ogg page CRC mismatch (stored {:#010x}, computed {:#010x}), resyncing",
                    stored,
                    computed
                );
                self.skip(1);
                continue;
            }

            let raw = self.buf.split_to(total).freeze();
            self.stats.pages += 1;
            return Some(Page {
                flags: raw[5],
                granule: le_i64(&raw, 6),
                serial: le_u32(&raw, 14),
                sequence: le_u32(&raw, 18),
                lacing: raw[PAGE_HEADER_SIZE..header_len].to_vec(),
                body: raw.slice(header_len..),
            });
        }
    }

    fn skip(&mut self, n: usize) {
        self.buf.advance(n);
        self.stats.bytes_skipped += n as u64;
        tracing::trace!("Skipped {} bytes looking for a page", n);
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }
}

impl Default for OggSync {
    fn default() -> Self {
        Self::new()
    }
}

fn find_capture(data: &[u8]) -> Option<usize> {
    data.windows(CAPTURE_PATTERN.len())
        .position(|w| w == CAPTURE_PATTERN)
}
