// THEORA HEADERS - identification, comment and setup packets
//
// Every header packet starts with a type byte (high bit set) followed by the
// signature "theora". Data packets have the high bit clear.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::HeaderError;

pub const SIGNATURE: &[u8; 6] = b"theora";
pub const IDENT_HEADER_LEN: usize = 42;

/// Upper bound on the comment header payload we accept.
pub const MAX_COMMENT_BYTES: usize = 1 << 20;

// ============================================================================
// Header Kind
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderKind {
    Identification,
    Comment,
    Setup,
}

impl HeaderKind {
    pub fn from_type_byte(b: u8) -> Option<Self> {
        match b {
            0x80 => Some(Self::Identification),
            0x81 => Some(Self::Comment),
            0x82 => Some(Self::Setup),
            _ => None,
        }
    }

    /// Position in the mandatory header sequence, starting at 1.
    pub fn ordinal(self) -> usize {
        match self {
            Self::Identification => 1,
            Self::Comment => 2,
            Self::Setup => 3,
        }
    }
}

/// Check the type byte and signature, returning the bytes after them.
fn header_body(data: &[u8], expected: HeaderKind) -> Result<&[u8], HeaderError> {
    let Some(&type_byte) = data.first() else {
        return Err(HeaderError::Empty);
    };
    if type_byte & 0x80 == 0 {
        return Err(HeaderError::UnexpectedData);
    }
    if data.len() < 7 || &data[1..7] != SIGNATURE {
        return Err(HeaderError::BadSignature);
    }
    match HeaderKind::from_type_byte(type_byte) {
        Some(kind) if kind == expected => Ok(&data[7..]),
        Some(found) => Err(HeaderError::OutOfOrder { expected, found }),
        None => Err(HeaderError::UnknownType(type_byte)),
    }
}

/// Cheap test used during stream classification.
pub fn looks_like_theora(data: &[u8]) -> bool {
    data.len() >= 7 && data[0] == 0x80 && &data[1..7] == SIGNATURE
}

// ============================================================================
// Identification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Yuv420,
    /// Value 1 in the header; no defined layout
    Reserved,
    Yuv422,
    Yuv444,
}

impl PixelFormat {
    fn from_bits(v: u8) -> Self {
        match v & 0x03 {
            0 => Self::Yuv420,
            1 => Self::Reserved,
            2 => Self::Yuv422,
            _ => Self::Yuv444,
        }
    }

    /// Chroma decimation as (x shift, y shift).
    pub fn chroma_shift(self) -> (u32, u32) {
        match self {
            Self::Yuv420 => (1, 1),
            Self::Yuv422 => (1, 0),
            Self::Yuv444 | Self::Reserved => (0, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorSpace {
    Unspecified,
    Rec470M,
    Rec470BG,
    Other(u8),
}

impl ColorSpace {
    fn from_byte(v: u8) -> Self {
        match v {
            0 => Self::Unspecified,
            1 => Self::Rec470M,
            2 => Self::Rec470BG,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TheoraVersion {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
}

impl TheoraVersion {
    pub fn at_least(&self, major: u8, minor: u8, revision: u8) -> bool {
        (self.major, self.minor, self.revision) >= (major, minor, revision)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TheoraInfo {
    pub version: TheoraVersion,
    /// Coded size, always a multiple of 16
    pub frame_width: u32,
    pub frame_height: u32,
    /// Visible picture, offsets measured from the top-left corner
    pub pic_width: u32,
    pub pic_height: u32,
    pub pic_x: u32,
    pub pic_y: u32,
    pub fps_numerator: u32,
    pub fps_denominator: u32,
    pub aspect_numerator: u32,
    pub aspect_denominator: u32,
    pub color_space: ColorSpace,
    pub pixel_format: PixelFormat,
    pub target_bitrate: u32,
    pub quality: u8,
    pub keyframe_granule_shift: u8,
}

impl TheoraInfo {
    pub fn fps(&self) -> f64 {
        self.fps_numerator as f64 / self.fps_denominator as f64
    }
}

fn be24(d: &[u8], at: usize) -> u32 {
    ((d[at] as u32) << 16) | ((d[at + 1] as u32) << 8) | d[at + 2] as u32
}

fn be16(d: &[u8], at: usize) -> u32 {
    ((d[at] as u32) << 8) | d[at + 1] as u32
}

fn be32(d: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([d[at], d[at + 1], d[at + 2], d[at + 3]])
}

pub fn parse_identification(data: &[u8]) -> Result<TheoraInfo, HeaderError> {
    let body = header_body(data, HeaderKind::Identification)?;
    if body.len() < IDENT_HEADER_LEN - 7 {
        return Err(HeaderError::Truncated {
            kind: HeaderKind::Identification,
            len: data.len(),
        });
    }

    let version = TheoraVersion {
        major: body[0],
        minor: body[1],
        revision: body[2],
    };
    if version.major != 3 || version.minor > 2 {
        return Err(HeaderError::UnsupportedVersion(version));
    }

    let frame_width = be16(body, 3) << 4;
    let frame_height = be16(body, 5) << 4;
    let pic_width = be24(body, 7);
    let pic_height = be24(body, 10);
    let pic_x = body[13] as u32;
    let pic_y_from_bottom = body[14] as u32;
    let fps_numerator = be32(body, 15);
    let fps_denominator = be32(body, 19);
    let aspect_numerator = be24(body, 23);
    let aspect_denominator = be24(body, 26);
    let color_space = ColorSpace::from_byte(body[29]);
    let target_bitrate = be24(body, 30);

    // QUAL(6) KFGSHIFT(5) PF(2) reserved(3)
    let packed = be16(body, 33);
    let quality = (packed >> 10) as u8;
    let keyframe_granule_shift = ((packed >> 5) & 0x1F) as u8;
    let pixel_format = PixelFormat::from_bits(((packed >> 3) & 0x03) as u8);
    if packed & 0x07 != 0 {
        return Err(HeaderError::Invalid("reserved bits set in identification header"));
    }

    if frame_width == 0 || frame_height == 0 {
        return Err(HeaderError::Invalid("zero frame size"));
    }
    if pic_width == 0 || pic_height == 0 {
        return Err(HeaderError::Invalid("zero picture size"));
    }
    if pic_width + pic_x > frame_width || pic_height + pic_y_from_bottom > frame_height {
        return Err(HeaderError::Invalid("picture region exceeds frame"));
    }
    if fps_numerator == 0 || fps_denominator == 0 {
        return Err(HeaderError::Invalid("zero frame rate"));
    }

    Ok(TheoraInfo {
        version,
        frame_width,
        frame_height,
        pic_width,
        pic_height,
        pic_x,
        pic_y: frame_height - pic_height - pic_y_from_bottom,
        fps_numerator,
        fps_denominator,
        aspect_numerator,
        aspect_denominator,
        color_space,
        pixel_format,
        target_bitrate,
        quality,
        keyframe_granule_shift,
    })
}

// ============================================================================
// Comment
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TheoraComment {
    pub vendor: String,
    pub comments: Vec<String>,
}

impl TheoraComment {
    /// Values for a `KEY=value` tag, key matched case-insensitively.
    pub fn query<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.comments.iter().filter_map(move |c| {
            let (k, v) = c.split_once('=')?;
            k.eq_ignore_ascii_case(key).then_some(v)
        })
    }
}

struct LeCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> LeCursor<'a> {
    fn u32(&mut self) -> Option<u32> {
        let b = self.data.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let b = self.data.get(self.pos..self.pos.checked_add(n)?)?;
        self.pos += n;
        Some(b)
    }
}

pub fn parse_comment(data: &[u8]) -> Result<TheoraComment, HeaderError> {
    let body = header_body(data, HeaderKind::Comment)?;
    if body.len() > MAX_COMMENT_BYTES {
        return Err(HeaderError::Invalid("comment header too large"));
    }
    let truncated = || HeaderError::Truncated {
        kind: HeaderKind::Comment,
        len: data.len(),
    };

    let mut cur = LeCursor { data: body, pos: 0 };
    let vendor_len = cur.u32().ok_or_else(truncated)? as usize;
    let vendor = String::from_utf8_lossy(cur.bytes(vendor_len).ok_or_else(truncated)?).into_owned();

    let count = cur.u32().ok_or_else(truncated)? as usize;
    // Each entry needs at least its 4-byte length
    if count > (body.len() - cur.pos) / 4 {
        return Err(truncated());
    }

    let mut comments = Vec::with_capacity(count);
    for _ in 0..count {
        let len = cur.u32().ok_or_else(truncated)? as usize;
        let raw = cur.bytes(len).ok_or_else(truncated)?;
        comments.push(String::from_utf8_lossy(raw).into_owned());
    }

    Ok(TheoraComment { vendor, comments })
}

// ============================================================================
// Setup
// ============================================================================

/// Codebooks and quantiser tables, kept opaque for the decode engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupHeader {
    pub data: Bytes,
}

pub fn parse_setup(packet: &Bytes) -> Result<SetupHeader, HeaderError> {
    let body = header_body(packet, HeaderKind::Setup)?;
    if body.is_empty() {
        return Err(HeaderError::Truncated {
            kind: HeaderKind::Setup,
            len: packet.len(),
        });
    }
    Ok(SetupHeader {
        data: packet.slice(7..),
    })
}
