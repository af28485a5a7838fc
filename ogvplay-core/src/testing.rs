//! Builders for synthetic Ogg/Theora bitstreams used across the unit tests.

use bytes::Bytes;

use crate::ogg::sync::ogg_crc;
use crate::ogg::{OggSync, Page, FLAG_BOS, FLAG_CONTINUED, FLAG_EOS};
use crate::theora::{parse_comment, parse_identification, parse_setup, CodecHeaders};

// ============================================================================
// Pages
// ============================================================================

pub(crate) struct PageBuilder {
    serial: u32,
    sequence: u32,
    granule: i64,
    flags: u8,
    lacing: Vec<u8>,
    body: Vec<u8>,
}

impl PageBuilder {
    pub(crate) fn new(serial: u32) -> Self {
        Self {
            serial,
            sequence: 0,
            granule: -1,
            flags: 0,
            lacing: Vec::new(),
            body: Vec::new(),
        }
    }

    pub(crate) fn bos(mut self) -> Self {
        self.flags |= FLAG_BOS;
        self
    }

    pub(crate) fn eos(mut self) -> Self {
        self.flags |= FLAG_EOS;
        self
    }

    pub(crate) fn continued(mut self) -> Self {
        self.flags |= FLAG_CONTINUED;
        self
    }

    pub(crate) fn sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    pub(crate) fn granule(mut self, granule: i64) -> Self {
        self.granule = granule;
        self
    }

    /// A complete packet ending on this page.
    pub(crate) fn packet(mut self, data: &[u8]) -> Self {
        self.lacing.extend(std::iter::repeat(255u8).take(data.len() / 255));
        self.lacing.push((data.len() % 255) as u8);
        self.body.extend_from_slice(data);
        self
    }

    /// The start of a packet continued on the next page.
    pub(crate) fn partial(mut self, data: &[u8]) -> Self {
        assert_eq!(data.len() % 255, 0, "partial packets fill whole segments");
        self.lacing.extend(std::iter::repeat(255u8).take(data.len() / 255));
        self.body.extend_from_slice(data);
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        assert!(self.lacing.len() <= 255, "too many segments for one page");
        let mut page = Vec::with_capacity(27 + self.lacing.len() + self.body.len());
        page.extend_from_slice(b"OggS");
        page.push(0);
        page.push(self.flags);
        page.extend_from_slice(&self.granule.to_le_bytes());
        page.extend_from_slice(&self.serial.to_le_bytes());
        page.extend_from_slice(&self.sequence.to_le_bytes());
        page.extend_from_slice(&[0; 4]);
        page.push(self.lacing.len() as u8);
        page.extend_from_slice(&self.lacing);
        page.extend_from_slice(&self.body);
        let crc = ogg_crc(&page);
        page[22..26].copy_from_slice(&crc.to_le_bytes());
        page
    }
}

pub(crate) fn parse_pages(raw: &[u8]) -> Vec<Page> {
    let mut sync = OggSync::new();
    sync.ingest(raw).unwrap();
    std::iter::from_fn(|| sync.next_page()).collect()
}

// ============================================================================
// Theora Headers
// ============================================================================

#[derive(Debug, Clone)]
pub(crate) struct IdentParams {
    /// Frame size in macroblocks
    pub fmbw: u16,
    pub fmbh: u16,
    pub pic_width: u32,
    pub pic_height: u32,
    pub pic_x: u8,
    pub pic_y_bottom: u8,
    pub fps_num: u32,
    pub fps_den: u32,
    pub aspect_num: u32,
    pub aspect_den: u32,
    pub pixel_format: u8,
    pub shift: u8,
    pub revision: u8,
}

impl Default for IdentParams {
    fn default() -> Self {
        Self {
            fmbw: 20,
            fmbh: 16,
            pic_width: 320,
            pic_height: 240,
            pic_x: 0,
            pic_y_bottom: 8,
            fps_num: 25,
            fps_den: 1,
            aspect_num: 1,
            aspect_den: 1,
            pixel_format: 0,
            shift: 6,
            revision: 1,
        }
    }
}

fn push_be24(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes()[1..]);
}

pub(crate) fn ident_header(p: &IdentParams) -> Vec<u8> {
    let mut h = vec![0x80];
    h.extend_from_slice(b"theora");
    h.extend_from_slice(&[3, 2, p.revision]);
    h.extend_from_slice(&p.fmbw.to_be_bytes());
    h.extend_from_slice(&p.fmbh.to_be_bytes());
    push_be24(&mut h, p.pic_width);
    push_be24(&mut h, p.pic_height);
    h.push(p.pic_x);
    h.push(p.pic_y_bottom);
    h.extend_from_slice(&p.fps_num.to_be_bytes());
    h.extend_from_slice(&p.fps_den.to_be_bytes());
    push_be24(&mut h, p.aspect_num);
    push_be24(&mut h, p.aspect_den);
    h.push(0); // color space
    push_be24(&mut h, 0); // bitrate
    let packed: u16 = (48 << 10) | ((p.shift as u16 & 0x1F) << 5) | ((p.pixel_format as u16 & 0x03) << 3);
    h.extend_from_slice(&packed.to_be_bytes());
    assert_eq!(h.len(), 42);
    h
}

pub(crate) fn comment_header(vendor: &str, comments: &[&str]) -> Vec<u8> {
    let mut h = vec![0x81];
    h.extend_from_slice(b"theora");
    h.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    h.extend_from_slice(vendor.as_bytes());
    h.extend_from_slice(&(comments.len() as u32).to_le_bytes());
    for c in comments {
        h.extend_from_slice(&(c.len() as u32).to_le_bytes());
        h.extend_from_slice(c.as_bytes());
    }
    h
}

pub(crate) fn setup_header() -> Vec<u8> {
    let mut h = vec![0x82];
    h.extend_from_slice(b"theora");
    // Stand-in for the quantiser and Huffman tables
    h.extend((0..64u8).map(|i| i.wrapping_mul(37)));
    h
}

/// A Theora data packet: bit 6 of the first byte clear means intra frame.
pub(crate) fn data_packet(keyframe: bool) -> Vec<u8> {
    let first = if keyframe { 0x00 } else { 0x40 };
    vec![first, 0x12, 0x34, 0x56]
}

pub(crate) fn headers(p: &IdentParams) -> CodecHeaders {
    CodecHeaders {
        info: parse_identification(&ident_header(p)).unwrap(),
        comment: parse_comment(&comment_header("ogvplay tests", &[])).unwrap(),
        setup: parse_setup(&Bytes::from(setup_header())).unwrap(),
    }
}

// ============================================================================
// Whole Streams
// ============================================================================

/// Pages of a Theora stream: identification page, one page with comment and
/// setup, then one page per frame. Frames are keyframes where `keyframes`
/// is true. The final page carries EOS.
pub(crate) fn theora_pages(serial: u32, p: &IdentParams, keyframes: &[bool]) -> Vec<Vec<u8>> {
    let mut pages = vec![
        PageBuilder::new(serial).bos().granule(0).packet(&ident_header(p)).build(),
        PageBuilder::new(serial)
            .sequence(1)
            .granule(0)
            .packet(&comment_header("ogvplay tests", &["TITLE=synthetic"]))
            .packet(&setup_header())
            .build(),
    ];

    let bias = if p.revision >= 1 { 1 } else { 0 };
    let mut last_key = 0i64;
    for (n, &key) in keyframes.iter().enumerate() {
        let n = n as i64;
        if key {
            last_key = n;
        }
        let granule = ((last_key + bias) << p.shift) + (n - last_key);
        let mut page = PageBuilder::new(serial)
            .sequence(n as u32 + 2)
            .granule(granule)
            .packet(&data_packet(key));
        if n as usize == keyframes.len() - 1 {
            page = page.eos();
        }
        pages.push(page.build());
    }
    pages
}

/// BOS page of a Vorbis stream, identified by its signature only.
pub(crate) fn vorbis_bos(serial: u32) -> Vec<u8> {
    let mut ident = b"\x01vorbis".to_vec();
    ident.extend_from_slice(&[0, 0, 0, 0, 2, 0x44, 0xAC, 0, 0]);
    ident.resize(30, 0);
    PageBuilder::new(serial).bos().granule(0).packet(&ident).build()
}

/// A non-BOS Vorbis page with filler payload.
pub(crate) fn vorbis_page(serial: u32, sequence: u32) -> Vec<u8> {
    PageBuilder::new(serial)
        .sequence(sequence)
        .granule(sequence as i64 * 1024)
        .packet(&[0x3E; 48])
        .build()
}

/// Interleave a Theora stream with a Vorbis stream the way muxers do:
/// both BOS pages first, then alternating pages.
pub(crate) fn interleaved_file(theora_serial: u32, vorbis_serial: u32, p: &IdentParams, keyframes: &[bool]) -> Vec<u8> {
    let theora = theora_pages(theora_serial, p, keyframes);
    let mut out = Vec::new();
    out.extend_from_slice(&theora[0]);
    out.extend(vorbis_bos(vorbis_serial));
    for (i, page) in theora[1..].iter().enumerate() {
        out.extend(vorbis_page(vorbis_serial, i as u32 + 1));
        out.extend_from_slice(page);
    }
    out
}

pub(crate) fn theora_file(p: &IdentParams, keyframes: &[bool]) -> Vec<u8> {
    theora_pages(0x7EE1, p, keyframes).concat()
}
