// LOGICAL STREAM - packet reassembly for one serial number
//
// Packets are split across lacing segments and possibly across pages. A
// lacing value below 255 terminates a packet; 255 means "continues".

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

use super::{OggError, Page};

/// A codec-level unit reassembled from one or more pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub data: Bytes,
    /// Only the last packet completed on a page carries the page granule.
    pub granule: Option<i64>,
    pub bos: bool,
    pub eos: bool,
    /// Zero-based index within the stream.
    pub packet_no: u64,
}

impl Packet {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug)]
pub struct LogicalStream {
    serial: u32,
    packets: VecDeque<Packet>,
    partial: BytesMut,
    partial_open: bool,
    next_sequence: Option<u32>,
    packet_no: u64,
    holes: u64,
    eos_seen: bool,
}

impl LogicalStream {
    pub fn new(serial: u32) -> Self {
        Self {
            serial,
            packets: VecDeque::new(),
            partial: BytesMut::new(),
            partial_open: false,
            next_sequence: None,
            packet_no: 0,
            holes: 0,
            eos_seen: false,
        }
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Split a page's segments into packets appended to the queue.
    pub fn page_in(&mut self, page: &Page) -> Result<(), OggError> {
        if page.serial() != self.serial {
            return Err(OggError::SerialMismatch {
                page: page.serial(),
                stream: self.serial,
            });
        }

        if let Some(expected) = self.next_sequence {
            if page.sequence() != expected {
                tracing::warn!(
                    "Stream {:#010x}: page sequence {} (expected {}), dropping partial packet",
                    self.serial,
                    page.sequence(),
                    expected
                );
                self.drop_partial();
            }
        }
        self.next_sequence = Some(page.sequence().wrapping_add(1));

        if !page.is_continued() && self.partial_open {
            tracing::warn!(
                "Stream {:#010x}: unfinished packet not continued on page {}",
                self.serial,
                page.sequence()
            );
            self.drop_partial();
        }

        let lacing = page.lacing();
        let body = page.body();
        let last_end = lacing.iter().rposition(|&v| v < 255);

        let mut offset = 0usize;
        let mut seg = 0usize;

        // Continuation of a packet we never saw the start of
        if page.is_continued() && !self.partial_open {
            while seg < lacing.len() {
                let v = lacing[seg] as usize;
                offset += v;
                seg += 1;
                if v < 255 {
                    break;
                }
            }
        }

        while seg < lacing.len() {
            let v = lacing[seg] as usize;
            let end = offset + v;
            self.partial.extend_from_slice(&body[offset..end]);
            self.partial_open = true;
            offset = end;

            if v < 255 {
                let is_last = Some(seg) == last_end;
                let packet = Packet {
                    data: self.partial.split().freeze(),
                    granule: if is_last { page.granule() } else { None },
                    bos: self.packet_no == 0 && page.is_bos(),
                    eos: is_last && page.is_eos(),
                    packet_no: self.packet_no,
                };
                self.packet_no += 1;
                self.partial_open = false;
                self.packets.push_back(packet);
            }
            seg += 1;
        }

        if page.is_eos() {
            self.eos_seen = true;
        }
        Ok(())
    }

    fn drop_partial(&mut self) {
        if self.partial_open {
            self.holes += 1;
        }
        self.partial.clear();
        self.partial_open = false;
    }

    pub fn packet_out(&mut self) -> Option<Packet> {
        self.packets.pop_front()
    }

    pub fn peek(&self) -> Option<&Packet> {
        self.packets.front()
    }

    pub fn queued(&self) -> usize {
        self.packets.len()
    }

    pub fn holes(&self) -> u64 {
        self.holes
    }

    pub fn eos_seen(&self) -> bool {
        self.eos_seen
    }

    pub fn has_partial(&self) -> bool {
        self.partial_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{parse_pages, PageBuilder};

    fn feed(stream: &mut LogicalStream, pages: &[Vec<u8>]) {
        for raw in pages {
            for page in parse_pages(raw) {
                stream.page_in(&page).unwrap();
            }
        }
    }

    #[test]
    fn test_multiple_packets_on_one_page() {
        let page = PageBuilder::new(5)
            .bos()
            .granule(42)
            .packet(b"one")
            .packet(b"two")
            .packet(b"three")
            .build();
        let mut stream = LogicalStream::new(5);
        feed(&mut stream, &[page]);

        let packets: Vec<Packet> = std::iter::from_fn(|| stream.packet_out()).collect();
        assert_eq!(packets.len(), 3);
        assert_eq!(&packets[0].data[..], b"one");
        assert!(packets[0].bos);
        assert!(!packets[1].bos);
        // Only the last packet completed gets the granule
        assert_eq!(packets[0].granule, None);
        assert_eq!(packets[1].granule, None);
        assert_eq!(packets[2].granule, Some(42));
        assert_eq!(packets[2].packet_no, 2);
    }

    #[test]
    fn test_packet_spanning_pages() {
        let big: Vec<u8> = (0..600u32).map(|i| i as u8).collect();
        let first = PageBuilder::new(9).sequence(0).partial(&big[..510]).build();
        let second = PageBuilder::new(9)
            .sequence(1)
            .continued()
            .granule(3)
            .packet(&big[510..])
            .build();

        let mut stream = LogicalStream::new(9);
        feed(&mut stream, &[first]);
        assert!(stream.packet_out().is_none());
        assert!(stream.has_partial());

        feed(&mut stream, &[second]);
        let packet = stream.packet_out().unwrap();
        assert_eq!(&packet.data[..], &big[..]);
        assert_eq!(packet.granule, Some(3));
    }

    #[test]
    fn test_exact_multiple_of_255_needs_terminator() {
        let data = vec![1u8; 255];
        let page = PageBuilder::new(2).packet(&data).build();
        let parsed = parse_pages(&page);
        assert_eq!(parsed[0].lacing(), &[255, 0]);

        let mut stream = LogicalStream::new(2);
        stream.page_in(&parsed[0]).unwrap();
        assert_eq!(stream.packet_out().unwrap().len(), 255);
    }

    #[test]
    fn test_sequence_gap_drops_partial() {
        let first = PageBuilder::new(4).sequence(0).partial(&[1u8; 255]).build();
        // Sequence 1 lost; sequence 2 continues a packet we cannot finish
        let third = PageBuilder::new(4)
            .sequence(2)
            .continued()
            .packet(&[2u8; 10])
            .packet(b"whole")
            .build();

        let mut stream = LogicalStream::new(4);
        feed(&mut stream, &[first, third]);

        assert_eq!(stream.holes(), 1);
        let packet = stream.packet_out().unwrap();
        assert_eq!(&packet.data[..], b"whole");
        assert!(stream.packet_out().is_none());
    }

    #[test]
    fn test_serial_mismatch_rejected() {
        let page = &parse_pages(&PageBuilder::new(1).packet(b"x").build())[0];
        let mut stream = LogicalStream::new(2);
        assert!(matches!(
            stream.page_in(page),
            Err(OggError::SerialMismatch { page: 1, stream: 2 })
        ));
    }

    #[test]
    fn test_eos_marks_last_packet() {
        let page = PageBuilder::new(3).eos().granule(9).packet(b"a").packet(b"b").build();
        let mut stream = LogicalStream::new(3);
        feed(&mut stream, &[page]);
        assert!(!stream.packet_out().unwrap().eos);
        assert!(stream.packet_out().unwrap().eos);
        assert!(stream.eos_seen());
    }
}
