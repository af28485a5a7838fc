//! Presentation sinks
//!
//! Where decoded frames go once pacing says they are due. The core never
//! draws; a sink can be a window, a file writer, or a counter.

use std::io::Write;

use thiserror::Error;

use crate::decode::{DecodedFrame, PictureRect};
use crate::theora::{PixelFormat, TheoraInfo};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("pixel format {0:?} cannot be presented")]
    UnsupportedFormat(PixelFormat),
    #[error("sink write failed: {0}")]
    Io(#[from] std::io::Error),
}

impl SinkError {
    /// Failures that no later frame can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UnsupportedFormat(_))
    }
}

pub trait PresentationSink {
    fn present(&mut self, frame: &DecodedFrame) -> Result<(), SinkError>;

    /// Flush anything buffered. Called once when playback ends.
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<T: PresentationSink + ?Sized> PresentationSink for &mut T {
    fn present(&mut self, frame: &DecodedFrame) -> Result<(), SinkError> {
        (**self).present(frame)
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        (**self).finish()
    }
}

/// Counts frames and discards them.
#[derive(Debug, Default)]
pub struct NullSink {
    frames: u64,
    last_index: Option<i64>,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last_index(&self) -> Option<i64> {
        self.last_index
    }
}

impl PresentationSink for NullSink {
    fn present(&mut self, frame: &DecodedFrame) -> Result<(), SinkError> {
        self.frames += 1;
        self.last_index = Some(frame.frame_index);
        Ok(())
    }
}

// ============================================================================
// YUV4MPEG2
// ============================================================================

/// Writes the visible picture of each frame as a YUV4MPEG2 stream.
pub struct Y4mSink<W: Write> {
    out: W,
    fps: (u32, u32),
    aspect: (u32, u32),
    format: PixelFormat,
    header_written: bool,
    frames: u64,
}

impl<W: Write> Y4mSink<W> {
    pub fn new(out: W, info: &TheoraInfo) -> Result<Self, SinkError> {
        if info.pixel_format == PixelFormat::Reserved {
            return Err(SinkError::UnsupportedFormat(info.pixel_format));
        }
        Ok(Self {
            out,
            fps: (info.fps_numerator, info.fps_denominator),
            aspect: (info.aspect_numerator, info.aspect_denominator),
            format: info.pixel_format,
            header_written: false,
            frames: 0,
        })
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn chroma_tag(format: PixelFormat) -> Result<&'static str, SinkError> {
        match format {
            PixelFormat::Yuv420 => Ok("420jpeg"),
            PixelFormat::Yuv422 => Ok("422"),
            PixelFormat::Yuv444 => Ok("444"),
            PixelFormat::Reserved => Err(SinkError::UnsupportedFormat(format)),
        }
    }
}

/// Grow the picture rectangle to chroma-aligned bounds so every output
/// chroma sample covers whole luma samples.
fn aligned_crop(picture: PictureRect, format: PixelFormat) -> PictureRect {
    let (sx, sy) = format.chroma_shift();
    let align = |start: u32, len: u32, shift: u32| {
        let mask = (1u32 << shift) - 1;
        let lo = start & !mask;
        let hi = (start + len + mask) & !mask;
        (lo, hi - lo)
    };
    let (x, width) = align(picture.x, picture.width, sx);
    let (y, height) = align(picture.y, picture.height, sy);
    PictureRect { x, y, width, height }
}

impl<W: Write> PresentationSink for Y4mSink<W> {
    fn present(&mut self, frame: &DecodedFrame) -> Result<(), SinkError> {
        if frame.format != self.format {
            return Err(SinkError::UnsupportedFormat(frame.format));
        }
        let tag = Self::chroma_tag(frame.format)?;
        let crop = aligned_crop(frame.picture, frame.format);

        if !self.header_written {
            writeln!(
                self.out,
                "YUV4MPEG2 W{} H{} F{}:{} Ip A{}:{} C{}",
                crop.width, crop.height, self.fps.0, self.fps.1, self.aspect.0, self.aspect.1, tag
            )?;
            self.header_written = true;
        }

        self.out.write_all(b"FRAME\n")?;
        let (sx, sy) = frame.format.chroma_shift();
        for (i, plane) in frame.planes.iter().enumerate() {
            let (px, py) = if i == 0 { (0, 0) } else { (sx, sy) };
            let x0 = (crop.x >> px) as usize;
            let width = (crop.width >> px) as usize;
            for row in (crop.y >> py)..((crop.y + crop.height) >> py) {
                let line = plane.row(row);
                self.out.write_all(&line[x0..x0 + width])?;
            }
        }

        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{BlankDecoder, DecodeEngine, DecodeStatus};
    use crate::ogg::Packet;
    use crate::testing::{data_packet, headers, IdentParams};

    fn first_frame(params: &IdentParams) -> (TheoraInfo, DecodedFrame) {
        let hdr = headers(params);
        let mut dec = BlankDecoder::open(&hdr).unwrap();
        let packet = Packet {
            data: data_packet(true).into(),
            granule: None,
            bos: false,
            eos: false,
            packet_no: 3,
        };
        match dec.decode(&packet).unwrap() {
            DecodeStatus::Frame(f) => (hdr.info, f),
            DecodeStatus::NeedMore => panic!("no frame"),
        }
    }

    #[test]
    fn test_y4m_header_and_frame_size() {
        let (info, frame) = first_frame(&IdentParams::default());
        let mut sink = Y4mSink::new(Vec::new(), &info).unwrap();
        sink.present(&frame).unwrap();
        sink.present(&frame).unwrap();
        sink.finish().unwrap();
        let out = sink.into_inner();

        let header = b"YUV4MPEG2 W320 H240 F25:1 Ip A1:1 C420jpeg\n";
        assert!(out.starts_with(header));
        let frame_bytes = 6 + 320 * 240 + 2 * (160 * 120);
        assert_eq!(out.len(), header.len() + 2 * frame_bytes);
        // Luma black then neutral chroma
        assert_eq!(out[header.len() + 6], 16);
        assert_eq!(*out.last().unwrap(), 128);
    }

    #[test]
    fn test_odd_crop_is_widened() {
        let crop = aligned_crop(
            PictureRect {
                x: 3,
                y: 5,
                width: 101,
                height: 50,
            },
            PixelFormat::Yuv420,
        );
        assert_eq!(crop, PictureRect { x: 2, y: 4, width: 102, height: 52 });

        let crop = aligned_crop(
            PictureRect {
                x: 3,
                y: 5,
                width: 101,
                height: 50,
            },
            PixelFormat::Yuv422,
        );
        assert_eq!(crop, PictureRect { x: 2, y: 5, width: 102, height: 50 });
    }

    #[test]
    fn test_odd_picture_frame_size() {
        let params = IdentParams {
            pic_width: 317,
            pic_height: 237,
            pic_x: 1,
            pic_y_bottom: 9,
            ..IdentParams::default()
        };
        let (info, frame) = first_frame(&params);
        let mut sink = Y4mSink::new(Vec::new(), &info).unwrap();
        sink.present(&frame).unwrap();
        let out = sink.into_inner();
        let header = b"YUV4MPEG2 W318 H238 F25:1 Ip A1:1 C420jpeg\n";
        assert!(out.starts_with(header));
        assert_eq!(out.len(), header.len() + 6 + 318 * 238 + 2 * (159 * 119));
    }

    #[test]
    fn test_444_has_full_chroma() {
        let (info, frame) = first_frame(&IdentParams {
            pixel_format: 3,
            ..IdentParams::default()
        });
        let mut sink = Y4mSink::new(Vec::new(), &info).unwrap();
        sink.present(&frame).unwrap();
        let out = sink.into_inner();
        let header = b"YUV4MPEG2 W320 H240 F25:1 Ip A1:1 C444\n";
        assert!(out.starts_with(header));
        assert_eq!(out.len(), header.len() + 6 + 3 * 320 * 240);
    }

    #[test]
    fn test_reserved_format_rejected() {
        let hdr = headers(&IdentParams {
            pixel_format: 1,
            ..IdentParams::default()
        });
        let err = Y4mSink::new(Vec::new(), &hdr.info).err().unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_null_sink_counts() {
        let (_, frame) = first_frame(&IdentParams::default());
        let mut sink = NullSink::new();
        sink.present(&frame).unwrap();
        assert_eq!(sink.frames(), 1);
        assert_eq!(sink.last_index(), Some(0));
    }
}
