//! # Header Negotiation
//!
//! Finds the Theora stream among the logical streams opened at the start of
//! the file and absorbs its three header packets in order:
//!
//! ```text
//! Searching ──ident──► Collecting{1} ──comment──► Collecting{2} ──setup──► Ready
//! ```
//!
//! Streams are held while they are unclassified. The first one whose first
//! packet parses as a Theora identification header is promoted; every other
//! open stream is torn down at that moment. A non-BOS page while still
//! searching means the BOS section is over and no Theora stream exists.

use serde::Serialize;
use thiserror::Error;

use crate::classify::{identify, StreamKind, StreamSummary};
use crate::ogg::{Packet, Routed, StreamRegistry};
use crate::theora::{
    parse_comment, parse_identification, parse_setup, CodecHeaders, HeaderError, HeaderKind,
    TheoraComment, TheoraInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NegotiationState {
    /// No stream classified yet
    Searching,
    /// Wanted stream found; `absorbed` header packets accepted so far
    Collecting { absorbed: usize },
    Ready,
}

#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("header packet {ordinal} rejected: {source}")]
    Header {
        ordinal: usize,
        #[source]
        source: HeaderError,
    },
    #[error("header set already complete")]
    AlreadyReady,
    #[error("no Theora stream in the file ({} other stream(s))", streams.len())]
    NoWantedStream { streams: Vec<StreamSummary> },
}

enum Progress {
    Searching,
    Identified(TheoraInfo),
    Commented(TheoraInfo, TheoraComment),
    Ready(CodecHeaders),
}

pub struct HeaderNegotiator {
    progress: Progress,
    streams: Vec<StreamSummary>,
    selected: Option<u32>,
}

impl HeaderNegotiator {
    pub fn new() -> Self {
        Self {
            progress: Progress::Searching,
            streams: Vec::new(),
            selected: None,
        }
    }

    pub fn state(&self) -> NegotiationState {
        match self.progress {
            Progress::Searching => NegotiationState::Searching,
            Progress::Identified(_) => NegotiationState::Collecting { absorbed: 1 },
            Progress::Commented(..) => NegotiationState::Collecting { absorbed: 2 },
            Progress::Ready(_) => NegotiationState::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.progress, Progress::Ready(_))
    }

    pub fn headers(&self) -> Option<&CodecHeaders> {
        match &self.progress {
            Progress::Ready(headers) => Some(headers),
            _ => None,
        }
    }

    /// Streams classified so far, in opening order.
    pub fn streams(&self) -> &[StreamSummary] {
        &self.streams
    }

    pub fn selected_serial(&self) -> Option<u32> {
        self.selected
    }

    /// Feed the next header packet of the wanted stream.
    pub fn offer(&mut self, packet: &Packet) -> Result<NegotiationState, NegotiationError> {
        let progress = std::mem::replace(&mut self.progress, Progress::Searching);
        let next = match progress {
            Progress::Ready(headers) => {
                self.progress = Progress::Ready(headers);
                return Err(NegotiationError::AlreadyReady);
            }
            Progress::Searching => {
                let info = parse_identification(&packet.data).map_err(|source| NegotiationError::Header {
                    ordinal: HeaderKind::Identification.ordinal(),
                    source,
                })?;
                Progress::Identified(info)
            }
            Progress::Identified(info) => match parse_comment(&packet.data) {
                Ok(comment) => Progress::Commented(info, comment),
                Err(source) => {
                    self.progress = Progress::Identified(info);
                    return Err(NegotiationError::Header {
                        ordinal: HeaderKind::Comment.ordinal(),
                        source,
                    });
                }
            },
            Progress::Commented(info, comment) => match parse_setup(&packet.data) {
                Ok(setup) => {
                    tracing::info!(
                        "Theora {}x{} ({}x{} coded) at {:.3} fps, {:?}, vendor {:?}",
                        info.pic_width,
                        info.pic_height,
                        info.frame_width,
                        info.frame_height,
                        info.fps(),
                        info.pixel_format,
                        comment.vendor
                    );
                    Progress::Ready(CodecHeaders {
                        info,
                        comment,
                        setup,
                    })
                }
                Err(source) => {
                    self.progress = Progress::Commented(info, comment);
                    return Err(NegotiationError::Header {
                        ordinal: HeaderKind::Setup.ordinal(),
                        source,
                    });
                }
            },
        };
        self.progress = next;
        Ok(self.state())
    }

    /// Make whatever progress the routed pages allow.
    pub fn advance(
        &mut self,
        routed: &[Routed],
        registry: &mut StreamRegistry,
    ) -> Result<NegotiationState, NegotiationError> {
        if matches!(self.progress, Progress::Searching) {
            self.classify_held(registry)?;
            if matches!(self.progress, Progress::Searching) && routed.iter().any(|r| !r.bos) {
                return Err(NegotiationError::NoWantedStream {
                    streams: self.streams.clone(),
                });
            }
        }

        while !self.is_ready() && self.selected.is_some() {
            let Some(packet) = registry.selected_mut().and_then(|s| s.packet_out()) else {
                break;
            };
            self.offer(&packet)?;
        }

        Ok(self.state())
    }

    fn classify_held(&mut self, registry: &mut StreamRegistry) -> Result<(), NegotiationError> {
        let fresh: Vec<(u32, StreamKind, bool)> = registry
            .held()
            .filter(|s| !self.streams.iter().any(|k| k.serial == s.serial()))
            .filter_map(|s| {
                let first = s.peek()?;
                let kind = identify(&first.data);
                let usable = kind == StreamKind::Theora && parse_identification(&first.data).is_ok();
                Some((s.serial(), kind, usable))
            })
            .collect();

        for &(serial, kind, usable) in &fresh {
            self.streams.push(StreamSummary {
                serial,
                kind,
                selected: false,
            });
            if kind == StreamKind::Theora && !usable {
                tracing::warn!("Stream {:#010x} has an unusable Theora header, skipping", serial);
            } else if !usable {
                tracing::debug!("Stream {:#010x} is {:?}, not decoded", serial, kind);
            }
        }

        let Some(&(serial, _, _)) = fresh.iter().find(|(_, _, usable)| *usable) else {
            return Ok(());
        };
        if registry.promote(serial) {
            self.selected = Some(serial);
            if let Some(summary) = self.streams.iter_mut().find(|k| k.serial == serial) {
                summary.selected = true;
            }
            tracing::debug!("Selected Theora stream {:#010x}", serial);
            if let Some(packet) = registry.selected_mut().and_then(|s| s.packet_out()) {
                self.offer(&packet)?;
            }
        }
        Ok(())
    }
}

impl Default for HeaderNegotiator {
    fn default() -> Self {
        Self::new()
    }
}
