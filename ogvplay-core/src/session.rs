//! # Playback Session
//!
//! One explicit context owning everything a playback needs: the chunk
//! reader, the demultiplexer, the header negotiator, the decode engine, the
//! playback clock and the pacing state. Nothing is global.
//!
//! ```text
//! negotiate() ──► attach_engine() ──► run() / step()
//! ```
//!
//! The loop is single threaded and polling. Other threads talk to it only
//! through the [`Command`] channel.

use std::io::Read;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::classify::StreamSummary;
use crate::clock::{PlaybackClock, SystemTimeSource, TimeSource};
use crate::config::{PlaybackConfig, SinkFailurePolicy};
use crate::decode::{DecodeEngine, DecodeError, DecodeStatus, DecodedFrame};
use crate::negotiate::{HeaderNegotiator, NegotiationError, NegotiationState};
use crate::ogg::{Demuxer, OggError};
use crate::reader::ChunkReader;
use crate::sink::{PresentationSink, SinkError};
use crate::sync::{PacingController, PacingStats, SyncAction};
use crate::theora::CodecHeaders;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Ogg(#[from] OggError),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error("input ended during header negotiation ({state:?})")]
    Truncated { state: NegotiationState },
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("presentation failed: {0}")]
    Sink(#[from] SinkError),
    #[error("headers not negotiated yet")]
    NotReady,
    #[error("no decode engine attached")]
    NoEngine,
}

/// Requests from outside the playback loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    EndOfStream,
    Stopped,
}

/// What one [`Session::step`] did.
#[derive(Debug)]
pub enum PlaybackEvent {
    /// Read and routed one chunk of input
    Buffering { bytes: usize },
    /// A packet went into the decoder without producing a frame
    Absorbed { packet_no: u64 },
    Presented { frame_index: i64, time: f64, late: bool },
    Dropped { frame_index: i64, time: f64 },
    /// A frame is held until it is due
    Waiting { ms: u32 },
    DecodeFailed(DecodeError),
    SinkFailed(SinkError),
    Finished(EndReason),
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaybackSummary {
    pub reason: EndReason,
    pub pacing: PacingStats,
    pub frames_decoded: u64,
    pub decode_errors: u64,
    pub sink_failures: u64,
    pub clock_stalls: u64,
    pub bytes_read: u64,
    pub pages: u64,
    pub crc_failures: u64,
    pub packet_holes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    frames_decoded: u64,
    decode_errors: u64,
    sink_failures: u64,
}

pub struct Session<R: Read, S: TimeSource = SystemTimeSource> {
    reader: ChunkReader<R>,
    demuxer: Demuxer,
    negotiator: HeaderNegotiator,
    clock: PlaybackClock<S>,
    config: PlaybackConfig,
    engine: Option<Box<dyn DecodeEngine>>,
    pacing: Option<PacingController>,
    held: Option<DecodedFrame>,
    commands: Receiver<Command>,
    command_tx: Sender<Command>,
    clock_started: bool,
    finished: Option<EndReason>,
    counters: Counters,
}

impl<R: Read> Session<R, SystemTimeSource> {
    pub fn new(source: R, config: PlaybackConfig) -> Self {
        Self::with_time_source(source, config, SystemTimeSource::new())
    }
}

impl<R: Read, S: TimeSource> Session<R, S> {
    pub fn with_time_source(source: R, config: PlaybackConfig, time: S) -> Self {
        let (command_tx, commands) = mpsc::channel();
        Self {
            reader: ChunkReader::with_buffer_size(source, config.read_buffer_size),
            demuxer: Demuxer::new(config.intake_limit),
            negotiator: HeaderNegotiator::new(),
            clock: PlaybackClock::new(time, config.stall_threshold_ms),
            config,
            engine: None,
            pacing: None,
            held: None,
            commands,
            command_tx,
            clock_started: false,
            finished: None,
            counters: Counters::default(),
        }
    }

    /// Handle for sending commands from another thread.
    pub fn command_sender(&self) -> Sender<Command> {
        self.command_tx.clone()
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn headers(&self) -> Option<&CodecHeaders> {
        self.negotiator.headers()
    }

    pub fn streams(&self) -> &[StreamSummary] {
        self.negotiator.streams()
    }

    pub fn negotiation_state(&self) -> NegotiationState {
        self.negotiator.state()
    }

    /// Read until the Theora header set is complete.
    pub fn negotiate(&mut self) -> Result<&CodecHeaders, PlaybackError> {
        while !self.negotiator.is_ready() {
            let routed = self.demuxer.pump()?;
            if !routed.is_empty() {
                self.negotiator.advance(&routed, self.demuxer.registry_mut())?;
                continue;
            }

            let chunk = self.reader.read()?;
            if chunk.is_empty() {
                return Err(PlaybackError::Truncated {
                    state: self.negotiator.state(),
                });
            }
            self.demuxer.ingest(&chunk)?;
        }
        self.negotiator.headers().ok_or(PlaybackError::NotReady)
    }

    /// Install the decode engine built from the negotiated headers.
    pub fn attach_engine(&mut self, mut engine: Box<dyn DecodeEngine>) -> Result<(), PlaybackError> {
        if !self.negotiator.is_ready() {
            return Err(PlaybackError::NotReady);
        }
        let max = engine.max_effort();
        let initial = self.config.initial_effort(max);
        engine.set_effort(initial);
        tracing::debug!("Decode engine '{}' at effort {}/{}", engine.name(), initial, max);

        self.pacing = Some(PacingController::new(self.config.pacing_policy(), initial, max));
        self.engine = Some(engine);
        Ok(())
    }

    /// Run to end of stream or until stopped.
    pub fn run(&mut self, sink: &mut dyn PresentationSink) -> Result<PlaybackSummary, PlaybackError> {
        let max_idle = self.config.max_idle_sleep_ms;
        loop {
            match self.step(sink)? {
                PlaybackEvent::Waiting { ms } => {
                    self.clock.sleep(Duration::from_millis((ms as u64).min(max_idle)));
                }
                PlaybackEvent::Finished(reason) => return Ok(self.summary(reason)),
                _ => {}
            }
        }
    }

    /// Do one unit of work: re-check a held frame, decode one packet, or
    /// read one chunk.
    pub fn step(&mut self, sink: &mut dyn PresentationSink) -> Result<PlaybackEvent, PlaybackError> {
        if let Some(reason) = self.finished {
            return Ok(PlaybackEvent::Finished(reason));
        }
        if self.engine.is_none() || self.pacing.is_none() {
            return Err(PlaybackError::NoEngine);
        }

        match self.commands.try_recv() {
            Ok(Command::Stop) => {
                tracing::info!("Stop requested");
                return self.finish(sink, EndReason::Stopped);
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
        }

        if !self.clock_started {
            self.clock.now();
            self.clock_started = true;
        }

        if let Some(frame) = self.held.take() {
            let action = self.pace(&frame);
            return self.dispose(frame, action, sink);
        }

        let Some(packet) = self.demuxer.next_packet() else {
            let ended = self
                .demuxer
                .registry()
                .selected()
                .map_or(true, |s| s.eos_seen() && s.queued() == 0);
            if ended {
                return self.finish(sink, EndReason::EndOfStream);
            }
            let chunk = self.reader.read()?;
            if chunk.is_empty() {
                tracing::debug!("Input ended without an end-of-stream page");
                return self.finish(sink, EndReason::EndOfStream);
            }
            self.demuxer.ingest(&chunk)?;
            self.demuxer.pump()?;
            return Ok(PlaybackEvent::Buffering { bytes: chunk.len() });
        };

        let status = match (self.engine.as_mut(), self.pacing.as_mut()) {
            (Some(engine), Some(pacing)) => {
                if let Some(level) = pacing.take_effort_change() {
                    tracing::info!("Lowering decoder effort to {}", level);
                    engine.set_effort(level);
                }
                if let Some(granule) = packet.granule {
                    engine.override_granule(granule);
                }
                engine.decode(&packet)
            }
            _ => return Err(PlaybackError::NoEngine),
        };

        match status {
            Ok(DecodeStatus::NeedMore) => Ok(PlaybackEvent::Absorbed {
                packet_no: packet.packet_no,
            }),
            Ok(DecodeStatus::Frame(frame)) => {
                self.counters.frames_decoded += 1;
                let action = self.pace(&frame);
                self.dispose(frame, action, sink)
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!("Skipping packet: {}", e);
                self.counters.decode_errors += 1;
                Ok(PlaybackEvent::DecodeFailed(e))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn pace(&mut self, frame: &DecodedFrame) -> SyncAction {
        let now = self.clock.now();
        match self.pacing.as_mut() {
            Some(pacing) => pacing.action(frame.time, now),
            None => SyncAction::Display,
        }
    }

    fn dispose(
        &mut self,
        frame: DecodedFrame,
        action: SyncAction,
        sink: &mut dyn PresentationSink,
    ) -> Result<PlaybackEvent, PlaybackError> {
        let (frame_index, time) = (frame.frame_index, frame.time);
        match action {
            SyncAction::WaitMs(ms) => {
                self.held = Some(frame);
                Ok(PlaybackEvent::Waiting { ms })
            }
            SyncAction::Drop => Ok(PlaybackEvent::Dropped { frame_index, time }),
            SyncAction::Display | SyncAction::DisplayLate => match sink.present(&frame) {
                Ok(()) => Ok(PlaybackEvent::Presented {
                    frame_index,
                    time,
                    late: action == SyncAction::DisplayLate,
                }),
                Err(e) => {
                    self.counters.sink_failures += 1;
                    if e.is_fatal() || self.config.sink_failure == SinkFailurePolicy::Stop {
                        return Err(e.into());
                    }
                    tracing::warn!("Frame {} not presented: {}", frame_index, e);
                    Ok(PlaybackEvent::SinkFailed(e))
                }
            },
        }
    }

    fn finish(
        &mut self,
        sink: &mut dyn PresentationSink,
        reason: EndReason,
    ) -> Result<PlaybackEvent, PlaybackError> {
        self.finished = Some(reason);
        self.held = None;
        sink.finish()?;
        Ok(PlaybackEvent::Finished(reason))
    }

    pub fn summary(&self, reason: EndReason) -> PlaybackSummary {
        let sync = self.demuxer.sync_stats();
        PlaybackSummary {
            reason,
            pacing: self.pacing.as_ref().map(|p| p.stats().clone()).unwrap_or_default(),
            frames_decoded: self.counters.frames_decoded,
            decode_errors: self.counters.decode_errors,
            sink_failures: self.counters.sink_failures,
            clock_stalls: self.clock.stalls(),
            bytes_read: self.reader.total_read(),
            pages: sync.pages,
            crc_failures: sync.crc_failures,
            packet_holes: self.demuxer.registry().selected().map_or(0, |s| s.holes()),
        }
    }
}
