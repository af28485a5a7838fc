//! # ogvplay
//!
//! Headless Ogg/Theora player. Negotiates the Theora headers, then decodes
//! and paces frames against the wall clock, optionally writing the visible
//! picture to a YUV4MPEG2 file.

use std::fs::File;
use std::io::{self, BufRead, BufWriter, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::thread;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use ogvplay_core::{
    BlankDecoder, Command, DecodedFrame, NullSink, PlaybackConfig, PlaybackSummary,
    PresentationSink, Session, SinkError, Y4mSink, VERSION,
};

#[derive(Parser, Debug)]
#[command(name = "ogvplay", version, about = "Headless Ogg/Theora player with frame pacing")]
struct Cli {
    /// Ogg file to play
    input: PathBuf,

    /// Write presented frames as YUV4MPEG2 ("-" for stdout)
    #[arg(long, value_name = "PATH")]
    y4m: Option<PathBuf>,

    /// JSON playback configuration
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Stop after presenting this many frames
    #[arg(long, short = 'n', value_parser = clap::value_parser!(u64).range(1..))]
    max_frames: Option<u64>,

    /// Present frames as fast as they decode
    #[arg(long)]
    no_pacing: bool,

    /// Print stream and header information as JSON and exit
    #[arg(long)]
    info: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "ogvplay=info,ogvplay_core=info",
        1 => "ogvplay=debug,ogvplay_core=debug",
        _ => "ogvplay=trace,ogvplay_core=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

// ============================================================================
// Sinks
// ============================================================================

/// Asks the session to stop once enough frames have been presented.
struct FrameLimit<S> {
    inner: S,
    remaining: Option<u64>,
    stop: Sender<Command>,
}

impl<S: PresentationSink> PresentationSink for FrameLimit<S> {
    fn present(&mut self, frame: &DecodedFrame) -> Result<(), SinkError> {
        self.inner.present(frame)?;
        if let Some(n) = self.remaining.as_mut() {
            *n = n.saturating_sub(1);
            if *n == 0 {
                tracing::debug!("Frame limit reached");
                // The session may already be gone
                let _ = self.stop.send(Command::Stop);
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.inner.finish()
    }
}

fn open_output(path: &Path) -> Result<Box<dyn Write>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufWriter::new(io::stdout().lock())));
    }
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(Box::new(BufWriter::new(file)))
}

/// Send a stop command when "q" is typed on an interactive terminal.
fn watch_stdin(stop: Sender<Command>) {
    if !io::stdin().is_terminal() {
        return;
    }
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(l) if l.trim() == "q" => {
                    let _ = stop.send(Command::Stop);
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    tracing::info!("ogvplay v{}", VERSION);

    let mut config = match &cli.config {
        Some(path) => PlaybackConfig::load(path)?,
        None => PlaybackConfig::default(),
    };
    if cli.no_pacing {
        config.pacing = false;
    }
    config.validate()?;

    let file = File::open(&cli.input).with_context(|| format!("failed to open {}", cli.input.display()))?;
    let mut session = Session::new(file, config);
    let headers = session.negotiate()?.clone();

    if cli.info {
        let report = serde_json::json!({
            "streams": session.streams(),
            "headers": headers,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    session.attach_engine(Box::new(BlankDecoder::open(&headers)?))?;
    watch_stdin(session.command_sender());

    let summary = match &cli.y4m {
        Some(path) => {
            let sink = Y4mSink::new(open_output(path)?, &headers.info)?;
            play(&mut session, sink, cli.max_frames)?
        }
        None => play(&mut session, NullSink::new(), cli.max_frames)?,
    };

    tracing::info!(
        "Playback finished ({:?}): shown={}, late={}, dropped={}, effort={}, stalls={}",
        summary.reason,
        summary.pacing.shown,
        summary.pacing.late,
        summary.pacing.dropped,
        summary.pacing.effort,
        summary.clock_stalls
    );
    tracing::debug!("Summary: {}", serde_json::to_string(&summary)?);
    Ok(())
}

fn play<S: PresentationSink>(
    session: &mut Session<File>,
    sink: S,
    max_frames: Option<u64>,
) -> Result<PlaybackSummary> {
    let mut sink = FrameLimit {
        inner: sink,
        remaining: max_frames,
        stop: session.command_sender(),
    };
    Ok(session.run(&mut sink)?)
}
