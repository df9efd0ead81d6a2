//! Main entry point for the stream multiplexer binary
//!
//! Runs one worker per source and acts as a simple consumer: it pulls
//! batches (or single frames) and releases them straight away, logging
//! what it received.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;

use shared::{logging, process_debug, process_info, ProcessId};
use streammux::{MuxConfig, SourceConfig, StreamMux, StreamMuxResult};

/// Supervises one frame-producing worker per video source
#[derive(Parser)]
#[command(name = "streammux")]
#[command(about = "Multiplexes frames from many isolated video worker processes")]
pub struct Args {
    /// JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Source as ID=URL (repeatable), e.g. --source 0=test://640x480?fps=25
    #[arg(long = "source")]
    pub sources: Vec<String>,

    /// Worker executable (defaults to `producer` next to this binary)
    #[arg(long)]
    pub worker_path: Option<PathBuf>,

    /// Frames per batch; 0 pulls single frames instead
    #[arg(long, default_value = "0")]
    pub batch_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Override the staleness window
    #[arg(long)]
    pub staleness_secs: Option<f64>,

    /// Override the cool-down before respawn
    #[arg(long)]
    pub cooldown_secs: Option<f64>,
}

impl Args {
    fn into_config(self) -> StreamMuxResult<MuxConfig> {
        let mut config = match &self.config {
            Some(path) => MuxConfig::from_file(path)?,
            None => MuxConfig::default(),
        };
        for spec in &self.sources {
            config.sources.push(SourceConfig::parse(spec)?);
        }
        if let Some(path) = self.worker_path {
            config.worker_path = Some(path);
        }
        if let Some(secs) = self.staleness_secs {
            config.staleness_window = seconds(secs)?;
            config.negotiation_timeout = config.negotiation_timeout.max(config.staleness_window);
        }
        if let Some(secs) = self.cooldown_secs {
            config.cooldown = seconds(secs)?;
        }
        Ok(config)
    }
}

fn seconds(value: f64) -> StreamMuxResult<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| streammux::StreamMuxError::config(format!("invalid duration {value}: {e}")))
}

#[tokio::main]
async fn main() -> StreamMuxResult<()> {
    let args = Args::parse();

    ProcessId::init_muxer();
    logging::init_tracing_with_level(Some(&args.log_level));
    logging::log_startup(ProcessId::current(), "stream multiplexer");

    let log_level = args.log_level.clone();
    let batch_size = args.batch_size;
    let config = args.into_config()?;

    let mut mux = StreamMux::from_config(config, &log_level)?;
    mux.start();

    let mut poll = tokio::time::interval(Duration::from_millis(5));
    let mut handed_out: u64 = 0;
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                process_info!(ProcessId::current(), "Interrupt received after {} frames", handed_out);
                break;
            }
            _ = poll.tick() => {
                handed_out += consume(&mux, batch_size) as u64;
            }
        }
    }

    mux.shutdown().await;
    logging::log_success(ProcessId::current(), "Stream multiplexer stopped");
    Ok(())
}

/// Pull whatever is ready and give it straight back
fn consume(mux: &StreamMux, batch_size: usize) -> usize {
    let frames = if batch_size == 0 {
        mux.pull_one().into_iter().collect::<Vec<_>>()
    } else {
        mux.pull_batch(batch_size).unwrap_or_default()
    };

    for frame in &frames {
        process_debug!(
            ProcessId::current(),
            "{} frame #{} {}x{} ({} bytes)",
            frame.worker,
            frame.sequence,
            frame.width,
            frame.height,
            frame.data.len()
        );
        if let Err(e) = mux.release(frame.worker) {
            logging::log_error(ProcessId::current(), "Release", &e);
        }
    }
    frames.len()
}
