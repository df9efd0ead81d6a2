//! Producer binary entry point
//!
//! Exec'd by streammux with the control socket at descriptor 3 and the
//! notification descriptor at 4.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;

use producer::{FrameSink, Pipeline, ShmSink, SourceSpec, Step};
use shared::{logging, process_info, process_warn, EventMask, ProcessId};

#[derive(Parser)]
#[command(name = "producer")]
#[command(about = "Frame producer for one streammux source")]
struct Args {
    /// Worker id assigned by the muxer
    #[arg(long)]
    id: u32,

    /// Source URL
    #[arg(long)]
    source: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    ProcessId::init_worker(args.id);
    logging::init_tracing_with_level(Some(&args.log_level));
    logging::log_startup(ProcessId::current(), &format!("producer for {}", args.source));

    // SAFETY: first thing the process does with descriptors.
    let mut sink = unsafe { ShmSink::from_inherited() }.context("adopting muxer descriptors")?;
    sink.announce(EventMask::CHILD_STARTED).context("announcing start")?;

    let spec = match SourceSpec::parse(&args.source) {
        Ok(spec) => spec,
        Err(e) => {
            logging::log_error(ProcessId::current(), "Source", &e);
            report_exit(&mut sink);
            return Err(e).context("parsing source");
        }
    };

    let mut pipeline = Pipeline::new(spec, sink);
    let step = tokio::select! {
        step = pipeline.run() => step,
        _ = signal::ctrl_c() => {
            process_info!(ProcessId::current(), "Interrupt received");
            Ok(Step::Finished)
        }
    };

    let step = match step {
        Ok(step) => step,
        Err(e) => {
            report_exit(pipeline.sink_mut());
            return Err(e).context("running pipeline");
        }
    };

    match step {
        Step::Crash => {
            process_warn!(ProcessId::current(), "Crashing as requested after {:?}", pipeline.stats());
            std::process::abort();
        }
        Step::Stall => {
            process_warn!(ProcessId::current(), "Stalled after {:?}", pipeline.stats());
            signal::ctrl_c().await.context("waiting for interrupt")?;
        }
        Step::Finished | Step::Continue => {}
    }

    report_exit(pipeline.sink_mut());
    logging::log_success(ProcessId::current(), &format!("Pipeline finished: {:?}", pipeline.stats()));
    Ok(())
}

/// Best effort: the muxer may already be gone
fn report_exit(sink: &mut impl FrameSink) {
    if let Err(e) = sink.announce(EventMask::PIPELINE_EXITED) {
        logging::log_error(ProcessId::current(), "Announcing exit", &e);
    }
}
