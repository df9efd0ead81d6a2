//! Process-aware tracing for the muxer and its workers
//!
//! Every record carries the emitting process (`streammux` or `worker_N`) and
//! a wall-clock stamp, so interleaved output from the muxer and its children
//! can be told apart.

use crate::types::ProcessId;
use chrono::{DateTime, Utc};
use std::fmt::Display;
use tracing::{error, info};

/// Filter directive for a process role at `base_level`
fn filter_directive(process_id: &ProcessId, base_level: &str) -> String {
    let own_crate = match process_id {
        ProcessId::Muxer => "streammux",
        ProcessId::Worker(_) => "producer",
    };
    format!("{own_crate}={base_level},shared={base_level}")
}

/// Install the fmt subscriber for the current process role
///
/// `ProcessId::init_*` should run first. A second call keeps the first
/// subscriber, which lets tests call it freely.
pub fn init_tracing_with_level(log_level: Option<&str>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let directive = filter_directive(ProcessId::current(), log_level.unwrap_or("info"));
    let _ = fmt()
        .with_env_filter(EnvFilter::new(directive))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Wall-clock stamp attached to every process-aware record
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Emit a tracing event tagged with the process and timestamp
#[doc(hidden)]
#[macro_export]
macro_rules! process_event {
    ($level:expr, $process_id:expr, $($arg:tt)*) => {
        tracing::event!(
            $level,
            process = %$process_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        )
    };
}

#[macro_export]
macro_rules! process_info {
    ($process_id:expr, $($arg:tt)*) => {
        $crate::process_event!(tracing::Level::INFO, $process_id, $($arg)*)
    };
}

#[macro_export]
macro_rules! process_warn {
    ($process_id:expr, $($arg:tt)*) => {
        $crate::process_event!(tracing::Level::WARN, $process_id, $($arg)*)
    };
}

#[macro_export]
macro_rules! process_debug {
    ($process_id:expr, $($arg:tt)*) => {
        $crate::process_event!(tracing::Level::DEBUG, $process_id, $($arg)*)
    };
}

pub fn log_startup(process_id: &ProcessId, details: &str) {
    info!(process = %process_id, timestamp = format_timestamp(), "🚀 Starting {}", details);
}

pub fn log_shutdown(process_id: &ProcessId, reason: &str) {
    info!(process = %process_id, timestamp = format_timestamp(), "🛑 Shutting down: {}", reason);
}

/// Log a failed operation with the error as a structured field
pub fn log_error(process_id: &ProcessId, context: &str, error: &dyn Display) {
    error!(
        process = %process_id,
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}

pub fn log_success(process_id: &ProcessId, message: &str) {
    info!(process = %process_id, timestamp = format_timestamp(), "✅ {}", message);
}

/// One worker lifecycle state change
pub fn log_transition(
    process_id: &ProcessId,
    worker: &dyn Display,
    from: &dyn Display,
    to: &dyn Display,
    cause: &dyn std::fmt::Debug,
    generation: u32,
    pid: Option<i32>,
) {
    info!(
        process = %process_id,
        timestamp = format_timestamp(),
        worker = %worker,
        generation,
        pid = ?pid,
        "🔄 {} {} -> {} on {:?}",
        worker,
        from,
        to,
        cause
    );
}
