//! Stream multiplexer error types

use shared::{SharedError, WorkerId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamMuxError {
    #[error("Failed to spawn worker {worker}: {reason}")]
    SpawnFailed { worker: WorkerId, reason: String },

    #[error("Unknown worker: {worker}")]
    UnknownWorker { worker: WorkerId },

    #[error("Too many workers: at most {limit} sources are supported")]
    TooManyWorkers { limit: usize },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Shared component error: {0}")]
    Shared(#[from] SharedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("System call failed: {0}")]
    System(#[from] nix::errno::Errno),
}

impl StreamMuxError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a spawn failure for `worker`
    pub fn spawn_failed(worker: WorkerId, reason: impl Into<String>) -> Self {
        Self::SpawnFailed { worker, reason: reason.into() }
    }
}

pub type StreamMuxResult<T> = Result<T, StreamMuxError>;
