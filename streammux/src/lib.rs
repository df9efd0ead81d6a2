//! Stream multiplexer library
//!
//! Supervises one isolated decode process per video source, collects their
//! frames through single-slot shared-memory channels and serves the latest
//! frame of each source to a consumer with fair selection and batching.

pub mod config;
pub mod core;
pub mod error;
pub mod muxer;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use config::{MuxConfig, SourceConfig};
pub use crate::core::{Frame, FrameStore, LifecycleEvent, Supervisor, WorkerHealth, WorkerState};
pub use error::{StreamMuxError, StreamMuxResult};
pub use muxer::{MuxState, StreamMux};
pub use traits::{MockProcessManager, ProcessManager, ReapStatus};
