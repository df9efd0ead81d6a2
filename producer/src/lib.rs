//! Frame producer library
//!
//! The child side of the stream multiplexer: adopts the control socket and
//! notification descriptor it was started with, negotiates a shared-memory
//! frame slot and publishes frames into it. Real decoding is external; the
//! built-in `test://` source generates a moving pattern and can inject
//! faults for exercising the supervisor.

pub mod core;
pub mod error;
pub mod services;
pub mod source;
pub mod traits;

// Re-export main types
pub use crate::core::{Pattern, Pipeline, PipelineStats, Step};
pub use error::{ProducerError, ProducerResult};
pub use services::ShmSink;
pub use source::SourceSpec;
pub use traits::{FrameSink, MockFrameSink};
