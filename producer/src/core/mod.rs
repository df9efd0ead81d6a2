//! Producer core logic

pub mod pattern;
pub mod pipeline;

pub use pattern::Pattern;
pub use pipeline::{Pipeline, PipelineStats, Step};
