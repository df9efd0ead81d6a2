//! Core multiplexer logic
//!
//! The lifecycle state machine and watchdog are pure; the supervisor,
//! multiplexer and frame reader act on descriptors but reach processes only
//! through the `ProcessManager` trait.

pub mod frame_reader;
pub mod frame_store;
pub mod lifecycle;
pub mod multiplexer;
pub mod stats;
pub mod supervisor;
pub mod watchdog;
pub mod worker;

pub use frame_reader::read_frames;
pub use frame_store::{Frame, FrameInfo, FrameStore};
pub use lifecycle::{transition, Effect, LifecycleEvent, Transition, WorkerState};
pub use multiplexer::EventMultiplexer;
pub use stats::ThroughputMeter;
pub use supervisor::{Supervisor, SupervisorPolicy};
pub use watchdog::WatchdogPolicy;
pub use worker::{Worker, WorkerChannels, WorkerHealth};
