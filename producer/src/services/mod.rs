//! Producer services implementations

pub mod shm_sink;

#[cfg(test)]
mod tests;

pub use shm_sink::ShmSink;
