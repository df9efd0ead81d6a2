//! Shared error types for the frame handoff protocol

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Shared-memory negotiation failed: {message}")]
    Negotiation { message: String },

    #[error("Frame size mismatch: slot holds {expected} bytes, frame has {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Protocol violation: {message}")]
    ProtocolViolation { message: String },

    #[error("Invalid shared region: {message}")]
    InvalidRegion { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("System call failed: {0}")]
    System(#[from] rustix::io::Errno),
}

impl SharedError {
    pub fn negotiation(message: impl Into<String>) -> Self {
        Self::Negotiation { message: message.into() }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolViolation { message: message.into() }
    }

    pub fn region(message: impl Into<String>) -> Self {
        Self::InvalidRegion { message: message.into() }
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
