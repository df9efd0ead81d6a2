//! Producer error types

use shared::SharedError;
use thiserror::Error;

/// Result type for producer operations
pub type ProducerResult<T> = Result<T, ProducerError>;

/// Producer error types
#[derive(Error, Debug)]
pub enum ProducerError {
    #[error("Invalid source '{source_url}': {message}")]
    InvalidSource { source_url: String, message: String },

    #[error("Unsupported source scheme '{scheme}'; decoding is provided by an external pipeline")]
    UnsupportedScheme { scheme: String },

    #[error("Descriptor {fd} was not inherited; run under streammux")]
    MissingDescriptor { fd: i32 },

    #[error("Frame channel error: {0}")]
    Channel(#[from] SharedError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProducerError {
    /// Create an invalid-source error
    pub fn invalid_source(source_url: &str, message: impl Into<String>) -> Self {
        Self::InvalidSource { source_url: source_url.to_string(), message: message.into() }
    }
}
