//! Error types for the protocol

use thiserror::Error;

/// Protocol error
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Length {size} does not fit the frame prefix (max: {max})")]
    LengthOverflow { size: u64, max: u64 },

    #[error("Length prefix must be {expected} bytes, got {actual}")]
    PrefixLength { expected: usize, actual: usize },
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
