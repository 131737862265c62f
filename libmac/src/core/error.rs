//! Error types for the codec core

use std::io;
use thiserror::Error;

/// Errors raised by the codec core
#[derive(Error, Debug)]
pub enum MacError {
    #[error("unsupported compression level: {0}")]
    UnsupportedCompressionLevel(u16),

    #[error("unsupported wave format: {0}")]
    UnsupportedFormat(String),

    #[error("residual {value} is outside the range coder's representable range")]
    ResidualOutOfRange { value: i32 },

    #[error("frame {frame} failed its CRC check (stored {stored:#010x}, computed {computed:#010x})")]
    CrcMismatch {
        frame: u32,
        stored: u32,
        computed: u32,
    },

    #[error("codec state is unusable after an earlier fatal error")]
    Poisoned,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for codec operations
pub type MacResult<T> = Result<T, MacError>;
