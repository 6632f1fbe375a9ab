//! Protocol error types
//!
//! Errors that can occur when parsing or building protocol messages.

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Message ended before a required field
    #[error("truncated {0}")]
    Truncated(&'static str),

    /// Unknown message type discriminant
    #[error("unknown message type: {0:#04x}")]
    UnknownMessageType(u8),

    /// Unknown command code in a response
    #[error("unknown command code: {0:#04x}")]
    UnknownCommand(u8),

    /// String field is not valid UTF-8
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Message exceeds the maximum size
    #[error("message size {size} exceeds limit {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// Declared length does not match the available payload
    #[error("length mismatch: declared {declared}, available {available}")]
    LengthMismatch { declared: usize, available: usize },

    /// Empty message body
    #[error("empty message")]
    Empty,

    /// Unsupported protocol version
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
}

impl ProtocolError {
    /// Create a message too large error
    #[inline]
    pub fn message_too_large(size: usize, max: usize) -> Self {
        Self::MessageTooLarge { size, max }
    }

    /// Create a length mismatch error
    #[inline]
    pub fn length_mismatch(declared: usize, available: usize) -> Self {
        Self::LengthMismatch {
            declared,
            available,
        }
    }
}
