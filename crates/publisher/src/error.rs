//! Error types for the publisher

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tsp_cipher::CipherError;
use tsp_dataset::DataSetError;
use tsp_protocol::ProtocolError;

/// Errors that can occur in the publisher
///
/// Only `Bind` and `Io` on the listener are fatal to the publisher as a
/// whole; everything else is confined to one session or one call.
#[derive(Error, Debug)]
pub enum PublisherError {
    /// Malformed or out-of-order message from a subscriber
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Unexpected message for the session's current state
    #[error("protocol violation: {0}")]
    UnexpectedMessage(String),

    /// Metadata table, column or field lookup failed
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// Metadata index out of bounds
    #[error("{kind} index {index} out of range")]
    OutOfRange { kind: &'static str, index: usize },

    /// Metadata container error other than a lookup failure
    #[error("metadata error: {0}")]
    Metadata(DataSetError),

    /// Invalid metadata source (missing or unparsable field)
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Write to a session's channel failed or timed out
    #[error("channel write failed: {0}")]
    ChannelWriteFailure(String),

    /// Cipher key could not be generated or delivered
    #[error("cipher key rotation failed: {0}")]
    KeyRotationFailure(#[from] CipherError),

    /// Request refused by publisher policy
    #[error("request denied: {0}")]
    ConfigurationDenied(String),

    /// I/O error (socket operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Listener could not be bound
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Connection limit reached
    #[error("maximum connections reached ({max})")]
    MaxConnections { max: usize },

    /// Operation requires an initialized publisher
    #[error("publisher not initialized")]
    NotInitialized,

    /// Publisher is already running
    #[error("publisher already initialized")]
    AlreadyInitialized,

    /// No live session with this client id
    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),

    /// Handshake not received in time
    #[error("handshake timed out")]
    HandshakeTimeout,
}

impl From<DataSetError> for PublisherError {
    fn from(err: DataSetError) -> Self {
        match err {
            DataSetError::NotFound { kind, name } => Self::NotFound { kind, name },
            DataSetError::OutOfRange { kind, index, .. } => Self::OutOfRange { kind, index },
            other => Self::Metadata(other),
        }
    }
}

impl PublisherError {
    /// Create an UnexpectedMessage error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedMessage(message.into())
    }

    /// Create an InvalidMetadata error
    pub fn invalid_metadata(message: impl Into<String>) -> Self {
        Self::InvalidMetadata(message.into())
    }

    /// Create a ConfigurationDenied error
    pub fn denied(message: impl Into<String>) -> Self {
        Self::ConfigurationDenied(message.into())
    }

    /// Whether this error ends the session it occurred on
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::Protocol(_)
                | Self::UnexpectedMessage(_)
                | Self::Io(_)
                | Self::ChannelWriteFailure(_)
                | Self::HandshakeTimeout
        )
    }
}

/// Result type for publisher operations
pub type Result<T> = std::result::Result<T, PublisherError>;
