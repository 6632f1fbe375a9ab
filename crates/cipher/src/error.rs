//! Cipher error types

use thiserror::Error;

/// Result type for cipher operations
pub type Result<T> = std::result::Result<T, CipherError>;

/// Errors from key handling and frame encryption
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("invalid key length {actual}, expected {expected}")]
    InvalidKeyLength { actual: usize, expected: usize },

    /// Operation requires an established key
    #[error("no active cipher key")]
    NoActiveKey,

    /// Session already has key material
    #[error("cipher key already established")]
    AlreadyEstablished,

    /// Acknowledgement for a key that is not pending
    #[error("unexpected acknowledgement for key index {0}")]
    UnexpectedAcknowledgement(u8),
}
