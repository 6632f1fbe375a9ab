//! TSP Protocol - Wire types shared by the publisher and its subscribers
//!
//! This crate provides the types that cross the network:
//! - `Measurement` - immutable time-series sample (GUID, value, timestamp, flags)
//! - `DataFrame` - publication frame carrying a batch of samples, optionally encrypted
//! - `ClientMessage` / `ServerMessage` - command channel messages
//!
//! # Design Principles
//!
//! - **Language-neutral**: simple big-endian, length-prefixed layouts instead of
//!   a Rust-specific serializer, so non-Rust subscribers can be written
//! - **Versioned**: handshakes carry `PROTOCOL_VERSION`
//! - **Zero-copy**: payloads are `bytes::Bytes` slices of the receive buffer
//!
//! # Command Channel Framing
//!
//! ```text
//! ┌──────────────┬──────────┬───────────────────────────┐
//! │ 4 bytes      │ 1 byte   │ N bytes                   │
//! │ length (BE)  │ type     │ payload                   │
//! └──────────────┴──────────┴───────────────────────────┘
//! ```
//!
//! The length counts the type byte plus payload.

mod error;
mod frame;
mod measurement;
mod message;
mod wire;

pub use error::ProtocolError;
pub use frame::{DataFrame, FLAG_ENCRYPTED, FRAME_HEADER_SIZE, SAMPLE_SIZE, decode_samples, encode_samples};
pub use measurement::{Measurement, StateFlags};
pub use message::{
    ClientMessage, CommandCode, HandshakeRequest, KeyMaterial, MetadataRequest, ServerMessage,
    SubscribeRequest, check_message_len, read_length_prefix,
};

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Protocol version carried in handshakes
pub const PROTOCOL_VERSION: u8 = 1;

/// Length prefix size (4 bytes, big-endian u32)
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Maximum command channel message size (16MB)
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Symmetric cipher key length in bytes
pub const KEY_LENGTH: usize = 32;

/// GUID length in bytes
pub const GUID_LENGTH: usize = 16;

#[cfg(test)]
mod message_test;
