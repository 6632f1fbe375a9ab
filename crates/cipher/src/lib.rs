//! TSP Cipher - Data channel encryption for subscriber sessions
//!
//! Each session that asks for an encrypted data channel owns a `CipherState`.
//! The state holds at most two keys: the active key every outgoing frame is
//! encrypted with, and a pending key that has been sent to the subscriber but
//! not yet acknowledged.
//!
//! ```text
//!            establish()          begin_rotation()
//! Unkeyed ───────────────▶ Keyed ─────────────────▶ RotationPending
//!                            ▲                            │
//!                            │      acknowledge(index)    │
//!                            └────────────────────────────┘
//!                                   abandon_rotation()
//! ```
//!
//! Frames are encrypted with XChaCha20-Poly1305 under a fresh random 192-bit
//! nonce per frame; the key index is bound as associated data.

mod crypto;
mod error;
mod key;
mod state;

pub use crypto::{NONCE_LENGTH, TAG_LENGTH, decrypt_frame, decrypt_payload, encrypt_frame, encrypt_payload};
pub use error::{CipherError, Result};
pub use key::CipherKey;
pub use state::{CipherState, KeyState};

pub use tsp_protocol::KEY_LENGTH;
