//! Frame encryption
//!
//! Encrypted payload layout: 24-byte nonce followed by the ciphertext (which
//! carries the 16-byte Poly1305 tag).

use bytes::{BufMut, Bytes, BytesMut};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore;
use rand::rngs::OsRng;
use tsp_protocol::DataFrame;

use crate::error::{CipherError, Result};
use crate::key::CipherKey;

/// XChaCha20 nonce length
pub const NONCE_LENGTH: usize = 24;

/// Poly1305 tag length
pub const TAG_LENGTH: usize = 16;

/// Encrypt a plain sample payload
///
/// `key_index` is authenticated along with the payload so a frame cannot be
/// replayed under the other key slot.
pub fn encrypt_payload(key: &CipherKey, key_index: u8, plain: &[u8]) -> Result<Bytes> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let mut nonce = [0u8; NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce);

    let aad = [key_index];
    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plain,
                aad: &aad,
            },
        )
        .map_err(|e| CipherError::EncryptionFailed(e.to_string()))?;

    let mut out = BytesMut::with_capacity(NONCE_LENGTH + ciphertext.len());
    out.put_slice(&nonce);
    out.put_slice(&ciphertext);
    Ok(out.freeze())
}

/// Decrypt a payload produced by `encrypt_payload`
pub fn decrypt_payload(key: &CipherKey, key_index: u8, payload: &[u8]) -> Result<Bytes> {
    if payload.len() < NONCE_LENGTH {
        return Err(CipherError::DecryptionFailed(format!(
            "payload of {} bytes is shorter than the nonce",
            payload.len()
        )));
    }
    let (nonce, ciphertext) = payload.split_at(NONCE_LENGTH);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let aad = [key_index];
    cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map(Bytes::from)
        .map_err(|e| CipherError::DecryptionFailed(e.to_string()))
}

/// Encrypt a plain payload into an encrypted publication frame
pub fn encrypt_frame(key: &CipherKey, key_index: u8, plain: &[u8]) -> Result<DataFrame> {
    let payload = encrypt_payload(key, key_index, plain)?;
    Ok(DataFrame::encrypted(key_index, payload))
}

/// Recover the plain payload of a publication frame
///
/// Unencrypted frames are returned as-is.
pub fn decrypt_frame(key: &CipherKey, frame: &DataFrame) -> Result<Bytes> {
    if !frame.encrypted {
        return Ok(frame.payload.clone());
    }
    decrypt_payload(key, frame.key_index, &frame.payload)
}
