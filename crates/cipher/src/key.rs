//! 256-bit symmetric keys

use std::fmt;

use rand::RngCore;
use rand::rngs::OsRng;
use tsp_protocol::{KEY_LENGTH, KeyMaterial};
use zeroize::Zeroize;

use crate::error::{CipherError, Result};

/// Symmetric key for data channel encryption, zeroed on drop
#[derive(Clone, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct CipherKey([u8; KEY_LENGTH]);

impl CipherKey {
    /// Generate a key from the operating system's secure random source
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LENGTH] =
            bytes
                .try_into()
                .map_err(|_| CipherError::InvalidKeyLength {
                    actual: bytes.len(),
                    expected: KEY_LENGTH,
                })?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    /// Wire form of this key under the given index
    pub fn to_material(&self, index: u8) -> KeyMaterial {
        KeyMaterial {
            index,
            key: self.0,
        }
    }
}

impl From<&KeyMaterial> for CipherKey {
    fn from(material: &KeyMaterial) -> Self {
        Self(material.key)
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CipherKey(<redacted>)")
    }
}
