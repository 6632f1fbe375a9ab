//! Per-session key state machine

use std::fmt;
use std::time::{Duration, Instant};

use tsp_protocol::{DataFrame, KeyMaterial};

use crate::crypto;
use crate::error::{CipherError, Result};
use crate::key::CipherKey;

/// Observable cipher state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// No key yet; frames cannot be encrypted
    Unkeyed,
    /// One active key
    Keyed,
    /// New key sent, waiting for the subscriber's acknowledgement
    RotationPending,
}

impl KeyState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unkeyed => "unkeyed",
            Self::Keyed => "keyed",
            Self::RotationPending => "rotation_pending",
        }
    }
}

impl fmt::Display for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Slot {
    index: u8,
    key: CipherKey,
}

impl Slot {
    fn material(&self) -> KeyMaterial {
        self.key.to_material(self.index)
    }
}

/// Active/pending key pair for one session
///
/// Frames are only ever encrypted with the active key. A pending key becomes
/// active once the subscriber acknowledges its index; until then the old key
/// stays in use, so frames in flight during a rotation remain decryptable.
pub struct CipherState {
    active: Option<Slot>,
    pending: Option<Slot>,
    rotation_period: Duration,
    last_rotation: Instant,
}

impl CipherState {
    /// Create an unkeyed state; a zero period disables timed rotation
    pub fn new(rotation_period: Duration) -> Self {
        Self {
            active: None,
            pending: None,
            rotation_period,
            last_rotation: Instant::now(),
        }
    }

    pub fn state(&self) -> KeyState {
        match (&self.active, &self.pending) {
            (None, _) => KeyState::Unkeyed,
            (Some(_), None) => KeyState::Keyed,
            (Some(_), Some(_)) => KeyState::RotationPending,
        }
    }

    /// Index of the key frames are currently encrypted with
    pub fn active_index(&self) -> Option<u8> {
        self.active.as_ref().map(|slot| slot.index)
    }

    /// Generate the first key (`Unkeyed → Keyed`)
    ///
    /// The returned material is sent to the subscriber in the handshake
    /// response.
    pub fn establish(&mut self) -> Result<KeyMaterial> {
        if self.active.is_some() {
            return Err(CipherError::AlreadyEstablished);
        }
        let slot = Slot {
            index: 0,
            key: CipherKey::generate(),
        };
        let material = slot.material();
        self.active = Some(slot);
        self.last_rotation = Instant::now();
        Ok(material)
    }

    /// Generate a replacement key (`Keyed → RotationPending`)
    ///
    /// If a rotation is already pending the same pending key is returned so
    /// it can be resent; the subscriber never sees two different keys under
    /// one pending index.
    pub fn begin_rotation(&mut self) -> Result<KeyMaterial> {
        let Some(active) = &self.active else {
            return Err(CipherError::NoActiveKey);
        };
        if let Some(pending) = &self.pending {
            return Ok(pending.material());
        }

        let slot = Slot {
            index: active.index ^ 1,
            key: CipherKey::generate(),
        };
        let material = slot.material();
        self.pending = Some(slot);
        Ok(material)
    }

    /// Subscriber confirmed receipt of the pending key (`RotationPending → Keyed`)
    ///
    /// The old key is dropped (and zeroed) here.
    pub fn acknowledge(&mut self, index: u8) -> Result<()> {
        match self.pending.take() {
            Some(slot) if slot.index == index => {
                self.active = Some(slot);
                self.last_rotation = Instant::now();
                Ok(())
            }
            other => {
                self.pending = other;
                Err(CipherError::UnexpectedAcknowledgement(index))
            }
        }
    }

    /// Discard the pending key after it could not be delivered
    ///
    /// The active key is untouched; the next timer tick starts over.
    pub fn abandon_rotation(&mut self) {
        self.pending = None;
    }

    /// Whether the rotation period has elapsed since the last completed rotation
    pub fn rotation_due(&self, now: Instant) -> bool {
        !self.rotation_period.is_zero()
            && self.active.is_some()
            && now.saturating_duration_since(self.last_rotation) >= self.rotation_period
    }

    pub fn rotation_period(&self) -> Duration {
        self.rotation_period
    }

    pub fn set_rotation_period(&mut self, period: Duration) {
        self.rotation_period = period;
    }

    /// Encrypt a plain sample payload with the active key
    pub fn encrypt_frame(&self, plain: &[u8]) -> Result<DataFrame> {
        let active = self.active.as_ref().ok_or(CipherError::NoActiveKey)?;
        crypto::encrypt_frame(&active.key, active.index, plain)
    }
}

impl fmt::Debug for CipherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherState")
            .field("state", &self.state())
            .field("active_index", &self.active_index())
            .field("rotation_period", &self.rotation_period)
            .finish()
    }
}
