//! Publication frames
//!
//! A publication frame carries one batch of samples to one subscriber, over
//! UDP when the subscriber opened a data channel, otherwise wrapped in a
//! `ServerMessage::DataPacket` on the command channel.
//!
//! ```text
//! ┌─────────┬───────────┬──────────────┬──────────────────────────┐
//! │ 1 byte  │ 1 byte    │ 4 bytes (BE) │ N bytes                  │
//! │ flags   │ key index │ payload len  │ payload                  │
//! └─────────┴───────────┴──────────────┴──────────────────────────┘
//! ```
//!
//! Plain payload: `u32` sample count followed by 36-byte samples
//! (GUID, `f64` value, `i64` ticks, `u32` flags). Encrypted payload:
//! 24-byte nonce followed by the ciphertext of a plain payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::measurement::{Measurement, StateFlags};
use crate::wire::{ensure, get_guid, get_u8, get_u32, put_guid};
use crate::{GUID_LENGTH, Result};

/// Encoded size of one sample
pub const SAMPLE_SIZE: usize = GUID_LENGTH + 8 + 8 + 4;

/// Frame header size (flags + key index + payload length)
pub const FRAME_HEADER_SIZE: usize = 6;

/// Frame flag: payload is encrypted
pub const FLAG_ENCRYPTED: u8 = 0x01;

/// One publication frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// Payload is nonce + ciphertext rather than plain samples
    pub encrypted: bool,
    /// Cipher key index used (0 when not encrypted)
    pub key_index: u8,
    /// Frame payload
    pub payload: Bytes,
}

impl DataFrame {
    /// Frame carrying a plain sample payload
    pub fn plain(payload: Bytes) -> Self {
        Self {
            encrypted: false,
            key_index: 0,
            payload,
        }
    }

    /// Frame carrying an encrypted payload
    pub fn encrypted(key_index: u8, payload: Bytes) -> Self {
        Self {
            encrypted: true,
            key_index,
            payload,
        }
    }

    /// Total encoded size
    #[inline]
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }

    /// Encode frame to bytes
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub(crate) fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(if self.encrypted { FLAG_ENCRYPTED } else { 0 });
        buf.put_u8(self.key_index);
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
    }

    /// Decode a complete frame, rejecting trailing bytes
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        let frame = Self::decode_from(&mut buf)?;
        if buf.has_remaining() {
            return Err(ProtocolError::length_mismatch(
                frame.payload.len(),
                frame.payload.len() + buf.remaining(),
            ));
        }
        Ok(frame)
    }

    pub(crate) fn decode_from(buf: &mut Bytes) -> Result<Self> {
        let flags = get_u8(buf, "frame flags")?;
        let key_index = get_u8(buf, "frame key index")?;
        let len = get_u32(buf, "frame length")? as usize;
        if buf.remaining() < len {
            return Err(ProtocolError::length_mismatch(len, buf.remaining()));
        }
        Ok(Self {
            encrypted: flags & FLAG_ENCRYPTED != 0,
            key_index,
            payload: buf.split_to(len),
        })
    }
}

/// Encode samples into a plain frame payload
pub fn encode_samples<'a, I>(samples: I) -> Bytes
where
    I: IntoIterator<Item = &'a Measurement>,
    I::IntoIter: ExactSizeIterator,
{
    let samples = samples.into_iter();
    let mut buf = BytesMut::with_capacity(4 + samples.len() * SAMPLE_SIZE);
    buf.put_u32(samples.len() as u32);
    for m in samples {
        put_guid(&m.signal_id(), &mut buf);
        buf.put_f64(m.value());
        buf.put_i64(m.timestamp());
        buf.put_u32(m.flags().bits());
    }
    buf.freeze()
}

/// Decode a plain frame payload back into samples
pub fn decode_samples(mut buf: Bytes) -> Result<Vec<Measurement>> {
    let count = get_u32(&mut buf, "sample count")? as usize;
    let needed = count.saturating_mul(SAMPLE_SIZE);
    if buf.remaining() != needed {
        return Err(ProtocolError::length_mismatch(needed, buf.remaining()));
    }

    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        let id = get_guid(&mut buf, "sample id")?;
        ensure(&buf, 20, "sample body")?;
        let value = buf.get_f64();
        let timestamp = buf.get_i64();
        let flags = StateFlags::from_bits(buf.get_u32());
        samples.push(Measurement::new(id, value, timestamp).with_flags(flags));
    }
    Ok(samples)
}
