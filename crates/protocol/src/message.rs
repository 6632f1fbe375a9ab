//! Command channel messages
//!
//! Defines the messages exchanged between the publisher and subscribers on the
//! TCP command channel. Every message is length-prefixed (see crate docs).
//!
//! # Client → Server
//!
//! - `Handshake` (0x01): version, subscriber info, data channel and cipher options
//! - `MetadataRefresh` (0x02): request metadata, optionally filtered by signal
//! - `Subscribe` (0x03): signal set and NaN filter preference
//! - `Unsubscribe` (0x04)
//! - `CipherKeyAck` (0x05): acknowledge a rotated key
//! - `RotateCipherKeys` (0x06): ask for an immediate key rotation
//!
//! # Server → Client
//!
//! - `HandshakeAck` (0x81): assigned client id and initial cipher key
//! - `Succeeded` (0x82) / `Failed` (0x83): command outcome
//! - `Metadata` (0x84): serialized metadata container
//! - `CipherKeys` (0x85): rotated key
//! - `DataPacket` (0x86): publication frame when no data channel is open
//! - `NoOp` (0x87): keep-alive

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::error::ProtocolError;
use crate::frame::DataFrame;
use crate::wire::{
    ensure, get_guid, get_guid_list, get_string, get_u8, get_u16, get_u32, put_guid,
    put_guid_list, put_string,
};
use crate::{KEY_LENGTH, MAX_MESSAGE_SIZE, PROTOCOL_VERSION, Result};

const MSG_HANDSHAKE: u8 = 0x01;
const MSG_METADATA_REFRESH: u8 = 0x02;
const MSG_SUBSCRIBE: u8 = 0x03;
const MSG_UNSUBSCRIBE: u8 = 0x04;
const MSG_CIPHER_KEY_ACK: u8 = 0x05;
const MSG_ROTATE_CIPHER_KEYS: u8 = 0x06;

const MSG_HANDSHAKE_ACK: u8 = 0x81;
const MSG_SUCCEEDED: u8 = 0x82;
const MSG_FAILED: u8 = 0x83;
const MSG_METADATA: u8 = 0x84;
const MSG_CIPHER_KEYS: u8 = 0x85;
const MSG_DATA_PACKET: u8 = 0x86;
const MSG_NOOP: u8 = 0x87;

const HANDSHAKE_DATA_CHANNEL: u8 = 0x01;
const HANDSHAKE_ENCRYPT: u8 = 0x02;
const HANDSHAKE_COMPRESS: u8 = 0x04;

const SUBSCRIBE_FILTER_NAN: u8 = 0x01;

/// Client command a `Succeeded`/`Failed` response refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandCode {
    Handshake = MSG_HANDSHAKE,
    MetadataRefresh = MSG_METADATA_REFRESH,
    Subscribe = MSG_SUBSCRIBE,
    Unsubscribe = MSG_UNSUBSCRIBE,
    CipherKeyAck = MSG_CIPHER_KEY_ACK,
    RotateCipherKeys = MSG_ROTATE_CIPHER_KEYS,
}

impl CommandCode {
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::MetadataRefresh => "metadata_refresh",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::CipherKeyAck => "cipher_key_ack",
            Self::RotateCipherKeys => "rotate_cipher_keys",
        }
    }
}

impl TryFrom<u8> for CommandCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            MSG_HANDSHAKE => Ok(Self::Handshake),
            MSG_METADATA_REFRESH => Ok(Self::MetadataRefresh),
            MSG_SUBSCRIBE => Ok(Self::Subscribe),
            MSG_UNSUBSCRIBE => Ok(Self::Unsubscribe),
            MSG_CIPHER_KEY_ACK => Ok(Self::CipherKeyAck),
            MSG_ROTATE_CIPHER_KEYS => Ok(Self::RotateCipherKeys),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handshake request opening a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Protocol version spoken by the client
    pub version: u8,
    /// Free-form description of the subscriber
    pub subscriber_info: String,
    /// UDP port for the data channel (None = publish on the command channel)
    pub data_channel_port: Option<u16>,
    /// Encrypt publication frames
    pub encrypt: bool,
    /// Accept compressed metadata
    pub compress_metadata: bool,
}

impl Default for HandshakeRequest {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            subscriber_info: String::new(),
            data_channel_port: None,
            encrypt: false,
            compress_metadata: false,
        }
    }
}

impl HandshakeRequest {
    pub fn new(subscriber_info: impl Into<String>) -> Self {
        Self {
            subscriber_info: subscriber_info.into(),
            ..Self::default()
        }
    }

    /// Request publication over UDP to the given port
    pub fn with_data_channel(mut self, port: u16) -> Self {
        self.data_channel_port = Some(port);
        self
    }

    /// Request encrypted publication frames
    pub fn with_encryption(mut self) -> Self {
        self.encrypt = true;
        self
    }

    /// Accept gzip-compressed metadata
    pub fn with_compression(mut self) -> Self {
        self.compress_metadata = true;
        self
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.version);
        put_string(&self.subscriber_info, buf);
        let mut flags = 0;
        if self.data_channel_port.is_some() {
            flags |= HANDSHAKE_DATA_CHANNEL;
        }
        if self.encrypt {
            flags |= HANDSHAKE_ENCRYPT;
        }
        if self.compress_metadata {
            flags |= HANDSHAKE_COMPRESS;
        }
        buf.put_u8(flags);
        if let Some(port) = self.data_channel_port {
            buf.put_u16(port);
        }
    }

    fn decode(buf: &mut Bytes) -> Result<Self> {
        let version = get_u8(buf, "handshake version")?;
        let subscriber_info = get_string(buf, "subscriber info")?;
        let flags = get_u8(buf, "handshake flags")?;
        let data_channel_port = if flags & HANDSHAKE_DATA_CHANNEL != 0 {
            Some(get_u16(buf, "data channel port")?)
        } else {
            None
        };
        Ok(Self {
            version,
            subscriber_info,
            data_channel_port,
            encrypt: flags & HANDSHAKE_ENCRYPT != 0,
            compress_metadata: flags & HANDSHAKE_COMPRESS != 0,
        })
    }
}

/// Metadata refresh request
///
/// `signal_ids` of `None` asks for everything; `Some` restricts the
/// measurement rows to the listed signals.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataRequest {
    pub signal_ids: Option<Vec<Uuid>>,
}

impl MetadataRequest {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filtered(signal_ids: Vec<Uuid>) -> Self {
        Self {
            signal_ids: Some(signal_ids),
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        match &self.signal_ids {
            Some(ids) => {
                buf.put_u8(1);
                put_guid_list(ids, buf);
            }
            None => buf.put_u8(0),
        }
    }

    fn decode(buf: &mut Bytes) -> Result<Self> {
        let signal_ids = match get_u8(buf, "metadata filter flag")? {
            0 => None,
            _ => Some(get_guid_list(buf, "metadata filter")?),
        };
        Ok(Self { signal_ids })
    }
}

/// Subscription request
///
/// An empty signal list subscribes to every signal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubscribeRequest {
    pub signal_ids: Vec<Uuid>,
    /// Drop NaN samples for this session
    pub filter_nan: bool,
}

impl SubscribeRequest {
    /// Subscribe to every signal
    pub fn all() -> Self {
        Self::default()
    }

    /// Subscribe to the listed signals
    pub fn signals(signal_ids: Vec<Uuid>) -> Self {
        Self {
            signal_ids,
            filter_nan: false,
        }
    }

    /// Ask the publisher to drop NaN samples
    pub fn with_nan_filter(mut self) -> Self {
        self.filter_nan = true;
        self
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(if self.filter_nan { SUBSCRIBE_FILTER_NAN } else { 0 });
        put_guid_list(&self.signal_ids, buf);
    }

    fn decode(buf: &mut Bytes) -> Result<Self> {
        let flags = get_u8(buf, "subscribe flags")?;
        let signal_ids = get_guid_list(buf, "subscribe signals")?;
        Ok(Self {
            signal_ids,
            filter_nan: flags & SUBSCRIBE_FILTER_NAN != 0,
        })
    }
}

/// Cipher key as sent on the wire
///
/// Zeroed on drop; `Debug` never prints the key bytes.
#[derive(Clone, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct KeyMaterial {
    pub index: u8,
    pub key: [u8; KEY_LENGTH],
}

impl KeyMaterial {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.index);
        buf.put_slice(&self.key);
    }

    fn decode(buf: &mut Bytes) -> Result<Self> {
        let index = get_u8(buf, "key index")?;
        ensure(buf, KEY_LENGTH, "key material")?;
        let mut key = [0u8; KEY_LENGTH];
        buf.copy_to_slice(&mut key);
        Ok(Self { index, key })
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("index", &self.index)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Messages sent by subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Handshake(HandshakeRequest),
    MetadataRefresh(MetadataRequest),
    Subscribe(SubscribeRequest),
    Unsubscribe,
    CipherKeyAck { key_index: u8 },
    RotateCipherKeys,
}

impl ClientMessage {
    /// Command code for responses to this message
    pub fn command(&self) -> CommandCode {
        match self {
            Self::Handshake(_) => CommandCode::Handshake,
            Self::MetadataRefresh(_) => CommandCode::MetadataRefresh,
            Self::Subscribe(_) => CommandCode::Subscribe,
            Self::Unsubscribe => CommandCode::Unsubscribe,
            Self::CipherKeyAck { .. } => CommandCode::CipherKeyAck,
            Self::RotateCipherKeys => CommandCode::RotateCipherKeys,
        }
    }

    /// Encode message to bytes with length prefix
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u32(0);

        buf.put_u8(self.command().to_u8());
        match self {
            Self::Handshake(req) => req.encode(&mut buf),
            Self::MetadataRefresh(req) => req.encode(&mut buf),
            Self::Subscribe(req) => req.encode(&mut buf),
            Self::CipherKeyAck { key_index } => buf.put_u8(*key_index),
            Self::Unsubscribe | Self::RotateCipherKeys => {}
        }

        finish(buf)
    }

    /// Decode message from bytes (without length prefix)
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        if buf.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let msg = match buf.get_u8() {
            MSG_HANDSHAKE => Self::Handshake(HandshakeRequest::decode(&mut buf)?),
            MSG_METADATA_REFRESH => Self::MetadataRefresh(MetadataRequest::decode(&mut buf)?),
            MSG_SUBSCRIBE => Self::Subscribe(SubscribeRequest::decode(&mut buf)?),
            MSG_UNSUBSCRIBE => Self::Unsubscribe,
            MSG_CIPHER_KEY_ACK => Self::CipherKeyAck {
                key_index: get_u8(&mut buf, "cipher key ack")?,
            },
            MSG_ROTATE_CIPHER_KEYS => Self::RotateCipherKeys,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        };

        reject_trailing(&buf)?;
        Ok(msg)
    }
}

/// Messages sent by the publisher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    HandshakeAck {
        version: u8,
        client_id: Uuid,
        cipher_key: Option<KeyMaterial>,
    },
    Succeeded {
        command: CommandCode,
        message: String,
    },
    Failed {
        command: CommandCode,
        message: String,
    },
    Metadata {
        compressed: bool,
        payload: Bytes,
    },
    CipherKeys(KeyMaterial),
    DataPacket(DataFrame),
    NoOp,
}

impl ServerMessage {
    pub fn succeeded(command: CommandCode, message: impl Into<String>) -> Self {
        Self::Succeeded {
            command,
            message: message.into(),
        }
    }

    pub fn failed(command: CommandCode, message: impl Into<String>) -> Self {
        Self::Failed {
            command,
            message: message.into(),
        }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HandshakeAck { .. } => "handshake_ack",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
            Self::Metadata { .. } => "metadata",
            Self::CipherKeys(_) => "cipher_keys",
            Self::DataPacket(_) => "data_packet",
            Self::NoOp => "noop",
        }
    }

    /// Encode message to bytes with length prefix
    pub fn encode(&self) -> Bytes {
        let capacity = match self {
            Self::Metadata { payload, .. } => payload.len() + 16,
            Self::DataPacket(frame) => frame.encoded_len() + 8,
            _ => 64,
        };
        let mut buf = BytesMut::with_capacity(capacity);
        buf.put_u32(0);

        match self {
            Self::HandshakeAck {
                version,
                client_id,
                cipher_key,
            } => {
                buf.put_u8(MSG_HANDSHAKE_ACK);
                buf.put_u8(*version);
                put_guid(client_id, &mut buf);
                match cipher_key {
                    Some(key) => {
                        buf.put_u8(1);
                        key.encode(&mut buf);
                    }
                    None => buf.put_u8(0),
                }
            }
            Self::Succeeded { command, message } => {
                buf.put_u8(MSG_SUCCEEDED);
                buf.put_u8(command.to_u8());
                put_string(message, &mut buf);
            }
            Self::Failed { command, message } => {
                buf.put_u8(MSG_FAILED);
                buf.put_u8(command.to_u8());
                put_string(message, &mut buf);
            }
            Self::Metadata {
                compressed,
                payload,
            } => {
                buf.put_u8(MSG_METADATA);
                buf.put_u8(u8::from(*compressed));
                buf.put_u32(payload.len() as u32);
                buf.put_slice(payload);
            }
            Self::CipherKeys(key) => {
                buf.put_u8(MSG_CIPHER_KEYS);
                key.encode(&mut buf);
            }
            Self::DataPacket(frame) => {
                buf.put_u8(MSG_DATA_PACKET);
                frame.encode_into(&mut buf);
            }
            Self::NoOp => buf.put_u8(MSG_NOOP),
        }

        finish(buf)
    }

    /// Decode message from bytes (without length prefix)
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        if buf.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let msg = match buf.get_u8() {
            MSG_HANDSHAKE_ACK => {
                let version = get_u8(&mut buf, "handshake ack version")?;
                let client_id = get_guid(&mut buf, "client id")?;
                let cipher_key = match get_u8(&mut buf, "handshake ack key flag")? {
                    0 => None,
                    _ => Some(KeyMaterial::decode(&mut buf)?),
                };
                Self::HandshakeAck {
                    version,
                    client_id,
                    cipher_key,
                }
            }
            MSG_SUCCEEDED => Self::Succeeded {
                command: CommandCode::try_from(get_u8(&mut buf, "response command")?)?,
                message: get_string(&mut buf, "response message")?,
            },
            MSG_FAILED => Self::Failed {
                command: CommandCode::try_from(get_u8(&mut buf, "response command")?)?,
                message: get_string(&mut buf, "response message")?,
            },
            MSG_METADATA => {
                let compressed = get_u8(&mut buf, "metadata flags")? != 0;
                let len = get_u32(&mut buf, "metadata length")? as usize;
                if buf.remaining() < len {
                    return Err(ProtocolError::length_mismatch(len, buf.remaining()));
                }
                Self::Metadata {
                    compressed,
                    payload: buf.split_to(len),
                }
            }
            MSG_CIPHER_KEYS => Self::CipherKeys(KeyMaterial::decode(&mut buf)?),
            MSG_DATA_PACKET => Self::DataPacket(DataFrame::decode_from(&mut buf)?),
            MSG_NOOP => Self::NoOp,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        };

        reject_trailing(&buf)?;
        Ok(msg)
    }
}

/// Read length prefix from buffer
///
/// Returns None if buffer has fewer than 4 bytes.
pub fn read_length_prefix(buf: &[u8]) -> Option<u32> {
    let prefix: [u8; 4] = buf.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(prefix))
}

/// Check a declared message length against the protocol limit
pub fn check_message_len(len: u32) -> Result<usize> {
    if len == 0 {
        return Err(ProtocolError::Empty);
    }
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::message_too_large(
            len as usize,
            MAX_MESSAGE_SIZE as usize,
        ));
    }
    Ok(len as usize)
}

// Write length prefix (excluding the 4-byte length field itself)
fn finish(mut buf: BytesMut) -> Bytes {
    let len = (buf.len() - 4) as u32;
    buf[0..4].copy_from_slice(&len.to_be_bytes());
    buf.freeze()
}

fn reject_trailing(buf: &Bytes) -> Result<()> {
    if buf.has_remaining() {
        return Err(ProtocolError::length_mismatch(0, buf.remaining()));
    }
    Ok(())
}
