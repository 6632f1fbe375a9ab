//! Tests for the command channel messages

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::{
    ClientMessage, CommandCode, DataFrame, HandshakeRequest, KeyMaterial, MAX_MESSAGE_SIZE,
    MetadataRequest, PROTOCOL_VERSION, ProtocolError, ServerMessage, SubscribeRequest,
    check_message_len, read_length_prefix,
};

fn client_roundtrip(msg: ClientMessage) -> ClientMessage {
    let encoded = msg.encode();
    let len = read_length_prefix(&encoded).unwrap() as usize;
    assert_eq!(len, encoded.len() - 4);
    ClientMessage::decode(encoded.slice(4..)).unwrap()
}

fn server_roundtrip(msg: ServerMessage) -> ServerMessage {
    let encoded = msg.encode();
    let len = read_length_prefix(&encoded).unwrap() as usize;
    assert_eq!(len, encoded.len() - 4);
    ServerMessage::decode(encoded.slice(4..)).unwrap()
}

// ============================================================================
// Client messages
// ============================================================================

#[test]
fn test_handshake_defaults() {
    let req = HandshakeRequest::new("historian");
    assert_eq!(req.version, PROTOCOL_VERSION);
    assert!(req.data_channel_port.is_none());
    assert!(!req.encrypt);

    let msg = ClientMessage::Handshake(req);
    assert_eq!(client_roundtrip(msg.clone()), msg);
}

#[test]
fn test_handshake_with_options() {
    let msg = ClientMessage::Handshake(
        HandshakeRequest::new("pdc-01")
            .with_data_channel(9500)
            .with_encryption()
            .with_compression(),
    );
    assert_eq!(client_roundtrip(msg.clone()), msg);
}

#[test]
fn test_metadata_refresh_filter_distinguishes_none_and_empty() {
    let all = ClientMessage::MetadataRefresh(MetadataRequest::all());
    let empty = ClientMessage::MetadataRefresh(MetadataRequest::filtered(vec![]));

    assert_eq!(client_roundtrip(all.clone()), all);
    assert_eq!(client_roundtrip(empty.clone()), empty);
    assert_ne!(all.encode(), empty.encode());
}

#[test]
fn test_subscribe_roundtrip() {
    let msg = ClientMessage::Subscribe(
        SubscribeRequest::signals(vec![Uuid::new_v4(), Uuid::new_v4()]).with_nan_filter(),
    );
    assert_eq!(client_roundtrip(msg.clone()), msg);
}

#[test]
fn test_bodyless_client_messages() {
    for msg in [
        ClientMessage::Unsubscribe,
        ClientMessage::RotateCipherKeys,
        ClientMessage::CipherKeyAck { key_index: 1 },
    ] {
        assert_eq!(client_roundtrip(msg.clone()), msg);
    }
}

#[test]
fn test_command_codes() {
    assert_eq!(
        ClientMessage::Subscribe(SubscribeRequest::all()).command(),
        CommandCode::Subscribe
    );
    assert_eq!(CommandCode::try_from(0x02).unwrap(), CommandCode::MetadataRefresh);
    assert!(matches!(
        CommandCode::try_from(0x7f),
        Err(ProtocolError::UnknownCommand(0x7f))
    ));
    assert_eq!(CommandCode::CipherKeyAck.to_string(), "cipher_key_ack");
}

#[test]
fn test_client_decode_errors() {
    assert!(matches!(
        ClientMessage::decode(Bytes::new()),
        Err(ProtocolError::Empty)
    ));
    assert!(matches!(
        ClientMessage::decode(Bytes::from_static(&[0x42])),
        Err(ProtocolError::UnknownMessageType(0x42))
    ));
    // Subscribe claiming one GUID with none present
    assert!(matches!(
        ClientMessage::decode(Bytes::from_static(&[0x03, 0x00, 0, 0, 0, 1])),
        Err(ProtocolError::Truncated(_))
    ));
}

#[test]
fn test_client_trailing_bytes_rejected() {
    let mut buf = BytesMut::new();
    buf.put_u8(0x04);
    buf.put_u8(0x00);

    assert!(matches!(
        ClientMessage::decode(buf.freeze()),
        Err(ProtocolError::LengthMismatch { .. })
    ));
}

#[test]
fn test_invalid_utf8_subscriber_info() {
    let mut buf = BytesMut::new();
    buf.put_u8(0x01);
    buf.put_u8(PROTOCOL_VERSION);
    buf.put_u32(2);
    buf.put_slice(&[0xff, 0xfe]);
    buf.put_u8(0);

    assert!(matches!(
        ClientMessage::decode(buf.freeze()),
        Err(ProtocolError::InvalidUtf8(_))
    ));
}

// ============================================================================
// Server messages
// ============================================================================

#[test]
fn test_handshake_ack_with_key() {
    let msg = ServerMessage::HandshakeAck {
        version: PROTOCOL_VERSION,
        client_id: Uuid::new_v4(),
        cipher_key: Some(KeyMaterial {
            index: 0,
            key: [7u8; 32],
        }),
    };
    assert_eq!(server_roundtrip(msg.clone()), msg);
}

#[test]
fn test_handshake_ack_without_key() {
    let msg = ServerMessage::HandshakeAck {
        version: PROTOCOL_VERSION,
        client_id: Uuid::nil(),
        cipher_key: None,
    };
    assert_eq!(server_roundtrip(msg.clone()), msg);
}

#[test]
fn test_responses_roundtrip() {
    let ok = ServerMessage::succeeded(CommandCode::Subscribe, "subscribed to 3 signals");
    let failed = ServerMessage::failed(CommandCode::MetadataRefresh, "metadata refresh denied");

    assert_eq!(server_roundtrip(ok.clone()), ok);
    assert_eq!(server_roundtrip(failed.clone()), failed);
    assert_eq!(failed.kind(), "failed");
}

#[test]
fn test_metadata_and_data_packet_roundtrip() {
    let metadata = ServerMessage::Metadata {
        compressed: true,
        payload: Bytes::from_static(b"\x1f\x8b..."),
    };
    let packet = ServerMessage::DataPacket(DataFrame::encrypted(1, Bytes::from_static(b"xyz")));

    assert_eq!(server_roundtrip(metadata.clone()), metadata);
    assert_eq!(server_roundtrip(packet.clone()), packet);
}

#[test]
fn test_cipher_keys_and_noop() {
    let keys = ServerMessage::CipherKeys(KeyMaterial {
        index: 1,
        key: [0xab; 32],
    });
    assert_eq!(server_roundtrip(keys.clone()), keys);
    assert_eq!(server_roundtrip(ServerMessage::NoOp), ServerMessage::NoOp);
}

#[test]
fn test_key_material_debug_redacts() {
    let key = KeyMaterial {
        index: 0,
        key: [0x5a; 32],
    };
    let debug = format!("{key:?}");

    assert!(debug.contains("redacted"));
    assert!(!debug.contains("90"));
}

#[test]
fn test_server_metadata_truncated() {
    let mut buf = BytesMut::new();
    buf.put_u8(0x84);
    buf.put_u8(0);
    buf.put_u32(100);
    buf.put_slice(b"short");

    assert!(matches!(
        ServerMessage::decode(buf.freeze()),
        Err(ProtocolError::LengthMismatch { .. })
    ));
}

// ============================================================================
// Framing helpers
// ============================================================================

#[test]
fn test_read_length_prefix() {
    assert_eq!(read_length_prefix(&[0, 0, 1, 0]), Some(256));
    assert_eq!(read_length_prefix(&[0, 0, 1, 0, 9]), Some(256));
    assert_eq!(read_length_prefix(&[0, 0, 1]), None);
}

#[test]
fn test_check_message_len() {
    assert_eq!(check_message_len(12).unwrap(), 12);
    assert!(matches!(check_message_len(0), Err(ProtocolError::Empty)));
    assert!(matches!(
        check_message_len(MAX_MESSAGE_SIZE + 1),
        Err(ProtocolError::MessageTooLarge { .. })
    ));
}
