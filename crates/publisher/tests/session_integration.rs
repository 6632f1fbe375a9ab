//! End-to-end publisher scenarios over loopback sockets

mod common;

use std::time::Duration;

use tokio::net::UdpSocket;
use tsp_cipher::{CipherKey, decrypt_frame};
use tsp_dataset::DataSet;
use tsp_protocol::{
    ClientMessage, CommandCode, DataFrame, HandshakeRequest, Measurement, MetadataRequest,
    ServerMessage, SubscribeRequest, decode_samples,
};
use tsp_publisher::metadata::{DEVICE_TABLE, MEASUREMENT_TABLE, PHASOR_TABLE};
use tsp_publisher::{Publisher, PublisherError};
use uuid::Uuid;

use common::{Event, RecordingCallbacks, TestClient, config, device_frame, start, wait_for};

fn sample(signal_id: Uuid, value: f64) -> Measurement {
    Measurement::new(signal_id, value, 638_400_000_000_000_000)
}

fn samples_in(message: ServerMessage) -> Vec<Measurement> {
    match message {
        ServerMessage::DataPacket(frame) => decode_samples(frame.payload).unwrap(),
        other => panic!("expected data packet, got {other:?}"),
    }
}

/// Publish one sample and read the datagram it produced
async fn publish_and_receive(
    publisher: &Publisher,
    udp: &UdpSocket,
    signal: Uuid,
    value: f64,
) -> DataFrame {
    publisher.publish_measurements(&[sample(signal, value)]);
    let mut buf = vec![0u8; 65_536];
    let len = tokio::time::timeout(common::WAIT, udp.recv(&mut buf))
        .await
        .unwrap()
        .unwrap();
    DataFrame::decode(bytes::Bytes::copy_from_slice(&buf[..len])).unwrap()
}

async fn subscribe(client: &mut TestClient, request: SubscribeRequest) {
    client.send(&ClientMessage::Subscribe(request)).await;
    assert!(matches!(
        client.recv().await,
        ServerMessage::Succeeded {
            command: CommandCode::Subscribe,
            ..
        }
    ));
}

#[tokio::test]
async fn test_metadata_subscribe_and_nan_filtering() {
    let callbacks = RecordingCallbacks::new();
    let publisher = Publisher::with_callbacks(config(), callbacks.clone());
    let frame = device_frame("SHELBY");
    publisher.define_metadata_from_frames(&[frame.clone()], None).unwrap();
    let addr = start(&publisher).await;

    let mut client = TestClient::connect(addr).await;
    let (client_id, key) = client.handshake(HandshakeRequest::new("scenario client")).await;
    assert!(key.is_none());
    wait_for(|| {
        callbacks.has(|e| {
            *e == Event::Connected {
                client_id,
                subscriber_info: "scenario client".into(),
            }
        })
    })
    .await;
    assert!(publisher.is_connected());

    // full metadata
    client
        .send(&ClientMessage::MetadataRefresh(MetadataRequest::all()))
        .await;
    let ServerMessage::Metadata { compressed, payload } = client.recv().await else {
        panic!("expected metadata");
    };
    assert!(!compressed);
    let dataset = DataSet::decode(payload).unwrap();
    assert_eq!(dataset.table(DEVICE_TABLE).unwrap().row_count(), 1);
    assert_eq!(dataset.table(MEASUREMENT_TABLE).unwrap().row_count(), 5);
    assert_eq!(dataset.table(PHASOR_TABLE).unwrap().row_count(), 1);

    // subscribe to {A, B} with NaN filtering
    let a = frame.frequency_signal_id;
    let b = frame.phasors[0].magnitude_signal_id;
    let c = frame.analogs[0].signal_id;
    subscribe(&mut client, SubscribeRequest::signals(vec![a, b]).with_nan_filter()).await;

    let outcome =
        publisher.publish_measurements(&[sample(a, f64::NAN), sample(b, 3.25), sample(c, 2.5)]);
    assert_eq!(outcome.delivered, 1);

    let samples = samples_in(client.recv().await);
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].signal_id(), b);
    assert_eq!(samples[0].value(), 3.25);

    wait_for(|| publisher.total_measurements_sent() == 1).await;
    assert!(publisher.total_command_channel_bytes_sent() > 0);
    assert_eq!(publisher.total_data_channel_bytes_sent(), 0);

    publisher.shutdown().await;
}

#[tokio::test]
async fn test_metadata_refresh_denied() {
    let publisher = Publisher::new(config().with_metadata_refresh(false));
    publisher
        .define_metadata_from_frames(&[device_frame("SHELBY")], None)
        .unwrap();
    let addr = start(&publisher).await;

    let mut client = TestClient::connect(addr).await;
    client.handshake(HandshakeRequest::new("denied")).await;

    for request in [MetadataRequest::all(), MetadataRequest::filtered(vec![Uuid::new_v4()])] {
        client.send(&ClientMessage::MetadataRefresh(request)).await;
        match client.recv().await {
            ServerMessage::Failed { command, message } => {
                assert_eq!(command, CommandCode::MetadataRefresh);
                assert!(message.contains("disabled"));
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }

    // the denial does not drop the connection
    publisher.set_metadata_refresh_allowed(true);
    client
        .send(&ClientMessage::MetadataRefresh(MetadataRequest::all()))
        .await;
    assert!(matches!(client.recv().await, ServerMessage::Metadata { .. }));

    publisher.shutdown().await;
}

#[tokio::test]
async fn test_compressed_metadata_on_request() {
    let publisher = Publisher::new(config());
    publisher
        .define_metadata_from_frames(&[device_frame("SHELBY")], None)
        .unwrap();
    let addr = start(&publisher).await;

    let mut client = TestClient::connect(addr).await;
    client
        .handshake(HandshakeRequest::new("gzip").with_compression())
        .await;
    client
        .send(&ClientMessage::MetadataRefresh(MetadataRequest::all()))
        .await;

    let ServerMessage::Metadata { compressed, payload } = client.recv().await else {
        panic!("expected metadata");
    };
    assert!(compressed);
    let dataset = DataSet::decode_compressed(&payload).unwrap();
    assert_eq!(
        dataset.encode().unwrap(),
        publisher.metadata().unwrap().encode().unwrap()
    );

    publisher.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_requires_metadata() {
    let publisher = Publisher::new(config());
    let addr = start(&publisher).await;

    let mut client = TestClient::connect(addr).await;
    client.handshake(HandshakeRequest::new("early")).await;
    client
        .send(&ClientMessage::Subscribe(SubscribeRequest::all()))
        .await;
    assert!(matches!(
        client.recv().await,
        ServerMessage::Failed {
            command: CommandCode::Subscribe,
            ..
        }
    ));

    publisher.shutdown().await;
}

#[tokio::test]
async fn test_max_connections() {
    let publisher = Publisher::new(config().with_max_connections(1));
    let addr = start(&publisher).await;

    let mut first = TestClient::connect(addr).await;
    first.handshake(HandshakeRequest::new("first")).await;

    let mut second = TestClient::connect(addr).await;
    match second.next().await {
        Some(ServerMessage::Failed { command, message }) => {
            assert_eq!(command, CommandCode::Handshake);
            assert!(message.contains("maximum connections"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(second.closed().await);
    assert_eq!(publisher.session_count(), 1);

    publisher.shutdown().await;
}

#[tokio::test]
async fn test_handshake_timeout() {
    let publisher =
        Publisher::new(config().with_handshake_timeout(Duration::from_millis(200)));
    let addr = start(&publisher).await;

    let mut silent = TestClient::connect(addr).await;
    wait_for(|| publisher.session_count() == 1).await;

    assert!(silent.closed().await);
    wait_for(|| publisher.session_count() == 0).await;

    publisher.shutdown().await;
}

#[tokio::test]
async fn test_protocol_violations_disconnect() {
    let publisher = Publisher::new(config());
    let addr = start(&publisher).await;

    // first message must be a handshake
    let mut client = TestClient::connect(addr).await;
    client
        .send(&ClientMessage::Subscribe(SubscribeRequest::all()))
        .await;
    assert!(matches!(
        client.next().await,
        Some(ServerMessage::Failed { .. })
    ));
    assert!(client.closed().await);

    // unsupported version
    let mut client = TestClient::connect(addr).await;
    let mut request = HandshakeRequest::new("future");
    request.version = 99;
    client.send(&ClientMessage::Handshake(request)).await;
    match client.next().await {
        Some(ServerMessage::Failed { command, message }) => {
            assert_eq!(command, CommandCode::Handshake);
            assert!(message.contains("99"));
        }
        other => panic!("expected version refusal, got {other:?}"),
    }
    assert!(client.closed().await);

    wait_for(|| publisher.session_count() == 0).await;
    publisher.shutdown().await;
}

#[tokio::test]
async fn test_encrypted_data_channel_with_rotation() {
    let publisher = Publisher::new(config());
    let frame = device_frame("SHELBY");
    publisher.define_metadata_from_frames(&[frame.clone()], None).unwrap();
    let addr = start(&publisher).await;
    let signal = frame.frequency_signal_id;

    let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut client = TestClient::connect(addr).await;
    let (_, initial) = client
        .handshake(
            HandshakeRequest::new("secure")
                .with_data_channel(udp.local_addr().unwrap().port())
                .with_encryption(),
        )
        .await;
    let initial = initial.expect("initial key");
    assert_eq!(initial.index, 0);
    subscribe(&mut client, SubscribeRequest::all()).await;

    let first = publish_and_receive(&publisher, &udp, signal, 1.0).await;
    assert!(first.encrypted);
    assert_eq!(first.key_index, 0);
    let plain = decrypt_frame(&CipherKey::from(&initial), &first).unwrap();
    assert_eq!(decode_samples(plain).unwrap()[0].value(), 1.0);

    // request a new key; frames keep using the old one until acknowledged
    client.send(&ClientMessage::RotateCipherKeys).await;
    let ServerMessage::CipherKeys(pending) = client.recv().await else {
        panic!("expected cipher keys");
    };
    assert_eq!(pending.index, 1);
    assert_eq!(
        publish_and_receive(&publisher, &udp, signal, 2.0)
            .await
            .key_index,
        0
    );

    client
        .send(&ClientMessage::CipherKeyAck {
            key_index: pending.index,
        })
        .await;
    assert!(matches!(
        client.recv().await,
        ServerMessage::Succeeded {
            command: CommandCode::CipherKeyAck,
            ..
        }
    ));

    let rotated = publish_and_receive(&publisher, &udp, signal, 3.0).await;
    assert_eq!(rotated.key_index, 1);
    let plain = decrypt_frame(&CipherKey::from(&pending), &rotated).unwrap();
    assert_eq!(decode_samples(plain).unwrap()[0].value(), 3.0);
    assert!(decrypt_frame(&CipherKey::from(&initial), &rotated).is_err());

    wait_for(|| publisher.total_data_channel_bytes_sent() > 0).await;
    assert_eq!(publisher.total_measurements_sent(), 3);

    publisher.shutdown().await;
}

#[tokio::test]
async fn test_timed_rotation() {
    let publisher = Publisher::new(config().with_rotation_period(Duration::from_millis(100)));
    publisher
        .define_metadata_from_frames(&[device_frame("SHELBY")], None)
        .unwrap();
    let addr = start(&publisher).await;

    let mut client = TestClient::connect(addr).await;
    client
        .handshake(HandshakeRequest::new("timed").with_encryption())
        .await;

    let ServerMessage::CipherKeys(key) = client.recv().await else {
        panic!("expected cipher keys");
    };
    assert_eq!(key.index, 1);
    client
        .send(&ClientMessage::CipherKeyAck { key_index: 1 })
        .await;

    // the unacknowledged key may be resent before the ack lands
    loop {
        match client.recv().await {
            ServerMessage::CipherKeys(resent) => assert_eq!(resent, key),
            ServerMessage::Succeeded { command, .. } => {
                assert_eq!(command, CommandCode::CipherKeyAck);
                break;
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    // the next rotation flips back to index 0 with a fresh key
    let ServerMessage::CipherKeys(next) = client.recv().await else {
        panic!("expected cipher keys");
    };
    assert_eq!(next.index, 0);
    assert_ne!(next.key, key.key);

    publisher.shutdown().await;
}

#[tokio::test]
async fn test_unencrypted_session_cannot_rotate() {
    let publisher = Publisher::new(config());
    let addr = start(&publisher).await;

    let mut client = TestClient::connect(addr).await;
    client.handshake(HandshakeRequest::new("plain")).await;
    client.send(&ClientMessage::RotateCipherKeys).await;
    assert!(matches!(
        client.recv().await,
        ServerMessage::Failed {
            command: CommandCode::RotateCipherKeys,
            ..
        }
    ));

    publisher.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_during_publication() {
    let callbacks = RecordingCallbacks::new();
    let publisher = Publisher::with_callbacks(config(), callbacks.clone());
    let frame = device_frame("SHELBY");
    publisher.define_metadata_from_frames(&[frame.clone()], None).unwrap();
    let addr = start(&publisher).await;

    let mut clients = Vec::new();
    for i in 0..3 {
        let mut client = TestClient::connect(addr).await;
        let (id, _) = client.handshake(HandshakeRequest::new(format!("client {i}"))).await;
        subscribe(&mut client, SubscribeRequest::all()).await;
        clients.push((id, client));
    }

    let (dropped_id, dropped) = clients.remove(1);
    let signal = frame.frequency_signal_id;
    let publishing = async {
        for i in 0..50 {
            publisher.publish_measurements(&[sample(signal, f64::from(i))]);
            tokio::task::yield_now().await;
        }
    };
    let disconnecting = async {
        drop(dropped);
    };
    tokio::join!(publishing, disconnecting);

    // the remaining clients get every frame exactly once, in order
    for (_, client) in &mut clients {
        for i in 0..50 {
            let samples = samples_in(client.recv().await);
            assert_eq!(samples.len(), 1);
            assert_eq!(samples[0].value(), f64::from(i));
        }
    }

    wait_for(|| publisher.session_count() == 2).await;
    wait_for(|| callbacks.has(|e| *e == Event::Disconnected { client_id: dropped_id })).await;
    publisher.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_session_by_id() {
    let callbacks = RecordingCallbacks::new();
    let publisher = Publisher::with_callbacks(config(), callbacks.clone());
    let addr = start(&publisher).await;

    let mut client = TestClient::connect(addr).await;
    let (client_id, _) = client.handshake(HandshakeRequest::new("kicked")).await;
    assert_eq!(publisher.client_ids(), vec![client_id]);

    publisher.disconnect_session(client_id).unwrap();
    assert!(client.closed().await);
    wait_for(|| callbacks.has(|e| *e == Event::Disconnected { client_id })).await;
    assert!(!publisher.is_connected());

    assert!(matches!(
        publisher.disconnect_session(client_id),
        Err(PublisherError::SessionNotFound(_))
    ));

    publisher.shutdown().await;
}

#[tokio::test]
async fn test_unsubscribe_stops_publication() {
    let publisher = Publisher::new(config());
    let frame = device_frame("SHELBY");
    publisher.define_metadata_from_frames(&[frame.clone()], None).unwrap();
    let addr = start(&publisher).await;

    let mut client = TestClient::connect(addr).await;
    client.handshake(HandshakeRequest::new("fickle")).await;
    subscribe(&mut client, SubscribeRequest::all()).await;

    client.send(&ClientMessage::Unsubscribe).await;
    assert!(matches!(
        client.recv().await,
        ServerMessage::Succeeded {
            command: CommandCode::Unsubscribe,
            ..
        }
    ));

    let outcome = publisher.publish_measurements(&[sample(frame.frequency_signal_id, 1.0)]);
    assert_eq!(outcome.delivered, 0);
    assert!(publisher.is_connected());

    publisher.shutdown().await;
}

#[tokio::test]
async fn test_lifecycle() {
    let callbacks = RecordingCallbacks::new();
    let publisher = Publisher::with_callbacks(config(), callbacks.clone());
    assert!(!publisher.is_initialized());
    assert!(publisher.local_addr().is_none());
    assert_eq!(
        publisher.publish_measurements(&[sample(Uuid::new_v4(), 1.0)]),
        Default::default()
    );

    let addr = start(&publisher).await;
    assert!(publisher.is_initialized());
    assert!(publisher.data_channel_addr().is_some());
    assert!(matches!(
        publisher.initialize().await,
        Err(PublisherError::AlreadyInitialized)
    ));

    let mut client = TestClient::connect(addr).await;
    client.handshake(HandshakeRequest::new("lifecycle")).await;

    publisher.shutdown().await;
    assert!(!publisher.is_initialized());
    assert!(client.closed().await);
    assert_eq!(publisher.session_count(), 0);
    assert!(callbacks.has(|e| matches!(e, Event::Status(m) if m == "publisher stopped")));

    // a stopped publisher can be started again
    start(&publisher).await;
    assert!(publisher.is_initialized());
    publisher.shutdown().await;
}

#[tokio::test]
async fn test_runtime_settings() {
    let publisher = Publisher::new(config().with_nan_filter(true, false));

    publisher.set_nan_value_filter_forced(true);
    publisher.set_nan_value_filter_allowed(false);
    publisher.set_cipher_key_rotation_period(Duration::from_secs(5));

    assert!(publisher.nan_value_filter_forced());
    assert!(!publisher.nan_value_filter_allowed());
    assert_eq!(publisher.cipher_key_rotation_period(), Duration::from_secs(5));
    assert_eq!(publisher.port(), 0);
    assert!(!publisher.is_ipv6());
}
