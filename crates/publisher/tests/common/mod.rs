//! Minimal subscriber for driving a real publisher in tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tsp_protocol::{
    ClientMessage, HandshakeRequest, KeyMaterial, LENGTH_PREFIX_SIZE, ServerMessage,
    check_message_len, read_length_prefix,
};
use tsp_publisher::{
    ChannelDefinition, ConfigurationFrame, PhasorDefinition, PhasorType, Publisher,
    PublisherCallbacks, PublisherConfig,
};
use uuid::Uuid;

pub const WAIT: Duration = Duration::from_secs(5);

/// Loopback test config on an ephemeral port
pub fn config() -> PublisherConfig {
    PublisherConfig::new(0)
        .with_handshake_timeout(Duration::from_secs(2))
        .with_heartbeat_interval(Duration::from_secs(30))
}

/// Start a publisher and return the loopback address to connect to
pub async fn start(publisher: &Publisher) -> SocketAddr {
    let bound = publisher.initialize().await.unwrap();
    SocketAddr::from(([127, 0, 0, 1], bound.port()))
}

/// Poll until `condition` holds or the wait expires
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Device with frequency, dF/dt, one voltage phasor and one analog
pub fn device_frame(acronym: &str) -> ConfigurationFrame {
    ConfigurationFrame {
        acronym: acronym.into(),
        name: format!("{acronym} substation"),
        unique_id: Uuid::new_v4(),
        id_code: 1,
        frames_per_second: 30,
        frequency_signal_id: Uuid::new_v4(),
        dfdt_signal_id: Uuid::new_v4(),
        phasors: vec![PhasorDefinition {
            label: "Bus 1".into(),
            phasor_type: PhasorType::Voltage,
            phase: '+',
            angle_signal_id: Uuid::new_v4(),
            magnitude_signal_id: Uuid::new_v4(),
        }],
        analogs: vec![ChannelDefinition {
            label: "MW".into(),
            signal_id: Uuid::new_v4(),
        }],
        digitals: Vec::new(),
    }
}

/// Notification recorded by `RecordingCallbacks`
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Status(String),
    Error(String),
    Connected {
        client_id: Uuid,
        subscriber_info: String,
    },
    Disconnected {
        client_id: Uuid,
    },
}

#[derive(Debug, Default)]
pub struct RecordingCallbacks {
    events: Mutex<Vec<Event>>,
}

impl RecordingCallbacks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn has(&self, predicate: impl Fn(&Event) -> bool) -> bool {
        self.events.lock().iter().any(predicate)
    }
}

impl PublisherCallbacks for RecordingCallbacks {
    fn status_message(&self, message: &str) {
        self.events.lock().push(Event::Status(message.into()));
    }

    fn error_message(&self, message: &str) {
        self.events.lock().push(Event::Error(message.into()));
    }

    fn client_connected(&self, client_id: Uuid, _connection_info: &str, subscriber_info: &str) {
        self.events.lock().push(Event::Connected {
            client_id,
            subscriber_info: subscriber_info.into(),
        });
    }

    fn client_disconnected(&self, client_id: Uuid, _connection_info: &str) {
        self.events.lock().push(Event::Disconnected { client_id });
    }
}

/// Command channel client
pub struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self { stream }
    }

    pub async fn send(&mut self, message: &ClientMessage) {
        self.stream.write_all(&message.encode()).await.unwrap();
    }

    /// Next message, or None once the publisher closed the connection
    pub async fn next(&mut self) -> Option<ServerMessage> {
        timeout(WAIT, self.read()).await.expect("no message from publisher")
    }

    /// Next message other than a heartbeat
    pub async fn recv(&mut self) -> ServerMessage {
        loop {
            match self.next().await {
                Some(ServerMessage::NoOp) => continue,
                Some(message) => return message,
                None => panic!("publisher closed the connection"),
            }
        }
    }

    /// Whether the publisher closes the connection (skipping pending messages)
    pub async fn closed(&mut self) -> bool {
        loop {
            match self.next().await {
                None => return true,
                Some(_) => continue,
            }
        }
    }

    async fn read(&mut self) -> Option<ServerMessage> {
        let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
        self.stream.read_exact(&mut len_buf).await.ok()?;
        let len = check_message_len(read_length_prefix(&len_buf)?).unwrap();
        let mut body = BytesMut::zeroed(len);
        self.stream.read_exact(&mut body).await.ok()?;
        Some(ServerMessage::decode(body.freeze()).unwrap())
    }

    /// Send a handshake and return the assigned client id and initial key
    pub async fn handshake(&mut self, request: HandshakeRequest) -> (Uuid, Option<KeyMaterial>) {
        self.send(&ClientMessage::Handshake(request)).await;
        match self.recv().await {
            ServerMessage::HandshakeAck {
                client_id,
                cipher_key,
                ..
            } => (client_id, cipher_key),
            other => panic!("expected handshake ack, got {other:?}"),
        }
    }
}
