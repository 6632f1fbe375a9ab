//! Helpers shared by the unit tests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tsp_cipher::CipherState;
use tsp_protocol::{KeyMaterial, LENGTH_PREFIX_SIZE, Measurement, ServerMessage};
use uuid::Uuid;

use crate::registry::SessionRegistry;
use crate::session::{Negotiated, Outbound, Session, SessionLimits};

pub const MAX_FAILURES: u32 = 3;

pub fn peer() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

pub fn limits() -> SessionLimits {
    SessionLimits {
        write_timeout: Duration::from_millis(100),
        max_write_failures: MAX_FAILURES,
    }
}

/// Register a session in `Connecting` state with a queue of the given depth
pub fn register(registry: &SessionRegistry, queue: usize) -> (Arc<Session>, mpsc::Receiver<Outbound>) {
    let (tx, rx) = mpsc::channel(queue);
    let session = registry
        .insert_with(|handle, totals| {
            Session::new(handle, peer(), tx, CancellationToken::new(), limits(), totals)
        })
        .unwrap();
    (session, rx)
}

/// Complete the handshake, optionally with encryption
pub fn connect(session: &Session, encrypted: bool) -> Option<KeyMaterial> {
    let (cipher, key) = if encrypted {
        let mut state = CipherState::new(Duration::from_secs(60));
        let key = state.establish().unwrap();
        (Some(Mutex::new(state)), Some(key))
    } else {
        (None, None)
    };
    session
        .negotiate(Negotiated {
            subscriber_info: "unit test".into(),
            data_channel: None,
            compress_metadata: false,
            cipher,
        })
        .unwrap();
    key
}

/// Decode a queued message (strips the length prefix)
pub fn decode(outbound: &Outbound) -> ServerMessage {
    ServerMessage::decode(outbound.bytes.slice(LENGTH_PREFIX_SIZE..)).unwrap()
}

pub fn sample(signal_id: Uuid, value: f64) -> Measurement {
    Measurement::new(signal_id, value, 638_000_000_000_000_000)
}
