//! Subscriber sessions
//!
//! Each accepted command channel connection gets a `Session` that tracks:
//! - Client id, peer address and the subscriber's self-description
//! - Negotiated options (data channel endpoint, encryption, compression)
//! - Lifecycle state and the active subscription
//! - Cipher key state (encrypted sessions only)
//! - An outbound queue drained by the connection's writer task
//! - Byte and sample counters

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tsp_cipher::CipherState;
use tsp_protocol::ServerMessage;
use uuid::Uuid;

use crate::error::{PublisherError, Result};
use crate::filter::Subscription;
use crate::registry::SessionHandle;
use crate::stats::SessionStats;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Accepted, waiting for the handshake
    Connecting,
    /// Handshake complete
    Connected,
    /// Receiving publications
    Subscribed,
    /// Closed; about to leave the registry
    Disconnected,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Subscribed => "subscribed",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options agreed during the handshake
pub struct Negotiated {
    pub subscriber_info: String,
    /// UDP endpoint for publication frames (None = command channel)
    pub data_channel: Option<SocketAddr>,
    pub compress_metadata: bool,
    /// Present when the subscriber asked for encryption
    pub cipher: Option<Mutex<CipherState>>,
}

impl fmt::Debug for Negotiated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiated")
            .field("subscriber_info", &self.subscriber_info)
            .field("data_channel", &self.data_channel)
            .field("compress_metadata", &self.compress_metadata)
            .field("encrypted", &self.cipher.is_some())
            .finish()
    }
}

/// Message queued for the connection's writer task
#[derive(Debug)]
pub(crate) struct Outbound {
    pub bytes: Bytes,
    /// Samples carried (counted only once the write succeeds)
    pub measurements: u64,
}

impl Outbound {
    pub fn message(msg: &ServerMessage) -> Self {
        Self {
            bytes: msg.encode(),
            measurements: 0,
        }
    }

    pub fn data(bytes: Bytes, measurements: u64) -> Self {
        Self {
            bytes,
            measurements,
        }
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: SessionState,
    subscription: Option<Arc<Subscription>>,
}

/// One connected subscriber
pub struct Session {
    handle: SessionHandle,
    client_id: Uuid,
    peer: SocketAddr,
    connection_info: String,
    negotiated: OnceLock<Negotiated>,
    lifecycle: RwLock<Lifecycle>,
    outbound: mpsc::Sender<Outbound>,
    write_timeout: Duration,
    write_failures: AtomicU32,
    max_write_failures: u32,
    stats: SessionStats,
    cancel: CancellationToken,
}

/// Per-session limits taken from the publisher config
#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionLimits {
    pub write_timeout: Duration,
    pub max_write_failures: u32,
}

impl Session {
    pub(crate) fn new(
        handle: SessionHandle,
        peer: SocketAddr,
        outbound: mpsc::Sender<Outbound>,
        cancel: CancellationToken,
        limits: SessionLimits,
        totals: Arc<SessionStats>,
    ) -> Self {
        Self {
            handle,
            client_id: Uuid::new_v4(),
            peer,
            connection_info: peer.to_string(),
            negotiated: OnceLock::new(),
            lifecycle: RwLock::new(Lifecycle {
                state: SessionState::Connecting,
                subscription: None,
            }),
            outbound,
            write_timeout: limits.write_timeout,
            write_failures: AtomicU32::new(0),
            max_write_failures: limits.max_write_failures,
            stats: SessionStats::reporting_to(totals),
            cancel,
        }
    }

    #[inline]
    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    #[inline]
    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    #[inline]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Command channel endpoint as text
    #[inline]
    pub fn connection_info(&self) -> &str {
        &self.connection_info
    }

    /// Subscriber's self-description (empty before the handshake)
    pub fn subscriber_info(&self) -> &str {
        self.negotiated
            .get()
            .map(|n| n.subscriber_info.as_str())
            .unwrap_or("")
    }

    pub fn negotiated(&self) -> Option<&Negotiated> {
        self.negotiated.get()
    }

    pub fn data_channel(&self) -> Option<SocketAddr> {
        self.negotiated.get().and_then(|n| n.data_channel)
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher().is_some()
    }

    pub fn cipher(&self) -> Option<&Mutex<CipherState>> {
        self.negotiated.get().and_then(|n| n.cipher.as_ref())
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.read().state
    }

    /// Active subscription (only while `Subscribed`)
    pub fn subscription(&self) -> Option<Arc<Subscription>> {
        let lifecycle = self.lifecycle.read();
        match lifecycle.state {
            SessionState::Subscribed => lifecycle.subscription.clone(),
            _ => None,
        }
    }

    #[inline]
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Complete the handshake (`Connecting → Connected`)
    pub(crate) fn negotiate(&self, negotiated: Negotiated) -> Result<()> {
        let mut lifecycle = self.lifecycle.write();
        if lifecycle.state != SessionState::Connecting {
            return Err(PublisherError::unexpected("handshake already completed"));
        }
        self.negotiated
            .set(negotiated)
            .map_err(|_| PublisherError::unexpected("handshake already completed"))?;
        lifecycle.state = SessionState::Connected;
        Ok(())
    }

    /// Start or replace the subscription (`Connected|Subscribed → Subscribed`)
    pub(crate) fn subscribe(&self, subscription: Subscription) -> Result<()> {
        let mut lifecycle = self.lifecycle.write();
        match lifecycle.state {
            SessionState::Connected | SessionState::Subscribed => {
                lifecycle.state = SessionState::Subscribed;
                lifecycle.subscription = Some(Arc::new(subscription));
                Ok(())
            }
            state => Err(PublisherError::unexpected(format!(
                "cannot subscribe while {state}"
            ))),
        }
    }

    /// Stop publication (`Subscribed → Connected`)
    pub(crate) fn unsubscribe(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.write();
        if lifecycle.state != SessionState::Subscribed {
            return Err(PublisherError::unexpected(format!(
                "cannot unsubscribe while {}",
                lifecycle.state
            )));
        }
        lifecycle.state = SessionState::Connected;
        lifecycle.subscription = None;
        Ok(())
    }

    /// Move to `Disconnected`; returns false if already there
    pub(crate) fn mark_disconnected(&self) -> bool {
        let mut lifecycle = self.lifecycle.write();
        if lifecycle.state == SessionState::Disconnected {
            return false;
        }
        lifecycle.state = SessionState::Disconnected;
        lifecycle.subscription = None;
        true
    }

    /// Ask the connection task to close this session
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    pub fn is_closing(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Queue a control message, waiting (bounded) for queue space
    pub(crate) async fn reply(&self, msg: ServerMessage) -> Result<()> {
        let outbound = Outbound::message(&msg);
        match tokio::time::timeout(self.write_timeout, self.outbound.send(outbound)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(PublisherError::ChannelWriteFailure(
                "session writer closed".into(),
            )),
            Err(_) => Err(PublisherError::ChannelWriteFailure(format!(
                "{} not queued within {:?}",
                msg.kind(),
                self.write_timeout
            ))),
        }
    }

    /// Queue without waiting
    ///
    /// A full queue drops the message and counts as a write failure.
    pub(crate) fn try_send(&self, outbound: Outbound) -> Result<()> {
        self.try_queue(outbound, true)
    }

    /// Queue a control message without waiting
    ///
    /// A full queue drops the message without counting a write failure;
    /// only publication frames count toward the disconnect threshold.
    pub(crate) fn try_send_control(&self, outbound: Outbound) -> Result<()> {
        self.try_queue(outbound, false)
    }

    fn try_queue(&self, outbound: Outbound, count_failure: bool) -> Result<()> {
        match self.outbound.try_send(outbound) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                if count_failure {
                    self.record_failure();
                }
                Err(PublisherError::ChannelWriteFailure("send queue full".into()))
            }
            Err(TrySendError::Closed(_)) => Err(PublisherError::ChannelWriteFailure(
                "session writer closed".into(),
            )),
        }
    }

    /// Count a failed or dropped write; disconnects past the threshold
    ///
    /// Returns true if this failure triggered the disconnect.
    pub(crate) fn record_failure(&self) -> bool {
        let failures = self.write_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.max_write_failures && !self.cancel.is_cancelled() {
            self.cancel.cancel();
            return true;
        }
        false
    }

    #[inline]
    pub(crate) fn record_success(&self) {
        self.write_failures.store(0, Ordering::Relaxed);
    }

    pub fn consecutive_write_failures(&self) -> u32 {
        self.write_failures.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("handle", &self.handle)
            .field("client_id", &self.client_id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .field("negotiated", &self.negotiated.get())
            .finish()
    }
}
