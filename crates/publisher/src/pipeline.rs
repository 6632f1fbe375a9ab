//! Measurement publication pipeline
//!
//! One pass over a session snapshot per published batch:
//!
//! ```text
//! batch ─► for each Subscribed session:
//!            NanPolicy::select ─► encode_samples ─► [encrypt] ─► DataFrame
//!              ├─ data channel:    UdpSocket::try_send_to, one datagram per
//!              │                   MAX_DATAGRAM_SIZE worth of samples
//!              └─ command channel: Session::try_send(DataPacket)
//! ```
//!
//! Nothing in a pass waits on a session. A full send queue or a failed
//! datagram drops that session's frame and counts toward its disconnect
//! threshold; the other sessions are unaffected.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{trace, warn};
use tsp_cipher::{NONCE_LENGTH, TAG_LENGTH};
use tsp_protocol::{
    DataFrame, FRAME_HEADER_SIZE, Measurement, SAMPLE_SIZE, ServerMessage, encode_samples,
};

use crate::error::{PublisherError, Result};
use crate::filter::NanPolicy;
use crate::session::{Outbound, Session};

/// Largest UDP payload over IPv4
pub(crate) const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Sample count prefix of a plain payload
const SAMPLE_COUNT_SIZE: usize = 4;

/// Result of one publication pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Sessions a frame was handed to
    pub delivered: usize,
    /// Sessions whose frame was dropped
    pub failed: usize,
    /// Samples handed off across all sessions
    pub measurements: u64,
}

/// Publish a batch to a snapshot of sessions
pub(crate) fn publish(
    sessions: &[Arc<Session>],
    policy: NanPolicy,
    data_socket: Option<&UdpSocket>,
    batch: &[Measurement],
) -> PublishOutcome {
    let mut outcome = PublishOutcome::default();
    if batch.is_empty() {
        return outcome;
    }

    for session in sessions {
        match deliver(session, policy, data_socket, batch) {
            Ok(Some(count)) => {
                outcome.delivered += 1;
                outcome.measurements += count;
            }
            Ok(None) => {}
            Err(e) => {
                outcome.failed += 1;
                warn!(
                    session_id = %session.client_id(),
                    failures = session.consecutive_write_failures(),
                    error = %e,
                    "dropped publication frame"
                );
            }
        }
    }

    trace!(
        batch = batch.len(),
        sessions = sessions.len(),
        delivered = outcome.delivered,
        "published batch"
    );
    outcome
}

/// Deliver the session's share of a batch
///
/// `Ok(None)` when the session is not subscribed or nothing matched.
fn deliver(
    session: &Session,
    policy: NanPolicy,
    data_socket: Option<&UdpSocket>,
    batch: &[Measurement],
) -> Result<Option<u64>> {
    if session.is_closing() {
        return Ok(None);
    }
    let Some(subscription) = session.subscription() else {
        return Ok(None);
    };

    let selected = policy.select(&subscription, batch);
    if selected.is_empty() {
        return Ok(None);
    }

    match (session.data_channel(), data_socket) {
        (Some(target), Some(socket)) => send_datagrams(session, socket, target, &selected),
        _ => {
            let count = selected.len() as u64;
            let frame = build_frame(session, &selected)?;
            let message = ServerMessage::DataPacket(frame);
            session.try_send(Outbound::data(message.encode(), count))?;
            Ok(Some(count))
        }
    }
}

/// Send the selection as one frame per datagram
///
/// A failed datagram drops the rest of this pass for the session.
fn send_datagrams(
    session: &Session,
    socket: &UdpSocket,
    target: SocketAddr,
    selected: &[&Measurement],
) -> Result<Option<u64>> {
    let per_datagram = samples_per_datagram(session.is_encrypted());
    for chunk in selected.chunks(per_datagram) {
        let frame = build_frame(session, chunk)?;
        match socket.try_send_to(&frame.encode(), target) {
            Ok(sent) => session.stats().data_sent(sent, chunk.len() as u64),
            Err(e) => {
                session.record_failure();
                return Err(PublisherError::ChannelWriteFailure(format!(
                    "datagram to {target}: {e}"
                )));
            }
        }
    }
    session.record_success();
    Ok(Some(selected.len() as u64))
}

fn build_frame(session: &Session, samples: &[&Measurement]) -> Result<DataFrame> {
    let payload = encode_samples(samples.iter().copied());
    Ok(match session.cipher() {
        Some(cipher) => cipher.lock().encrypt_frame(&payload)?,
        None => DataFrame::plain(payload),
    })
}

/// Samples that fit one frame in a single datagram
pub(crate) fn samples_per_datagram(encrypted: bool) -> usize {
    let mut overhead = FRAME_HEADER_SIZE + SAMPLE_COUNT_SIZE;
    if encrypted {
        overhead += NONCE_LENGTH + TAG_LENGTH;
    }
    (MAX_DATAGRAM_SIZE - overhead) / SAMPLE_SIZE
}
