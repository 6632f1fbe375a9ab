//! Cipher key rotation timer
//!
//! Ticks at most once per second (or once per period, if shorter) and starts
//! a rotation for every encrypted session whose period has elapsed. A session
//! with a rotation already pending gets the same pending key again, so an
//! undelivered or unacknowledged key is retried on each tick until the
//! subscriber acknowledges it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tsp_cipher::KeyState;
use tsp_protocol::ServerMessage;

use crate::error::{PublisherError, Result};
use crate::publisher::Shared;
use crate::session::{Outbound, Session};

const MAX_TICK: Duration = Duration::from_secs(1);

/// Run the rotation timer until cancelled
pub(crate) async fn run(shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        let tick = tick_interval(shared.rotation_period());
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(tick) => {}
        }
        rotate_due(&shared, Instant::now());
    }
    debug!("cipher rotation timer stopped");
}

fn tick_interval(period: Duration) -> Duration {
    if period.is_zero() {
        MAX_TICK
    } else {
        period.min(MAX_TICK)
    }
}

/// Start rotations for every session whose period has elapsed
///
/// Applies the publisher's current period to each session first, so a
/// changed period takes effect on the next tick. Returns how many key
/// messages were queued.
pub(crate) fn rotate_due(shared: &Shared, now: Instant) -> usize {
    let period = shared.rotation_period();
    let mut sent = 0;

    for session in shared.registry.snapshot() {
        let Some(cipher) = session.cipher() else {
            continue;
        };
        let due = {
            let mut cipher = cipher.lock();
            cipher.set_rotation_period(period);
            cipher.rotation_due(now)
        };
        if !due || session.is_closing() {
            continue;
        }

        match send_rotation(&session) {
            Ok(key_index) => {
                sent += 1;
                debug!(session_id = %session.client_id(), key_index, "cipher key sent");
            }
            Err(e) => {
                warn!(session_id = %session.client_id(), error = %e, "cipher key rotation failed");
                shared.report_error(format!(
                    "cipher key rotation for {} failed: {e}",
                    session.client_id()
                ));
            }
        }
    }
    sent
}

/// Generate (or reuse) the pending key and queue it for the subscriber
///
/// If a freshly generated key cannot be queued it is discarded; the active
/// key keeps protecting traffic. A key that was already pending stays
/// pending, since the subscriber may have received an earlier copy. A full
/// queue is not counted as a write failure.
pub(crate) fn send_rotation(session: &Session) -> Result<u8> {
    let Some(cipher) = session.cipher() else {
        return Err(PublisherError::denied("session is not encrypted"));
    };

    // Held until the key is queued or abandoned: a concurrent send for the
    // same session must not queue this key between the failure and the
    // abandon.
    let mut cipher = cipher.lock();
    let resend = cipher.state() == KeyState::RotationPending;
    let key = cipher.begin_rotation()?;
    let key_index = key.index;
    let queued =
        session.try_send_control(Outbound::message(&ServerMessage::CipherKeys(key)));
    if let Err(e) = queued {
        if !resend {
            cipher.abandon_rotation();
        }
        return Err(e);
    }
    Ok(key_index)
}
