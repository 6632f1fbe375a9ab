//! Command channel server
//!
//! `accept_loop` owns the TCP listener. Each accepted connection gets a
//! registry slot and two tasks:
//!
//! - the reader (this connection's task) decodes client messages and answers
//!   them through the session's outbound queue
//! - the writer drains that queue onto the socket, sends `NoOp` heartbeats,
//!   and bounds every write by `write_timeout`
//!
//! The reader only ever waits on the socket or the session's cancellation
//! token. Whatever ends the session (peer close, protocol error, write
//! failure, publisher shutdown) cancels the token; the writer then flushes
//! what is still queued and the slot is released.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use tsp_cipher::{CipherState, KeyState};
use tsp_protocol::{
    ClientMessage, CommandCode, LENGTH_PREFIX_SIZE, MetadataRequest, PROTOCOL_VERSION,
    ProtocolError, ServerMessage, SubscribeRequest, check_message_len, read_length_prefix,
};

use crate::error::{PublisherError, Result};
use crate::filter::Subscription;
use crate::publisher::Shared;
use crate::rotation;
use crate::session::{Negotiated, Outbound, Session, SessionLimits};

/// Accept command channel connections until cancelled
pub(crate) async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    tracker: TaskTracker,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = listener.accept() => match result {
                Ok((stream, peer)) => accept(stream, peer, &shared, &tracker, &cancel),
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    shared.report_error(format!("failed to accept connection: {e}"));
                }
            }
        }
    }
    debug!("command channel listener stopped");
}

fn accept(
    stream: TcpStream,
    peer: SocketAddr,
    shared: &Arc<Shared>,
    tracker: &TaskTracker,
    parent: &CancellationToken,
) {
    let config = &shared.config;
    let cancel = parent.child_token();
    let (tx, rx) = mpsc::channel(config.send_queue_size.max(1));
    let limits = SessionLimits {
        write_timeout: config.write_timeout,
        max_write_failures: config.max_consecutive_write_failures,
    };

    let session = match shared
        .registry
        .insert_with(|handle, totals| Session::new(handle, peer, tx, cancel, limits, totals))
    {
        Ok(session) => session,
        Err(e) => {
            warn!(peer = %peer, error = %e, "rejecting connection");
            shared.report_status(format!("rejected connection from {peer}: {e}"));
            tracker.spawn(reject(stream, e.to_string(), config.write_timeout));
            return;
        }
    };

    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
    }
    debug!(peer = %peer, session = %session.handle(), "connection accepted");

    let shared = Arc::clone(shared);
    let writer_tracker = tracker.clone();
    tracker.spawn(async move {
        let (reader, writer) = stream.into_split();
        let writer = writer_tracker.spawn(write_loop(
            writer,
            rx,
            Arc::clone(&session),
            shared.config.heartbeat_interval,
            shared.config.write_timeout,
        ));

        let result = read_loop(reader, &session, &shared).await;
        session.disconnect();
        let _ = writer.await;
        finish(&shared, &session, result);
    });
}

/// Tell a client it cannot be served, then close
async fn reject(mut stream: TcpStream, reason: String, write_timeout: Duration) {
    let message = ServerMessage::failed(CommandCode::Handshake, reason).encode();
    let _ = tokio::time::timeout(write_timeout, async {
        stream.write_all(&message).await?;
        stream.shutdown().await
    })
    .await;
}

/// Release the session and notify the embedder
fn finish(shared: &Shared, session: &Session, result: Result<()>) {
    let was_connected = session.negotiated().is_some();
    shared.registry.remove(session.handle());
    session.mark_disconnected();

    match result {
        Ok(()) => debug!(session_id = %session.client_id(), "session closed"),
        Err(PublisherError::Io(e)) => {
            debug!(session_id = %session.client_id(), error = %e, "session closed")
        }
        Err(e) => warn!(
            session_id = %session.client_id(),
            peer = %session.peer(),
            error = %e,
            "session ended with error"
        ),
    }

    if was_connected {
        let stats = session.stats().snapshot();
        info!(
            session_id = %session.client_id(),
            peer = %session.peer(),
            measurements = stats.measurements,
            "client disconnected"
        );
        shared
            .callbacks
            .client_disconnected(session.client_id(), session.connection_info());
    }
}

async fn read_loop(mut reader: OwnedReadHalf, session: &Session, shared: &Shared) -> Result<()> {
    let cancel = session.cancel_token().clone();

    let first = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        result = tokio::time::timeout(shared.config.handshake_timeout, read_message(&mut reader)) => {
            result.map_err(|_| PublisherError::HandshakeTimeout)??
        }
    };
    let Some(first) = first else {
        return Ok(());
    };
    handshake(first, session, shared).await?;

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = read_message(&mut reader) => result?,
        };
        let Some(message) = message else {
            return Ok(());
        };
        handle_command(message, session, shared).await?;
    }
}

/// Read one length-prefixed client message
///
/// `Ok(None)` when the peer closed the connection between messages.
async fn read_message(reader: &mut OwnedReadHalf) -> Result<Option<ClientMessage>> {
    let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = read_length_prefix(&len_buf).ok_or(ProtocolError::Truncated("length prefix"))?;
    let len = check_message_len(len)?;

    let mut body = BytesMut::zeroed(len);
    reader.read_exact(&mut body).await?;
    Ok(Some(ClientMessage::decode(body.freeze())?))
}

async fn handshake(message: ClientMessage, session: &Session, shared: &Shared) -> Result<()> {
    let request = match message {
        ClientMessage::Handshake(request) => request,
        other => {
            let command = other.command();
            session
                .reply(ServerMessage::failed(command, "handshake required"))
                .await?;
            return Err(PublisherError::unexpected(format!(
                "expected handshake, received {command}"
            )));
        }
    };

    if request.version != PROTOCOL_VERSION {
        session
            .reply(ServerMessage::failed(
                CommandCode::Handshake,
                format!("unsupported protocol version {}", request.version),
            ))
            .await?;
        return Err(ProtocolError::UnsupportedVersion(request.version).into());
    }

    let data_channel = request
        .data_channel_port
        .map(|port| SocketAddr::new(session.peer().ip(), port));

    let (cipher, cipher_key) = if request.encrypt {
        let mut state = CipherState::new(shared.rotation_period());
        let key = state.establish()?;
        (Some(Mutex::new(state)), Some(key))
    } else {
        (None, None)
    };

    session.negotiate(Negotiated {
        subscriber_info: request.subscriber_info,
        data_channel,
        compress_metadata: request.compress_metadata,
        cipher,
    })?;

    session
        .reply(ServerMessage::HandshakeAck {
            version: PROTOCOL_VERSION,
            client_id: session.client_id(),
            cipher_key,
        })
        .await?;

    info!(
        session_id = %session.client_id(),
        peer = %session.peer(),
        subscriber = session.subscriber_info(),
        data_channel = ?data_channel,
        encrypted = session.is_encrypted(),
        "client connected"
    );
    shared.callbacks.client_connected(
        session.client_id(),
        session.connection_info(),
        session.subscriber_info(),
    );
    Ok(())
}

async fn handle_command(message: ClientMessage, session: &Session, shared: &Shared) -> Result<()> {
    let command = message.command();
    debug!(session_id = %session.client_id(), %command, "command received");

    let response = match message {
        ClientMessage::Handshake(_) => {
            ServerMessage::failed(command, "handshake already completed")
        }
        ClientMessage::MetadataRefresh(request) => metadata(&request, session, shared),
        ClientMessage::Subscribe(request) => subscribe(&request, session, shared),
        ClientMessage::Unsubscribe => match session.unsubscribe() {
            Ok(()) => ServerMessage::succeeded(command, "unsubscribed"),
            Err(e) => ServerMessage::failed(command, e.to_string()),
        },
        ClientMessage::CipherKeyAck { key_index } => acknowledge_key(key_index, session),
        ClientMessage::RotateCipherKeys => match rotation::send_rotation(session) {
            // the CipherKeys message is the response
            Ok(_) => return Ok(()),
            Err(e) => ServerMessage::failed(command, e.to_string()),
        },
    };

    session.reply(response).await
}

fn metadata(request: &MetadataRequest, session: &Session, shared: &Shared) -> ServerMessage {
    let compress = shared.config.compress_metadata
        && session.negotiated().is_some_and(|n| n.compress_metadata);

    match shared
        .negotiator
        .respond(request.signal_ids.as_deref(), compress)
    {
        Ok(response) => {
            debug!(
                session_id = %session.client_id(),
                measurements = response.measurement_count,
                bytes = response.payload.len(),
                compressed = response.compressed,
                "sending metadata"
            );
            ServerMessage::Metadata {
                compressed: response.compressed,
                payload: response.payload,
            }
        }
        Err(e) => {
            debug!(session_id = %session.client_id(), error = %e, "metadata request refused");
            ServerMessage::failed(CommandCode::MetadataRefresh, e.to_string())
        }
    }
}

fn subscribe(request: &SubscribeRequest, session: &Session, shared: &Shared) -> ServerMessage {
    if !shared.negotiator.is_defined() {
        return ServerMessage::failed(CommandCode::Subscribe, "no metadata has been defined");
    }

    let subscription = Subscription::from_request(request);
    let summary = subscription.describe();
    match session.subscribe(subscription) {
        Ok(()) => {
            debug!(session_id = %session.client_id(), "{summary}");
            ServerMessage::succeeded(CommandCode::Subscribe, summary)
        }
        Err(e) => ServerMessage::failed(CommandCode::Subscribe, e.to_string()),
    }
}

fn acknowledge_key(key_index: u8, session: &Session) -> ServerMessage {
    let command = CommandCode::CipherKeyAck;
    let Some(cipher) = session.cipher() else {
        return ServerMessage::failed(command, "session is not encrypted");
    };

    let mut cipher = cipher.lock();
    // A repeated acknowledgement of the key already in use is harmless
    if cipher.active_index() == Some(key_index) && cipher.state() == KeyState::Keyed {
        return ServerMessage::succeeded(command, format!("key {key_index} active"));
    }
    match cipher.acknowledge(key_index) {
        Ok(()) => {
            debug!(session_id = %session.client_id(), key_index, "cipher key rotated");
            ServerMessage::succeeded(command, format!("key {key_index} active"))
        }
        Err(e) => ServerMessage::failed(command, e.to_string()),
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Outbound>,
    session: Arc<Session>,
    heartbeat_interval: Duration,
    write_timeout: Duration,
) {
    let cancel = session.cancel_token().clone();
    // zero disables heartbeats
    let heartbeats = !heartbeat_interval.is_zero();
    let period = heartbeat_interval.max(Duration::from_millis(1));
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let noop = Outbound::message(&ServerMessage::NoOp);

    loop {
        let outbound = tokio::select! {
            _ = cancel.cancelled() => break,
            outbound = rx.recv() => match outbound {
                Some(outbound) => outbound,
                None => break,
            },
            _ = heartbeat.tick(), if heartbeats => Outbound::data(noop.bytes.clone(), 0),
        };

        if let Err(e) = write(&mut writer, &outbound, write_timeout).await {
            warn!(session_id = %session.client_id(), error = %e, "command channel write failed");
            session.disconnect();
            return;
        }
        session
            .stats()
            .command_sent(outbound.bytes.len(), outbound.measurements);
        session.record_success();
    }

    // Flush replies queued before the close (e.g. a handshake refusal)
    while let Ok(outbound) = rx.try_recv() {
        if write(&mut writer, &outbound, write_timeout).await.is_err() {
            return;
        }
        session
            .stats()
            .command_sent(outbound.bytes.len(), outbound.measurements);
    }
    let _ = tokio::time::timeout(write_timeout, writer.shutdown()).await;
}

async fn write(writer: &mut OwnedWriteHalf, outbound: &Outbound, write_timeout: Duration) -> Result<()> {
    match tokio::time::timeout(write_timeout, writer.write_all(&outbound.bytes)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(PublisherError::ChannelWriteFailure(format!(
            "write not completed within {write_timeout:?}"
        ))),
    }
}
