//! Tests for session lifecycle and outbound queueing

use tsp_protocol::{CommandCode, ServerMessage};

use crate::error::PublisherError;
use crate::filter::Subscription;
use crate::registry::SessionRegistry;
use crate::session::{Outbound, SessionState};
use crate::test_support::{MAX_FAILURES, connect, decode, register};

#[test]
fn test_new_session_is_connecting() {
    let registry = SessionRegistry::new(0);
    let (session, _rx) = register(&registry, 4);

    assert_eq!(session.state(), SessionState::Connecting);
    assert_eq!(session.subscriber_info(), "");
    assert_eq!(session.connection_info(), "127.0.0.1:40000");
    assert!(session.negotiated().is_none());
    assert!(!session.is_encrypted());
}

#[test]
fn test_lifecycle_transitions() {
    let registry = SessionRegistry::new(0);
    let (session, _rx) = register(&registry, 4);

    // subscribe before handshake is refused
    assert!(session.subscribe(Subscription::default()).is_err());

    connect(&session, false);
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.subscriber_info(), "unit test");
    assert!(session.subscription().is_none());

    session.subscribe(Subscription::default()).unwrap();
    assert_eq!(session.state(), SessionState::Subscribed);
    assert!(session.subscription().is_some());

    session.unsubscribe().unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    assert!(session.subscription().is_none());
    assert!(session.unsubscribe().is_err());

    assert!(session.mark_disconnected());
    assert!(!session.mark_disconnected());
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[test]
fn test_second_handshake_rejected() {
    let registry = SessionRegistry::new(0);
    let (session, _rx) = register(&registry, 4);
    connect(&session, false);

    let again = crate::session::Negotiated {
        subscriber_info: "again".into(),
        data_channel: None,
        compress_metadata: false,
        cipher: None,
    };
    assert!(matches!(
        session.negotiate(again),
        Err(PublisherError::UnexpectedMessage(_))
    ));
    assert_eq!(session.subscriber_info(), "unit test");
}

#[test]
fn test_encrypted_session_has_cipher() {
    let registry = SessionRegistry::new(0);
    let (session, _rx) = register(&registry, 4);
    let key = connect(&session, true).unwrap();

    assert!(session.is_encrypted());
    assert_eq!(key.index, 0);
    assert_eq!(session.cipher().unwrap().lock().active_index(), Some(0));
}

#[tokio::test]
async fn test_reply_is_queued() {
    let registry = SessionRegistry::new(0);
    let (session, mut rx) = register(&registry, 4);

    session
        .reply(ServerMessage::succeeded(CommandCode::Subscribe, "ok"))
        .await
        .unwrap();

    let outbound = rx.recv().await.unwrap();
    assert_eq!(outbound.measurements, 0);
    assert_eq!(
        decode(&outbound),
        ServerMessage::succeeded(CommandCode::Subscribe, "ok")
    );
}

#[tokio::test]
async fn test_reply_times_out_on_full_queue() {
    let registry = SessionRegistry::new(0);
    let (session, _rx) = register(&registry, 1);

    session.reply(ServerMessage::NoOp).await.unwrap();
    let result = session.reply(ServerMessage::NoOp).await;
    assert!(matches!(result, Err(PublisherError::ChannelWriteFailure(_))));
}

#[test]
fn test_full_queue_counts_failures_and_disconnects() {
    let registry = SessionRegistry::new(0);
    let (session, _rx) = register(&registry, 1);
    let frame = || Outbound::message(&ServerMessage::NoOp);

    session.try_send(frame()).unwrap();
    for attempt in 1..MAX_FAILURES {
        assert!(session.try_send(frame()).is_err());
        assert_eq!(session.consecutive_write_failures(), attempt);
        assert!(!session.is_closing());
    }

    assert!(session.try_send(frame()).is_err());
    assert!(session.is_closing());
}

#[test]
fn test_full_queue_control_message_not_counted() {
    let registry = SessionRegistry::new(0);
    let (session, _rx) = register(&registry, 1);
    let message = || Outbound::message(&ServerMessage::NoOp);

    session.try_send_control(message()).unwrap();
    for _ in 0..=MAX_FAILURES {
        assert!(session.try_send_control(message()).is_err());
    }
    assert_eq!(session.consecutive_write_failures(), 0);
    assert!(!session.is_closing());
}

#[test]
fn test_success_resets_failures() {
    let registry = SessionRegistry::new(0);
    let (session, _rx) = register(&registry, 4);

    session.record_failure();
    session.record_failure();
    assert_eq!(session.consecutive_write_failures(), 2);

    session.record_success();
    assert_eq!(session.consecutive_write_failures(), 0);
    assert!(!session.is_closing());
}

#[test]
fn test_closed_writer_is_not_counted() {
    let registry = SessionRegistry::new(0);
    let (session, rx) = register(&registry, 4);
    drop(rx);

    assert!(session.try_send(Outbound::message(&ServerMessage::NoOp)).is_err());
    assert_eq!(session.consecutive_write_failures(), 0);
}
