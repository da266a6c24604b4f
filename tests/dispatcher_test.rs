mod common;

use bytes::Bytes;
use common::*;
use peercall::calls::{DispatchOutcome, IgnoreReason};
use peercall::channel::ChannelEvent;
use peercall::types::{CallId, CallState};
use tokio::sync::mpsc;

fn ignored(reason: IgnoreReason) -> DispatchOutcome {
    DispatchOutcome::Ignored(reason)
}

#[tokio::test]
async fn test_undecodable_bytes_are_malformed() {
    let h = Harness::alice();
    let d = h.manager.dispatcher();

    assert_eq!(d.dispatch(b"not json").await, ignored(IgnoreReason::Malformed));
    assert_eq!(d.dispatch(b"").await, ignored(IgnoreReason::Malformed));
    assert_eq!(h.manager.state(), CallState::Idle);
}

#[tokio::test]
async fn test_other_message_types_are_ignored() {
    let h = Harness::alice();
    let d = h.manager.dispatcher();

    let chat = br#"{
        "header": {"version": "1.0", "type": "chat_message", "message_id": "m-1",
                   "timestamp": 1700000000000, "sender_id": 2, "recipient_id": 1},
        "body": {"text": "hello"}
    }"#;
    assert_eq!(d.dispatch(chat).await, ignored(IgnoreReason::UnknownKind));
}

#[tokio::test]
async fn test_unsupported_version_is_rejected() {
    let h = Harness::alice();
    let d = h.manager.dispatcher();

    let future = br#"{
        "header": {"version": "2.0", "type": "call_offer", "message_id": "m-2",
                   "timestamp": 0, "sender_id": 2},
        "body": {"call_id": "c-1", "sdp": "v=0"}
    }"#;
    assert_eq!(d.dispatch(future).await, ignored(IgnoreReason::Malformed));
    assert_eq!(h.manager.state(), CallState::Idle);
}

#[tokio::test]
async fn test_missing_body_or_sender_is_malformed() {
    let h = Harness::alice();
    let d = h.manager.dispatcher();

    let no_body = br#"{"header": {"type": "call_end", "message_id": "m-3"}}"#;
    assert_eq!(d.dispatch(no_body).await, ignored(IgnoreReason::Malformed));

    let no_sender = br#"{
        "header": {"version": "1.0", "type": "call_offer", "message_id": "m-4"},
        "body": {"call_id": "c-1", "sdp": "v=0"}
    }"#;
    assert_eq!(d.dispatch(no_sender).await, ignored(IgnoreReason::Malformed));
    assert_eq!(h.manager.state(), CallState::Idle);
}

#[tokio::test]
async fn test_minimal_wire_offer_is_accepted() {
    let h = Harness::alice();
    let d = h.manager.dispatcher();

    // Defaults fill in the optional header and body fields.
    let offer = br#"{
        "header": {"type": "call_offer", "message_id": "m-5", "sender_id": 2},
        "body": {"call_id": "c-9", "sdp": "v=0"}
    }"#;
    assert_eq!(d.dispatch(offer).await, DispatchOutcome::Handled);
    assert_eq!(
        h.manager.state(),
        CallState::Incoming {
            remote: BOB,
            call_id: CallId::new("c-9"),
            sdp: "v=0".to_string(),
        }
    );
}

#[tokio::test]
async fn test_end_for_unknown_call_is_stale() {
    let h = Harness::alice();
    let d = h.manager.dispatcher();

    assert_eq!(
        d.dispatch(&envelope(BOB, end("nobody"))).await,
        ignored(IgnoreReason::StaleMessage)
    );
    assert_eq!(h.manager.state(), CallState::Idle);
}

#[tokio::test]
async fn test_run_consumes_channel_until_closed() {
    let h = Harness::alice();
    let (tx, rx) = mpsc::channel(8);
    let handle = h.manager.spawn_signaling(rx);

    tx.send(ChannelEvent::Connected).await.unwrap();
    tx.send(ChannelEvent::DataReceived(Bytes::from(envelope(BOB, offer("c-run")))))
        .await
        .unwrap();
    tx.send(ChannelEvent::DataReceived(Bytes::from_static(b"garbage")))
        .await
        .unwrap();
    tx.send(ChannelEvent::Disconnected).await.unwrap();
    drop(tx);

    handle.await.unwrap();
    assert!(matches!(
        h.manager.state(),
        CallState::Incoming { remote, .. } if remote == BOB
    ));
}
