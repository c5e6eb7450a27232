//! Event Router Integration Tests
//!
//! Correlation isolation, logical unsubscription and single raw subscription
//! per event kind.

use callflow::core::{EventRouter, RouterError, WaitOutcome};
use callflow::domain::{CorrelationId, EventEnvelope};
use callflow::{EventKind, MemoryChannel};
use serde_json::json;

fn first_digit(envelope: &EventEnvelope) -> WaitOutcome<String> {
    match envelope.payload["dtmfDigit"].as_str() {
        Some(digit) => WaitOutcome::Success(digit.to_string()),
        None => WaitOutcome::Pending,
    }
}

#[test]
fn test_attach_subscribes_once_per_kind() {
    let channel = MemoryChannel::new();
    let router = EventRouter::new();

    router.attach(&channel);
    router.attach(&channel);

    for kind in EventKind::ALL {
        assert_eq!(channel.subscriber_count(kind.as_str()), 1, "{}", kind);
    }
}

#[tokio::test]
async fn test_distinct_ids_are_isolated() {
    let channel = MemoryChannel::new();
    let router = EventRouter::new();
    router.attach(&channel);

    let a = router.register(EventKind::DtmfSignal, "call-a", first_digit).unwrap();
    let b = router.register(EventKind::DtmfSignal, "call-b", first_digit).unwrap();

    channel.emit("dtmfSignal", json!({ "callId": "call-a", "dtmfDigit": "1" }));

    assert_eq!(a.wait().await.unwrap().unwrap(), "1");
    assert_eq!(router.waiter_count(EventKind::DtmfSignal, &CorrelationId::from("call-b")), 1);

    channel.emit("dtmfSignal", json!({ "callId": "call-b", "dtmfDigit": "2" }));
    assert_eq!(b.wait().await.unwrap().unwrap(), "2");
    assert_eq!(router.pending_waiters(), 0);
}

#[tokio::test]
async fn test_same_id_other_kind_ignored() {
    let channel = MemoryChannel::new();
    let router = EventRouter::new();
    router.attach(&channel);

    let waiter = router.register(EventKind::DtmfSignal, "call-a", first_digit).unwrap();
    channel.emit("playBackError", json!({ "callId": "call-a", "dtmfDigit": "9" }));

    assert_eq!(router.pending_waiters(), 1);
    drop(waiter);
    assert_eq!(router.pending_waiters(), 0);
}

#[test]
fn test_unregister_twice_is_noop() {
    let router = EventRouter::new();
    let waiter = router.register(EventKind::DtmfSignal, "call-a", first_digit).unwrap();
    let handle = waiter.handle().clone();

    assert!(router.unregister(&handle));
    assert!(!router.unregister(&handle));
    drop(waiter);
    assert_eq!(router.pending_waiters(), 0);
}

#[tokio::test]
async fn test_settled_waiter_never_settles_again() {
    let router = EventRouter::new();
    let mut settled = 0;
    let waiter = router
        .register(EventKind::DtmfSignal, "call-a", move |envelope: &EventEnvelope| {
            settled += 1;
            assert_eq!(settled, 1, "predicate ran after settling");
            WaitOutcome::Success(envelope.payload["dtmfDigit"].clone())
        })
        .unwrap();

    router.dispatch_raw(EventKind::DtmfSignal, json!({ "callId": "call-a", "dtmfDigit": "3" }));
    router.dispatch_raw(EventKind::DtmfSignal, json!({ "callId": "call-a", "dtmfDigit": "4" }));

    assert_eq!(waiter.wait().await.unwrap().unwrap(), json!("3"));
}

#[test]
fn test_event_without_correlation_is_dropped() {
    let router = EventRouter::new();
    let _waiter = router.register(EventKind::DtmfSignal, "call-a", first_digit).unwrap();

    router.dispatch_raw(EventKind::DtmfSignal, json!({ "dtmfDigit": "5" }));

    assert_eq!(router.pending_waiters(), 1);
}

#[test]
fn test_empty_correlation_id_rejected() {
    let router = EventRouter::new();
    let err = router
        .register(EventKind::DtmfSignal, "  ", first_digit)
        .err()
        .unwrap();

    assert_eq!(err, RouterError::EmptyCorrelationId);
}

#[tokio::test]
async fn test_duplicate_waiters_settle_in_order() {
    let router = EventRouter::new();
    let first = router.register(EventKind::DtmfSignal, "call-a", first_digit).unwrap();
    let second = router.register(EventKind::DtmfSignal, "call-a", first_digit).unwrap();
    assert_eq!(router.waiter_count(EventKind::DtmfSignal, &CorrelationId::from("call-a")), 2);

    router.dispatch_raw(EventKind::DtmfSignal, json!({ "callId": "call-a", "dtmfDigit": "8" }));

    assert_eq!(first.wait().await.unwrap().unwrap(), "8");
    assert_eq!(second.wait().await.unwrap().unwrap(), "8");
}
