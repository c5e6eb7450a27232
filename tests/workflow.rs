//! Workflow Engine Integration Tests
//!
//! The workflow shapes exercised directly against the in-memory channel.

use std::sync::Arc;
use std::time::Duration;

use callflow::core::{
    RaceOutcome, SideEffect, StateTable, Transition, WaitOutcome, WorkflowEngine, WorkflowError,
};
use callflow::domain::{CallState, CallStateChanged, Command, CorrelationId, EventEnvelope, Request};
use callflow::error::ErrorContext;
use callflow::{ErrorCode, EventKind, FailureKind, MemoryChannel};
use serde_json::{json, Value};

static CALL_TABLE: StateTable<CallState> = StateTable::new(&[
    (CallState::Active, Transition::Success),
    (CallState::Hangup, Transition::Failure(ErrorCode::CallHungUp)),
]);

// ACTIVE is not terminal here, so a later HANGUP fails the run
static HANGUP_ONLY: StateTable<CallState> =
    StateTable::new(&[(CallState::Hangup, Transition::Failure(ErrorCode::CallHungUp))]);

fn describe(event: &CallStateChanged) -> ErrorContext {
    ErrorContext::new()
        .with("callId", &event.call_id)
        .with("callState", event.call_state)
}

fn push_states(channel: &MemoryChannel, command: &str, states: &'static [&'static str]) {
    channel.on_invoke(command, move |args: &Value| {
        states
            .iter()
            .map(|state| {
                (
                    "callStateChanged".to_string(),
                    json!({ "callId": args["callId"], "callState": state }),
                )
            })
            .collect()
    });
}

fn digit(envelope: &EventEnvelope) -> WaitOutcome<String> {
    match envelope.payload["dtmfDigit"].as_str() {
        Some(d) => WaitOutcome::Success(d.to_string()),
        None => WaitOutcome::Pending,
    }
}

fn enable(id: &CorrelationId) -> Request {
    Request::enable_dtmf_events(id)
}

fn disable(id: &CorrelationId) -> Request {
    Request::disable_dtmf_events(id)
}

#[tokio::test]
async fn test_linear_wait_returns_response_and_event() {
    let channel = MemoryChannel::new();
    channel.respond("playUri", Ok(json!({ "accepted": true })));
    channel.on_invoke("playUri", |_| {
        vec![(
            "playBackStateChanged".to_string(),
            json!({ "callId": "c1", "playBackState": "STOPPED" }),
        )]
    });
    let engine = WorkflowEngine::new(Arc::new(channel.clone()));
    let id = CorrelationId::from("c1");

    let (response, state): (Value, String) = engine
        .linear_wait(
            Request::play_uri(&id, "https://x/a.wav"),
            EventKind::PlayBackStateChanged,
            &id,
            |envelope: &EventEnvelope| {
                WaitOutcome::Success(envelope.payload["playBackState"].as_str().unwrap_or("").to_string())
            },
        )
        .await
        .unwrap();

    assert_eq!(response["accepted"], true);
    assert_eq!(state, "STOPPED");
}

#[tokio::test]
async fn test_linear_wait_rejection_leaves_no_waiter() {
    let channel = MemoryChannel::new();
    channel.reject("playUri", "nope");
    let engine = WorkflowEngine::new(Arc::new(channel.clone()));
    let id = CorrelationId::from("c1");

    let err = engine
        .linear_wait::<Value, String, _>(
            Request::play_uri(&id, "https://x/a.wav"),
            EventKind::PlayBackStateChanged,
            &id,
            digit,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Rejected { command: Command::PlayUri, .. }));
    assert_eq!(err.kind(), FailureKind::RemoteRejection);
    assert_eq!(engine.router().pending_waiters(), 0);
}

#[tokio::test]
async fn test_gated_pending_states_until_terminal() {
    let channel = MemoryChannel::new();
    push_states(&channel, "makeCall", &["DIALING", "RINGING", "ACTIVE"]);
    let engine = WorkflowEngine::new(Arc::new(channel.clone()));
    let id = CorrelationId::from("c1");

    let outcome = engine
        .gated_state_machine::<Value, CallStateChanged, _>(
            Request::make_call(&id, "1", "2", "gw"),
            &id,
            &CALL_TABLE,
            describe,
            Vec::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.event.call_state, CallState::Active);
    assert!(outcome.scheduled.is_empty());
}

#[tokio::test]
async fn test_gated_failure_carries_context() {
    let channel = MemoryChannel::new();
    push_states(&channel, "makeCall", &["HANGUP"]);
    let engine = WorkflowEngine::new(Arc::new(channel.clone()));
    let id = CorrelationId::from("c1");

    let err = engine
        .gated_state_machine::<Value, CallStateChanged, _>(
            Request::make_call(&id, "1", "2", "gw"),
            &id,
            &CALL_TABLE,
            describe,
            Vec::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::TerminalNegativeState);
    assert_eq!(err.reason(), Some(ErrorCode::CallHungUp));
    assert_eq!(err.context().get("callState"), Some("HANGUP"));
    assert_eq!(err.to_string(), "Call with ID c1 was hung up");
}

#[tokio::test]
async fn test_side_effect_fires_once_on_trigger() {
    let channel = MemoryChannel::new();
    push_states(&channel, "makeCall", &["RINGING", "ACTIVE"]);
    let engine = WorkflowEngine::new(Arc::new(channel.clone()));
    let id = CorrelationId::from("c1");

    let effects = vec![
        SideEffect::invoke(CallState::Ringing, ErrorCode::RecordingFailedToStart, |e: &CallStateChanged| {
            Request::start_recording(&e.call_id, "early.wav")
        }),
        SideEffect::invoke(CallState::Dialing, ErrorCode::RecordingFailedToStart, |e: &CallStateChanged| {
            Request::hangup_call(&e.call_id)
        }),
    ];

    engine
        .gated_state_machine::<Value, CallStateChanged, _>(
            Request::make_call(&id, "1", "2", "gw"),
            &id,
            &CALL_TABLE,
            describe,
            effects,
        )
        .await
        .unwrap();

    // non-terminal trigger fired, unobserved trigger did not
    assert_eq!(channel.invocation_count("startRecording"), 1);
    assert_eq!(channel.invocation_count("hangupCall"), 0);
}

#[tokio::test]
async fn test_side_effect_failure_fails_workflow() {
    let channel = MemoryChannel::new();
    push_states(&channel, "makeCall", &["ACTIVE"]);
    channel.reject("startRecording", "busy");
    let engine = WorkflowEngine::new(Arc::new(channel.clone()));
    let id = CorrelationId::from("c1");

    let effects = vec![SideEffect::invoke(
        CallState::Active,
        ErrorCode::RecordingFailedToStart,
        |e: &CallStateChanged| Request::start_recording(&e.call_id, "r.wav"),
    )];

    let err = engine
        .gated_state_machine::<Value, CallStateChanged, _>(
            Request::make_call(&id, "1", "2", "gw"),
            &id,
            &CALL_TABLE,
            describe,
            effects,
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::SideEffectFailure);
    assert_eq!(err.context().get("reachedState"), Some("ACTIVE"));
}

#[tokio::test(start_paused = true)]
async fn test_side_effect_failure_before_terminal_ends_wait() {
    let channel = MemoryChannel::new();
    push_states(&channel, "makeCall", &["RINGING"]);
    channel.reject("startRecording", "busy");
    let engine = WorkflowEngine::new(Arc::new(channel.clone()));
    let id = CorrelationId::from("c1");

    let effects = vec![SideEffect::invoke(
        CallState::Ringing,
        ErrorCode::RecordingFailedToStart,
        |e: &CallStateChanged| Request::start_recording(&e.call_id, "early.wav"),
    )];

    // no terminal state ever arrives and there is no deadline
    let run = engine.gated_state_machine::<Value, CallStateChanged, _>(
        Request::make_call(&id, "1", "2", "gw"),
        &id,
        &CALL_TABLE,
        describe,
        effects,
    );
    let err = tokio::time::timeout(Duration::from_secs(60), run)
        .await
        .expect("side effect failure should end the wait")
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::SideEffectFailure);
    assert_eq!(err.reason(), Some(ErrorCode::RecordingFailedToStart));
    assert_eq!(err.context().get("reachedState"), Some("RINGING"));
    assert_eq!(engine.router().pending_waiters(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_effect_cancelled_on_negative_terminal() {
    let channel = MemoryChannel::new();
    let engine = WorkflowEngine::new(Arc::new(channel.clone()));
    let id = CorrelationId::from("c1");
    push_states(&channel, "makeCall", &["ACTIVE", "HANGUP"]);

    let effects = vec![SideEffect::schedule(
        CallState::Active,
        Duration::from_secs(5),
        ErrorCode::FailedToHangupCall,
        |e: &CallStateChanged| Request::hangup_call(&e.call_id),
    )];

    let err = engine
        .gated_state_machine::<Value, CallStateChanged, _>(
            Request::make_call(&id, "1", "2", "gw"),
            &id,
            &HANGUP_ONLY,
            describe,
            effects,
        )
        .await
        .unwrap_err();
    assert_eq!(err.reason(), Some(ErrorCode::CallHungUp));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(channel.invocation_count("hangupCall"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_race_timer_wins_and_releases_once() {
    let channel = MemoryChannel::new();
    let engine = WorkflowEngine::new(Arc::new(channel.clone()));
    let id = CorrelationId::from("c1");

    let outcome = engine
        .race_with_timeout(enable(&id), EventKind::DtmfSignal, &id, digit, Duration::from_secs(2), disable(&id), None)
        .await
        .unwrap();

    assert_eq!(outcome, RaceOutcome::TimedOut);
    assert_eq!(channel.invocation_count("disableDtmfEvents"), 1);
    assert_eq!(engine.router().pending_waiters(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_race_event_wins_and_releases_once() {
    let channel = MemoryChannel::new();
    channel.on_invoke("enableDtmfEvents", |args| {
        vec![("dtmfSignal".to_string(), json!({ "callId": args["callId"], "dtmfDigit": "0" }))]
    });
    let engine = WorkflowEngine::new(Arc::new(channel.clone()));
    let id = CorrelationId::from("c1");

    let outcome = engine
        .race_with_timeout(enable(&id), EventKind::DtmfSignal, &id, digit, Duration::from_secs(2), disable(&id), None)
        .await
        .unwrap();

    assert_eq!(outcome, RaceOutcome::Event("0".to_string()));
    assert_eq!(channel.invocation_count("disableDtmfEvents"), 1);
}

#[tokio::test]
async fn test_race_enable_failure_releases_once() {
    let channel = MemoryChannel::new();
    channel.reject("enableDtmfEvents", "down");
    let engine = WorkflowEngine::new(Arc::new(channel.clone()));
    let id = CorrelationId::from("c1");

    let err = engine
        .race_with_timeout(enable(&id), EventKind::DtmfSignal, &id, digit, Duration::from_secs(2), disable(&id), None)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Rejected { command: Command::EnableDtmfEvents, .. }));
    assert_eq!(channel.invocation_count("disableDtmfEvents"), 1);
}

#[tokio::test]
async fn test_race_both_fail_keeps_first_error() {
    let channel = MemoryChannel::new();
    channel.reject("enableDtmfEvents", "down");
    channel.reject("disableDtmfEvents", "down too");
    let engine = WorkflowEngine::new(Arc::new(channel.clone()));
    let id = CorrelationId::from("c1");

    let err = engine
        .race_with_timeout(enable(&id), EventKind::DtmfSignal, &id, digit, Duration::from_secs(2), disable(&id), None)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Rejected { command: Command::EnableDtmfEvents, .. }));
    assert_eq!(channel.invocation_count("disableDtmfEvents"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_race_releases_once() {
    let channel = MemoryChannel::new();
    let engine = WorkflowEngine::new(Arc::new(channel.clone()));
    let id = CorrelationId::from("c1");

    let race = engine.race_with_timeout(
        enable(&id),
        EventKind::DtmfSignal,
        &id,
        digit,
        Duration::from_secs(60),
        disable(&id),
        None,
    );
    let _ = tokio::time::timeout(Duration::from_secs(1), race).await;

    while channel.invocation_count("disableDtmfEvents") == 0 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(channel.invocation_count("disableDtmfEvents"), 1);
    assert_eq!(engine.router().pending_waiters(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_race_deadline_releases_before_returning() {
    let channel = MemoryChannel::new();
    let engine = WorkflowEngine::new(Arc::new(channel.clone()));
    let id = CorrelationId::from("c1");

    let err = engine
        .race_with_timeout(
            enable(&id),
            EventKind::DtmfSignal,
            &id,
            digit,
            Duration::from_secs(60),
            disable(&id),
            Some(Duration::from_secs(5)),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Timeout);
    assert_eq!(channel.invocation_count("disableDtmfEvents"), 1);
    assert_eq!(engine.router().pending_waiters(), 0);
}
