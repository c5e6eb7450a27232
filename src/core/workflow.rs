//! Workflow engine: the reusable shapes operations are built from.
//!
//! - [`linear_wait`](WorkflowEngine::linear_wait): issue a command, await the
//!   first terminal event.
//! - [`gated_state_machine`](WorkflowEngine::gated_state_machine): issue a
//!   command, classify every state the correlated events report through a
//!   static [`StateTable`], with optional [`SideEffect`]s fired when a trigger
//!   state is observed.
//! - [`race_with_timeout`](WorkflowEngine::race_with_timeout): bracket a wait
//!   between an enable and a disable command, racing the event against a timer.
//!
//! Waiters are always registered before the initiating command is sent, so
//! an event racing the command's response is never missed. Nothing here
//! retries.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::adapters::{Channel, ChannelError};
use crate::domain::{Command, CorrelationId, EventEnvelope, EventKind, Request, StateEvent};
use crate::error::{ErrorCode, ErrorContext, FailureKind, StateFailure};

use super::router::{EventRouter, RouterError, WaitOutcome, WaiterClosed};
use super::timer::{Release, ScheduledCommand};

/// Engine-level failures, before normalization into an operation error
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Command '{command}' failed: {source}")]
    Rejected {
        command: Command,
        #[source]
        source: ChannelError,
    },

    #[error("Unexpected response to '{command}': {source}")]
    Decode {
        command: Command,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    NegativeState(#[from] StateFailure),

    #[error("{}", side_effect_message(.code, .state, .source))]
    SideEffect {
        command: Command,
        state: String,
        code: ErrorCode,
        #[source]
        source: Box<WorkflowError>,
    },

    #[error("No terminal event within {}s", .after.as_secs_f64())]
    DeadlineElapsed { after: Duration },

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error("'{command}' was cancelled before completing")]
    Cancelled { command: Command },

    #[error("Waiter for {kind} '{correlation_id}' closed before settling")]
    WaiterClosed {
        kind: EventKind,
        correlation_id: CorrelationId,
    },
}

fn side_effect_message(code: &ErrorCode, state: &str, source: &dyn std::fmt::Display) -> String {
    let details = ErrorContext::new().with("details", format!("{} (reached {})", source, state));
    code.render(&details)
}

impl WorkflowError {
    /// Taxonomy tag for this failure
    pub fn kind(&self) -> FailureKind {
        match self {
            WorkflowError::Rejected { .. } | WorkflowError::Decode { .. } => {
                FailureKind::RemoteRejection
            }
            WorkflowError::NegativeState(_) => FailureKind::TerminalNegativeState,
            WorkflowError::SideEffect { .. } => FailureKind::SideEffectFailure,
            WorkflowError::DeadlineElapsed { .. } => FailureKind::Timeout,
            WorkflowError::Router(_) => FailureKind::InvalidRequest,
            WorkflowError::Cancelled { .. } | WorkflowError::WaiterClosed { .. } => {
                FailureKind::Cancelled
            }
        }
    }

    /// State-specific code, when there is one
    pub fn reason(&self) -> Option<ErrorCode> {
        match self {
            WorkflowError::NegativeState(failure) => Some(failure.code),
            WorkflowError::SideEffect { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Contextual fields identifying what failed
    pub fn context(&self) -> ErrorContext {
        match self {
            WorkflowError::Rejected { command, .. }
            | WorkflowError::Decode { command, .. }
            | WorkflowError::Cancelled { command } => ErrorContext::new().with("command", command),
            WorkflowError::NegativeState(failure) => failure.context.clone(),
            WorkflowError::SideEffect {
                command,
                state,
                source,
                ..
            } => {
                let mut context = ErrorContext::new()
                    .with("command", command)
                    .with("reachedState", state);
                context.merge_missing(&source.context());
                context
            }
            WorkflowError::DeadlineElapsed { after } => {
                ErrorContext::new().with("deadlineSecs", after.as_secs_f64())
            }
            WorkflowError::Router(_) => ErrorContext::new(),
            WorkflowError::WaiterClosed {
                kind,
                correlation_id,
            } => ErrorContext::new()
                .with("event", kind)
                .with("correlationId", correlation_id),
        }
    }
}

/// What a terminal state means for the workflow; states without a row are pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Success,
    Failure(ErrorCode),
}

/// Static classification table for a gated state machine
#[derive(Debug)]
pub struct StateTable<S: 'static> {
    rows: &'static [(S, Transition)],
}

impl<S: PartialEq> StateTable<S> {
    pub const fn new(rows: &'static [(S, Transition)]) -> Self {
        Self { rows }
    }

    /// `None` means keep waiting
    pub fn classify(&self, state: &S) -> Option<Transition> {
        self.rows
            .iter()
            .find(|(candidate, _)| candidate == state)
            .map(|(_, transition)| *transition)
    }

    pub fn is_terminal(&self, state: &S) -> bool {
        self.classify(state).is_some()
    }
}

#[derive(Debug, Clone, Copy)]
enum EffectAction {
    Invoke,
    Schedule(Duration),
}

/// A follow-up command fired when a state machine observes `trigger`.
///
/// `invoke` effects run concurrently with the main wait and their failure
/// fails the operation; `schedule` effects arm a [`ScheduledCommand`] that is
/// handed back to the caller.
pub struct SideEffect<E: StateEvent> {
    trigger: E::State,
    action: EffectAction,
    failure_code: ErrorCode,
    build: Box<dyn Fn(&E) -> Request + Send + Sync>,
}

impl<E: StateEvent> SideEffect<E> {
    pub fn invoke<F>(trigger: E::State, failure_code: ErrorCode, build: F) -> Self
    where
        F: Fn(&E) -> Request + Send + Sync + 'static,
    {
        Self {
            trigger,
            action: EffectAction::Invoke,
            failure_code,
            build: Box::new(build),
        }
    }

    pub fn schedule<F>(trigger: E::State, delay: Duration, failure_code: ErrorCode, build: F) -> Self
    where
        F: Fn(&E) -> Request + Send + Sync + 'static,
    {
        Self {
            trigger,
            action: EffectAction::Schedule(delay),
            failure_code,
            build: Box::new(build),
        }
    }

    pub fn trigger(&self) -> E::State {
        self.trigger
    }
}

/// Result of a gated state machine run
#[derive(Debug)]
pub struct GatedOutcome<R, E> {
    /// Response to the initiating command
    pub response: R,
    /// The event carrying the success state
    pub event: E,
    /// Commands armed by `schedule` side effects
    pub scheduled: Vec<ScheduledCommand>,
}

/// Which branch of a race won
#[derive(Debug, Clone, PartialEq)]
pub enum RaceOutcome<T> {
    Event(T),
    TimedOut,
}

/// Composes channel commands with router waits
#[derive(Clone)]
pub struct WorkflowEngine {
    channel: Arc<dyn Channel>,
    router: EventRouter,
}

impl WorkflowEngine {
    /// Create an engine and attach a fresh router to the channel
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        let router = EventRouter::new();
        router.attach(channel.as_ref());
        Self { channel, router }
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Invoke a command and return its raw response
    pub async fn invoke_raw(&self, request: &Request) -> Result<Value, WorkflowError> {
        debug!(command = %request.command, "Invoking command");
        self.channel
            .invoke(request.command.as_str(), request.args.clone())
            .await
            .map_err(|source| WorkflowError::Rejected {
                command: request.command,
                source,
            })
    }

    /// Invoke a command and decode its response
    pub async fn invoke<R: DeserializeOwned>(&self, request: &Request) -> Result<R, WorkflowError> {
        let value = self.invoke_raw(request).await?;
        serde_json::from_value(value).map_err(|source| WorkflowError::Decode {
            command: request.command,
            source,
        })
    }

    /// Issue `request`, then await the first terminal outcome of `predicate`
    pub async fn linear_wait<R, T, F>(
        &self,
        request: Request,
        kind: EventKind,
        correlation_id: &CorrelationId,
        predicate: F,
    ) -> Result<(R, T), WorkflowError>
    where
        R: DeserializeOwned,
        T: Send + 'static,
        F: FnMut(&EventEnvelope) -> WaitOutcome<T> + Send + 'static,
    {
        let waiter = self.router.register(kind, correlation_id.clone(), predicate)?;
        let response = self.invoke(&request).await?;
        let value = settle(waiter.wait().await, kind, correlation_id)?;
        Ok((response, value))
    }

    /// Issue `request`, then classify each correlated state event through
    /// `table` until a terminal state arrives.
    ///
    /// `describe` builds the failure context for negative terminal states.
    pub async fn gated_state_machine<R, E, D>(
        &self,
        request: Request,
        correlation_id: &CorrelationId,
        table: &'static StateTable<E::State>,
        describe: D,
        effects: Vec<SideEffect<E>>,
    ) -> Result<GatedOutcome<R, E>, WorkflowError>
    where
        R: DeserializeOwned,
        E: StateEvent,
        D: Fn(&E) -> ErrorContext + Send + 'static,
    {
        let triggers: Vec<E::State> = effects.iter().map(SideEffect::trigger).collect();
        let (trigger_tx, mut trigger_rx) = mpsc::unbounded_channel::<E>();

        let waiter = self
            .router
            .register(E::KIND, correlation_id.clone(), move |envelope| {
                let event: E = match envelope.decode() {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(
                            kind = %envelope.kind,
                            correlation_id = %envelope.correlation_id,
                            error = %e,
                            "Ignoring malformed event"
                        );
                        return WaitOutcome::Pending;
                    }
                };

                let state = event.state();
                if triggers.contains(&state) {
                    let _ = trigger_tx.send(event.clone());
                }

                match table.classify(&state) {
                    None => {
                        debug!(%state, "Intermediate state");
                        WaitOutcome::Pending
                    }
                    Some(Transition::Success) => WaitOutcome::Success(event),
                    Some(Transition::Failure(code)) => {
                        WaitOutcome::Failure(StateFailure::new(code, describe(&event)))
                    }
                }
            })?;

        let response: R = self.invoke(&request).await?;

        let mut fired = vec![false; effects.len()];
        let mut scheduled = Vec::new();
        let mut running = JoinSet::new();

        let wait = waiter.wait();
        tokio::pin!(wait);

        // an invoke effect fired on a non-terminal state can fail before the
        // terminal state arrives, and that failure ends the wait
        let settled = loop {
            tokio::select! {
                biased;
                Some(event) = trigger_rx.recv() => {
                    self.fire(&effects, &mut fired, &event, &mut scheduled, &mut running);
                }
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    effect_outcome(joined)?;
                }
                result = &mut wait => break result,
            }
        };
        while let Ok(event) = trigger_rx.try_recv() {
            self.fire(&effects, &mut fired, &event, &mut scheduled, &mut running);
        }

        let event = match settle(settled, E::KIND, correlation_id) {
            Ok(event) => event,
            Err(e) => {
                for command in &scheduled {
                    command.cancel();
                }
                return Err(e);
            }
        };

        while let Some(joined) = running.join_next().await {
            effect_outcome(joined)?;
        }

        Ok(GatedOutcome {
            response,
            event,
            scheduled,
        })
    }

    fn fire<E: StateEvent>(
        &self,
        effects: &[SideEffect<E>],
        fired: &mut [bool],
        event: &E,
        scheduled: &mut Vec<ScheduledCommand>,
        running: &mut JoinSet<Result<(), WorkflowError>>,
    ) {
        let state = event.state();

        for (effect, done) in effects.iter().zip(fired.iter_mut()) {
            if *done || effect.trigger != state {
                continue;
            }
            *done = true;

            let request = (effect.build)(event);
            match effect.action {
                EffectAction::Schedule(delay) => {
                    scheduled.push(ScheduledCommand::arm(
                        self.clone(),
                        delay,
                        request,
                        effect.failure_code,
                    ));
                }
                EffectAction::Invoke => {
                    info!(command = %request.command, %state, "Side effect triggered");
                    let engine = self.clone();
                    let code = effect.failure_code;
                    let reached = state.to_string();
                    running.spawn(async move {
                        engine
                            .invoke_raw(&request)
                            .await
                            .map(|_| ())
                            .map_err(|source| WorkflowError::SideEffect {
                                command: request.command,
                                state: reached,
                                code,
                                source: Box::new(source),
                            })
                    });
                }
            }
        }
    }

    /// Run `enable`, then race `predicate` against a `duration` timer.
    ///
    /// `deadline` bounds the enable and the race but not the release.
    /// `disable` runs exactly once on every path: after the race, after a
    /// failed enable or registration, after the deadline elapses, or
    /// (spawned) when this future is dropped.
    #[allow(clippy::too_many_arguments)]
    pub async fn race_with_timeout<T, F>(
        &self,
        enable: Request,
        kind: EventKind,
        correlation_id: &CorrelationId,
        predicate: F,
        duration: Duration,
        disable: Request,
        deadline: Option<Duration>,
    ) -> Result<RaceOutcome<T>, WorkflowError>
    where
        T: Send + 'static,
        F: FnMut(&EventEnvelope) -> WaitOutcome<T> + Send + 'static,
    {
        let release = Release::new(self.clone(), disable);
        let raced = with_deadline(
            deadline,
            self.race(enable, kind, correlation_id, predicate, duration),
        )
        .await;
        let released = release.run().await;

        match (raced, released) {
            (Ok(outcome), Ok(_)) => Ok(outcome),
            (Ok(_), Err(e)) | (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(release_error)) => {
                warn!(error = %release_error, "Release command failed after earlier error");
                Err(e)
            }
        }
    }

    async fn race<T, F>(
        &self,
        enable: Request,
        kind: EventKind,
        correlation_id: &CorrelationId,
        predicate: F,
        duration: Duration,
    ) -> Result<RaceOutcome<T>, WorkflowError>
    where
        T: Send + 'static,
        F: FnMut(&EventEnvelope) -> WaitOutcome<T> + Send + 'static,
    {
        let waiter = self.router.register(kind, correlation_id.clone(), predicate)?;
        self.invoke_raw(&enable).await?;

        tokio::select! {
            settled = waiter.wait() => settle(settled, kind, correlation_id).map(RaceOutcome::Event),
            _ = tokio::time::sleep(duration) => {
                debug!(%kind, %correlation_id, "Timer won the race");
                Ok(RaceOutcome::TimedOut)
            }
        }
    }
}

/// Bound `operation` by an optional deadline
pub async fn with_deadline<T, F>(deadline: Option<Duration>, operation: F) -> Result<T, WorkflowError>
where
    F: Future<Output = Result<T, WorkflowError>>,
{
    match deadline {
        Some(after) => tokio::time::timeout(after, operation)
            .await
            .map_err(|_| WorkflowError::DeadlineElapsed { after })?,
        None => operation.await,
    }
}

fn effect_outcome(joined: Result<Result<(), WorkflowError>, JoinError>) -> Result<(), WorkflowError> {
    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Ok(()),
    }
}

fn settle<T>(
    settled: Result<Result<T, StateFailure>, WaiterClosed>,
    kind: EventKind,
    correlation_id: &CorrelationId,
) -> Result<T, WorkflowError> {
    match settled {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(failure)) => Err(WorkflowError::NegativeState(failure)),
        Err(WaiterClosed) => Err(WorkflowError::WaiterClosed {
            kind,
            correlation_id: correlation_id.clone(),
        }),
    }
}
