//! Event router: demultiplexes the shared event stream into
//! correlation-scoped, single-shot waiters.
//!
//! The channel's subscriptions are multicast and never removed, so the router
//! subscribes exactly once per event kind and performs *logical*
//! unsubscription: a waiter leaves the registry as soon as its predicate
//! yields a terminal outcome, or when its owner drops it.
//!
//! Dispatch runs under a single mutex. Predicates are plain synchronous
//! closures; anything an operation does in response to a match happens after
//! the waiter settles, outside dispatch.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::adapters::Channel;
use crate::domain::{CorrelationId, EventEnvelope, EventKind};
use crate::error::StateFailure;

/// Result of evaluating a predicate against one event
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome<T> {
    /// Not terminal yet, keep listening
    Pending,
    Success(T),
    Failure(StateFailure),
}

/// Registration errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("Correlation id must not be empty")]
    EmptyCorrelationId,
}

/// Waiter dropped by the router before it settled
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Waiter was unregistered before it settled")]
pub struct WaiterClosed;

/// Identifies one registered waiter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WaitHandle {
    kind: EventKind,
    correlation_id: CorrelationId,
    id: u64,
}

impl WaitHandle {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }
}

type WaiterKey = (EventKind, CorrelationId);

/// Returns true once the waiter is terminal
type Predicate = Box<dyn FnMut(&EventEnvelope) -> bool + Send>;

struct Entry {
    id: u64,
    predicate: Predicate,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    waiters: HashMap<WaiterKey, Vec<Entry>>,
}

#[derive(Default)]
struct RouterInner {
    registry: Mutex<Registry>,
    attached: Mutex<HashSet<EventKind>>,
}

/// Shared event router (cheap to clone)
#[derive(Clone, Default)]
pub struct EventRouter {
    inner: Arc<RouterInner>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribe one raw handler per event kind on `channel`.
    ///
    /// Calling this again never adds a second handler for a kind.
    pub fn attach(&self, channel: &dyn Channel) {
        let mut attached = self
            .inner
            .attached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for kind in EventKind::ALL {
            if !attached.insert(kind) {
                continue;
            }
            let router = self.clone();
            channel.subscribe(
                kind.as_str(),
                Arc::new(move |payload: Value| router.dispatch_raw(kind, payload)),
            );
        }

        debug!(channel = channel.name(), "Router attached");
    }

    /// Register a waiter for events of `kind` carrying `correlation_id`.
    ///
    /// The predicate runs once per matching event until it returns a terminal
    /// outcome; the waiter is then settled and removed.
    pub fn register<T, F>(
        &self,
        kind: EventKind,
        correlation_id: impl Into<CorrelationId>,
        mut predicate: F,
    ) -> Result<Waiter<T>, RouterError>
    where
        T: Send + 'static,
        F: FnMut(&EventEnvelope) -> WaitOutcome<T> + Send + 'static,
    {
        let correlation_id = correlation_id.into();
        if correlation_id.is_empty() {
            return Err(RouterError::EmptyCorrelationId);
        }

        let (tx, rx) = oneshot::channel();
        let mut slot = Some(tx);
        let settle: Predicate = Box::new(move |envelope| {
            let result = match predicate(envelope) {
                WaitOutcome::Pending => return false,
                WaitOutcome::Success(value) => Ok(value),
                WaitOutcome::Failure(failure) => Err(failure),
            };
            if let Some(tx) = slot.take() {
                let _ = tx.send(result);
            }
            true
        });

        let mut registry = self.registry();
        registry.next_id += 1;
        let id = registry.next_id;

        let entries = registry
            .waiters
            .entry((kind, correlation_id.clone()))
            .or_default();
        if !entries.is_empty() {
            warn!(%kind, %correlation_id, active = entries.len(), "Duplicate waiter registered");
        }
        entries.push(Entry {
            id,
            predicate: settle,
        });

        Ok(Waiter {
            handle: WaitHandle {
                kind,
                correlation_id,
                id,
            },
            router: self.clone(),
            rx,
        })
    }

    /// Remove a waiter. Returns false when it was already gone.
    pub fn unregister(&self, handle: &WaitHandle) -> bool {
        let mut registry = self.registry();
        let key = (handle.kind, handle.correlation_id.clone());

        let Some(entries) = registry.waiters.get_mut(&key) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != handle.id);
        let removed = entries.len() != before;

        if entries.is_empty() {
            registry.waiters.remove(&key);
        }
        removed
    }

    /// Feed a raw channel event through the registry
    pub fn dispatch_raw(&self, kind: EventKind, payload: Value) {
        match EventEnvelope::from_raw(kind, payload) {
            Some(envelope) => self.dispatch(&envelope),
            None => debug!(%kind, "Dropping event without correlation id"),
        }
    }

    /// Evaluate every waiter matching the envelope, in registration order
    pub fn dispatch(&self, envelope: &EventEnvelope) {
        let mut registry = self.registry();
        let key = (envelope.kind, envelope.correlation_id.clone());

        let Some(entries) = registry.waiters.get_mut(&key) else {
            debug!(kind = %envelope.kind, correlation_id = %envelope.correlation_id, "No waiter for event");
            return;
        };

        entries.retain_mut(|entry| !(entry.predicate)(envelope));

        if entries.is_empty() {
            registry.waiters.remove(&key);
        }
    }

    /// Active waiters for one (kind, correlation id) pair
    pub fn waiter_count(&self, kind: EventKind, correlation_id: &CorrelationId) -> usize {
        self.registry()
            .waiters
            .get(&(kind, correlation_id.clone()))
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Active waiters registered under a correlation id, any kind
    pub fn waiters_for(&self, correlation_id: &CorrelationId) -> usize {
        self.registry()
            .waiters
            .iter()
            .filter(|((_, id), _)| id == correlation_id)
            .map(|(_, entries)| entries.len())
            .sum()
    }

    /// Total active waiters
    pub fn pending_waiters(&self) -> usize {
        self.registry().waiters.values().map(Vec::len).sum()
    }
}

/// A registered waiter; unregisters itself when dropped
pub struct Waiter<T> {
    handle: WaitHandle,
    router: EventRouter,
    rx: oneshot::Receiver<Result<T, StateFailure>>,
}

impl<T> Waiter<T> {
    pub fn handle(&self) -> &WaitHandle {
        &self.handle
    }

    /// Wait for the terminal outcome
    pub async fn wait(mut self) -> Result<Result<T, StateFailure>, WaiterClosed> {
        (&mut self.rx).await.map_err(|_| WaiterClosed)
    }
}

impl<T> Drop for Waiter<T> {
    fn drop(&mut self) {
        self.router.unregister(&self.handle);
    }
}
