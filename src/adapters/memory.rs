//! In-process channel for tests and local wiring.
//!
//! Records every invocation, answers from per-command response queues and can
//! run scripted reactions that push events while a command is in flight, the
//! way a live server announces state changes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::{Channel, ChannelError, EventHandler};

/// Scripted reaction: given the command args, the events to push as `(kind, payload)`
pub type Reaction = Arc<dyn Fn(&Value) -> Vec<(String, Value)> + Send + Sync>;

/// A recorded command invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: String,
    pub args: Value,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    handlers: HashMap<String, Vec<EventHandler>>,
    invocations: Vec<Invocation>,
    responses: HashMap<String, VecDeque<Result<Value, ChannelError>>>,
    reactions: HashMap<String, Reaction>,
}

/// Channel backed by in-memory state
#[derive(Clone, Default)]
pub struct MemoryChannel {
    state: Arc<Mutex<State>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a response for the next invocation of `command`.
    ///
    /// Commands without a queued response answer `{}`.
    pub fn respond(&self, command: &str, response: Result<Value, ChannelError>) {
        self.lock()
            .responses
            .entry(command.to_string())
            .or_default()
            .push_back(response);
    }

    /// Queue a remote rejection for the next invocation of `command`
    pub fn reject(&self, command: &str, message: &str) {
        self.respond(
            command,
            Err(ChannelError::Remote {
                command: command.to_string(),
                message: message.to_string(),
            }),
        );
    }

    /// Push events whenever `command` is invoked (before its response returns)
    pub fn on_invoke<F>(&self, command: &str, reaction: F)
    where
        F: Fn(&Value) -> Vec<(String, Value)> + Send + Sync + 'static,
    {
        self.lock()
            .reactions
            .insert(command.to_string(), Arc::new(reaction));
    }

    /// Deliver an event to every handler subscribed to `event`
    pub fn emit(&self, event: &str, payload: Value) {
        let handlers = self.lock().handlers.get(event).cloned().unwrap_or_default();
        for handler in handlers {
            handler(payload.clone());
        }
    }

    /// All invocations so far, in order
    pub fn invocations(&self) -> Vec<Invocation> {
        self.lock().invocations.clone()
    }

    /// Invocations of one command
    pub fn invocations_of(&self, command: &str) -> Vec<Invocation> {
        self.lock()
            .invocations
            .iter()
            .filter(|i| i.command == command)
            .cloned()
            .collect()
    }

    pub fn invocation_count(&self, command: &str) -> usize {
        self.lock()
            .invocations
            .iter()
            .filter(|i| i.command == command)
            .count()
    }

    /// Number of raw handlers subscribed to an event
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.lock().handlers.get(event).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    fn name(&self) -> &str {
        "memory"
    }

    async fn invoke(&self, command: &str, args: Value) -> Result<Value, ChannelError> {
        let (reaction, response) = {
            let mut state = self.lock();
            state.invocations.push(Invocation {
                command: command.to_string(),
                args: args.clone(),
                at: Utc::now(),
            });
            let reaction = state.reactions.get(command).cloned();
            let response = state
                .responses
                .get_mut(command)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Ok(json!({})));
            (reaction, response)
        };

        if let Some(reaction) = reaction {
            for (event, payload) in reaction(&args) {
                self.emit(&event, payload);
            }
        }

        response
    }

    fn subscribe(&self, event: &str, handler: EventHandler) {
        self.lock()
            .handlers
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }
}
