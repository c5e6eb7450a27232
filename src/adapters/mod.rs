//! Channel interface to the remote telephony service.
//!
//! The channel is an external collaborator: it carries request/response
//! commands and pushes broadcast events. Connection bootstrap, framing and
//! authentication live behind this trait.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use memory::{Invocation, MemoryChannel};

/// Raw event handler registered with [`Channel::subscribe`]
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Errors surfaced by a channel
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("Remote rejected '{command}': {message}")]
    Remote { command: String, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Channel closed")]
    Closed,
}

/// Bidirectional command/event channel
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name
    fn name(&self) -> &str;

    /// Invoke a remote command and wait for its response
    async fn invoke(&self, command: &str, args: Value) -> Result<Value, ChannelError>;

    /// Add a multicast handler for an event kind.
    ///
    /// Handlers are never removed; every handler sees every event of the kind.
    fn subscribe(&self, event: &str, handler: EventHandler);
}
