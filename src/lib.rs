//! callflow - correlated async call-flow orchestrator
//!
//! Drives telephony operations (outbound calls, gateway registration, audio
//! playback, DTMF capture) over a command/event channel whose event
//! subscriptions are global and cannot be removed.
//!
//! # Architecture
//!
//! - Every command is paired with the push events it causes through a
//!   correlation id (call id or gateway name)
//! - The event router holds one raw handler per event kind and dispatches to
//!   correlation-scoped waiters, removing them logically once they settle
//! - Operations are small instantiations of a few workflow shapes with static
//!   state tables
//!
//! # Modules
//!
//! - `adapters`: The `Channel` trait and an in-memory channel
//! - `core`: Router, workflow engine, timers, operation catalog
//! - `domain`: Events, states, commands, operation records
//! - `error`: Error codes and the normalized `OperationError`
//! - `config`: Operation defaults
//! - `cli`: Diagnostic command-line interface
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use callflow::{DtmfConfig, MemoryChannel, Orchestrator};
//!
//! # async fn run() -> Result<(), callflow::OperationError> {
//! let orchestrator = Orchestrator::new(Arc::new(MemoryChannel::new()));
//! let digit = orchestrator.capture_dtmf(DtmfConfig::new("call-1").with_timeout(5)).await?;
//! if digit.is_empty() {
//!     println!("nothing pressed");
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;

// Re-export main types at crate root for convenience
pub use adapters::{Channel, ChannelError, MemoryChannel};
pub use config::FlowDefaults;
pub use core::{EventRouter, Orchestrator, ScheduledCommand};
pub use domain::{
    CallConfig, CallResult, CorrelationId, DtmfConfig, DtmfResult, EventKind, GatewayConfig,
    GatewayResult, PlaybackConfig, PlaybackResult,
};
pub use error::{ErrorCode, FailureKind, OperationError};
