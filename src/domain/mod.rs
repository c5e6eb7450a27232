//! Domain types for the call-flow orchestrator.
//!
//! - Events: push events, correlation ids and envelopes
//! - States: static state enums carried by events
//! - Commands: remote commands and their arguments
//! - Operation: configuration records and result payloads

pub mod commands;
pub mod events;
pub mod operation;
pub mod states;

// Re-export commonly used types
pub use commands::{AddGatewayConfigurationResponse, Command, Request};
pub use events::{
    CallStateChanged, CorrelationId, DtmfSignal, EventEnvelope, EventKind, GatewayInfo,
    GatewayStateChanged, PlaybackStateChanged, StateEvent,
};
pub use operation::{
    CallConfig, CallResult, DtmfConfig, DtmfResult, GatewayConfig, GatewayResult, PlaybackConfig,
    PlaybackResult,
};
pub use states::{CallState, DtmfSource, GatewayState, PlaybackState};
