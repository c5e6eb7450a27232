//! Push events delivered by the channel.
//!
//! Every raw event is wrapped in an [`EventEnvelope`] that records its kind and
//! correlation id, so the router can match it to waiters without decoding the
//! full payload.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::states::{CallState, DtmfSource, GatewayState, PlaybackState};

/// Identifier tying a command to the events it produces (call id, gateway name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh client-side id, safe for the `^[a-zA-Z0-9_-]+$` call id pattern
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Kinds of push events the channel can deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    NewCall,
    CallStateChanged,
    CallFinalized,
    RecordingStateChanged,
    RecordingFinalized,
    RecordingError,
    GatewayStateChanged,
    PlayBackStateChanged,
    PlayBackError,
    DtmfSignal,
    SendRtpStateChanged,
    SendRtpSsrc,
    SendRtpError,
}

impl EventKind {
    pub const ALL: [EventKind; 13] = [
        EventKind::NewCall,
        EventKind::CallStateChanged,
        EventKind::CallFinalized,
        EventKind::RecordingStateChanged,
        EventKind::RecordingFinalized,
        EventKind::RecordingError,
        EventKind::GatewayStateChanged,
        EventKind::PlayBackStateChanged,
        EventKind::PlayBackError,
        EventKind::DtmfSignal,
        EventKind::SendRtpStateChanged,
        EventKind::SendRtpSsrc,
        EventKind::SendRtpError,
    ];

    /// Event name on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewCall => "newCall",
            EventKind::CallStateChanged => "callStateChanged",
            EventKind::CallFinalized => "callFinalized",
            EventKind::RecordingStateChanged => "recordingStateChanged",
            EventKind::RecordingFinalized => "recordingFinalized",
            EventKind::RecordingError => "recordingError",
            EventKind::GatewayStateChanged => "gatewayStateChanged",
            EventKind::PlayBackStateChanged => "playBackStateChanged",
            EventKind::PlayBackError => "playBackError",
            EventKind::DtmfSignal => "dtmfSignal",
            EventKind::SendRtpStateChanged => "sendRtpStateChanged",
            EventKind::SendRtpSsrc => "sendRtpSsrc",
            EventKind::SendRtpError => "sendRtpError",
        }
    }

    /// JSON pointer to the correlation id inside the payload
    pub fn correlation_pointer(&self) -> &'static str {
        match self {
            EventKind::GatewayStateChanged => "/gateway/name",
            _ => "/callId",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw event tagged with its kind and correlation id
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub kind: EventKind,
    pub correlation_id: CorrelationId,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl EventEnvelope {
    /// Wrap a raw payload; `None` when the correlation field is missing or empty
    pub fn from_raw(kind: EventKind, payload: Value) -> Option<Self> {
        let id = payload
            .pointer(kind.correlation_pointer())
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())?
            .to_string();

        Some(Self {
            kind,
            correlation_id: CorrelationId(id),
            payload,
            received_at: Utc::now(),
        })
    }

    /// Decode the payload into a typed event
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// A typed event whose embedded state drives a state machine
pub trait StateEvent: DeserializeOwned + Clone + Send + 'static {
    type State: Copy + PartialEq + fmt::Display + Send + Sync + 'static;

    const KIND: EventKind;

    fn state(&self) -> Self::State;
}

/// `callStateChanged` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStateChanged {
    pub call_id: String,
    pub call_state: CallState,
    #[serde(default)]
    pub server_call_id: Option<String>,
    #[serde(default)]
    pub event_time: Option<String>,
}

impl StateEvent for CallStateChanged {
    type State = CallState;

    const KIND: EventKind = EventKind::CallStateChanged;

    fn state(&self) -> CallState {
        self.call_state
    }
}

/// Gateway identity and state as reported by the service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayInfo {
    pub name: String,
    pub gateway_state: GatewayState,
}

/// `gatewayStateChanged` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStateChanged {
    pub gateway: GatewayInfo,
    #[serde(default)]
    pub event_time: Option<String>,
}

impl StateEvent for GatewayStateChanged {
    type State = GatewayState;

    const KIND: EventKind = EventKind::GatewayStateChanged;

    fn state(&self) -> GatewayState {
        self.gateway.gateway_state
    }
}

/// `playBackStateChanged` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStateChanged {
    pub call_id: String,
    pub play_back_state: PlaybackState,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub event_time: Option<String>,
}

impl StateEvent for PlaybackStateChanged {
    type State = PlaybackState;

    const KIND: EventKind = EventKind::PlayBackStateChanged;

    fn state(&self) -> PlaybackState {
        self.play_back_state
    }
}

/// `dtmfSignal` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtmfSignal {
    pub call_id: String,
    pub dtmf_digit: String,
    #[serde(default)]
    pub dtmf_source: DtmfSource,
    /// Milliseconds; the service may report fractions
    #[serde(default)]
    pub dtmf_duration: Option<f64>,
    #[serde(default)]
    pub event_time: Option<String>,
}
