//! Error catalogue and the normalized operation error.
//!
//! Every failure that leaves an operation is an [`OperationError`]: the
//! operation's own code, a [`FailureKind`] tag, the contextual fields that
//! identify what failed, and the low-level cause as `source()`.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::core::workflow::WorkflowError;

/// Error codes shared with the remote service's catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    FieldPatternMismatch,
    UnknownError,
    PlaybackFailed,
    GatewayNotRegistered,
    CallNotActive,
    FailedToHangupCall,
    RecordingFailedToStart,
    CallHungUp,
    OutboundCallFailed,
    GatewayConfigurationFailed,
    GatewayConfigurationError,
    DtmfOperationFailed,
    PlayAudioFailed,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 13] = [
        ErrorCode::FieldPatternMismatch,
        ErrorCode::UnknownError,
        ErrorCode::PlaybackFailed,
        ErrorCode::GatewayNotRegistered,
        ErrorCode::CallNotActive,
        ErrorCode::FailedToHangupCall,
        ErrorCode::RecordingFailedToStart,
        ErrorCode::CallHungUp,
        ErrorCode::OutboundCallFailed,
        ErrorCode::GatewayConfigurationFailed,
        ErrorCode::GatewayConfigurationError,
        ErrorCode::DtmfOperationFailed,
        ErrorCode::PlayAudioFailed,
    ];

    /// Wire form of the code (e.g. `ttLEC3037`)
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::FieldPatternMismatch => "ttLEC3024",
            ErrorCode::UnknownError => "ttLEC3029",
            ErrorCode::PlaybackFailed => "ttLEC3031",
            ErrorCode::GatewayNotRegistered => "ttLEC3032",
            ErrorCode::CallNotActive => "ttLEC3033",
            ErrorCode::FailedToHangupCall => "ttLEC3034",
            ErrorCode::RecordingFailedToStart => "ttLEC3035",
            ErrorCode::CallHungUp => "ttLEC3036",
            ErrorCode::OutboundCallFailed => "ttLEC3037",
            ErrorCode::GatewayConfigurationFailed => "ttLEC3038",
            ErrorCode::GatewayConfigurationError => "ttLEC3039",
            ErrorCode::DtmfOperationFailed => "ttLEC3041",
            ErrorCode::PlayAudioFailed => "ttLEC3042",
        }
    }

    /// Message template; `$name` placeholders are filled from an [`ErrorContext`]
    pub fn template(&self) -> &'static str {
        match self {
            ErrorCode::FieldPatternMismatch => "$field does not match the required pattern $pattern",
            ErrorCode::UnknownError => {
                "Unexpected error: The operation could not be completed due to an internal issue : $details"
            }
            ErrorCode::PlaybackFailed => {
                "playback '$uri' for call '$callId' failed due to '$playBackState' state!"
            }
            ErrorCode::GatewayNotRegistered => {
                "Gateway '$gatewayName' not registered due to '$gatewayState' state!"
            }
            ErrorCode::CallNotActive => "Call with id '$callId' not active due to '$callState' state!",
            ErrorCode::FailedToHangupCall => "Failed to hangup call: $details",
            ErrorCode::RecordingFailedToStart => "Recording failed to start: $details",
            ErrorCode::CallHungUp => "Call with ID $callId was hung up",
            ErrorCode::OutboundCallFailed => "Outbound call failed: $details",
            ErrorCode::GatewayConfigurationFailed => "Gateway configuration failed: $gatewayName",
            ErrorCode::GatewayConfigurationError => "Gateway configuration error: $details",
            ErrorCode::DtmfOperationFailed => "DTMF operation failed: $details",
            ErrorCode::PlayAudioFailed => "Play audio failed: $details",
        }
    }

    /// Render the template against a context
    pub fn render(&self, context: &ErrorContext) -> String {
        let template = self.template();
        let mut out = String::with_capacity(template.len());
        let mut chars = template.char_indices().peekable();

        while let Some((_, c)) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }

            let mut name = String::new();
            while let Some(&(_, next)) = chars.peek() {
                if next.is_ascii_alphanumeric() || next == '_' {
                    name.push(next);
                    chars.next();
                } else {
                    break;
                }
            }

            match context.get(&name) {
                Some(value) => out.push_str(value),
                None => {
                    out.push('$');
                    out.push_str(&name);
                }
            }
        }

        out
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered key/value context attached to a failure (ids, states, uris)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorContext(BTreeMap<String, String>);

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Copy entries from `other` that are not already present
    pub fn merge_missing(&mut self, other: &ErrorContext) {
        for (key, value) in &other.0 {
            self.0.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A state machine reached a state defined as a failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.message())]
pub struct StateFailure {
    pub code: ErrorCode,
    pub context: ErrorContext,
}

impl StateFailure {
    pub fn new(code: ErrorCode, context: ErrorContext) -> Self {
        Self { code, context }
    }

    pub fn message(&self) -> String {
        self.code.render(&self.context)
    }
}

/// Failure taxonomy tag carried by every [`OperationError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The initiating command itself was rejected
    RemoteRejection,

    /// The state machine reached a defined failure state
    TerminalNegativeState,

    /// A follow-up command failed after the primary condition succeeded
    SideEffectFailure,

    /// A deadline elapsed before a terminal event arrived
    Timeout,

    /// The request was rejected before anything was sent
    InvalidRequest,

    /// A waiter was discarded before it settled
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::RemoteRejection => "remote rejection",
            FailureKind::TerminalNegativeState => "terminal negative state",
            FailureKind::SideEffectFailure => "side effect failure",
            FailureKind::Timeout => "timeout",
            FailureKind::InvalidRequest => "invalid request",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// The normalized error returned by every operation entry point
#[derive(Debug, Error)]
#[error("[{code}] {message}")]
pub struct OperationError {
    code: ErrorCode,
    kind: FailureKind,
    reason: Option<ErrorCode>,
    context: ErrorContext,
    message: String,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl OperationError {
    /// Normalize an engine failure under an operation's code
    pub fn normalize(code: ErrorCode, error: WorkflowError) -> Self {
        let kind = error.kind();
        let reason = error.reason();
        let mut context = error.context();
        context.insert("details", error.to_string());

        Self {
            message: code.render(&context),
            code,
            kind,
            reason,
            context,
            cause: Some(Box::new(error)),
        }
    }

    /// Entry validation failure (nothing was sent)
    pub fn invalid(code: ErrorCode, field: &str, pattern: &str) -> Self {
        let inner = StateFailure::new(
            ErrorCode::FieldPatternMismatch,
            ErrorContext::new().with("field", field).with("pattern", pattern),
        );
        let context = inner.context.clone().with("details", inner.message());

        Self {
            message: code.render(&context),
            code,
            kind: FailureKind::InvalidRequest,
            reason: Some(ErrorCode::FieldPatternMismatch),
            context,
            cause: Some(Box::new(inner)),
        }
    }

    /// Add (or overwrite) a context entry
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key, value);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// The state-specific code, when the failure has one (e.g. call hung up)
    pub fn reason(&self) -> Option<ErrorCode> {
        self.reason
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
