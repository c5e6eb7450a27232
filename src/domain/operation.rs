//! Operation configuration records and their success payloads.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::core::timer::ScheduledCommand;
use crate::error::{ErrorCode, OperationError};

use super::events::{CorrelationId, DtmfSignal};
use super::states::DtmfSource;

/// Pattern every call id must match
pub const CALL_ID_PATTERN: &str = "^[a-zA-Z0-9_-]+$";

/// Pattern for identifiers that only need to be non-blank
pub const NON_EMPTY_PATTERN: &str = "^.+$";

pub(crate) fn is_valid_call_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn require_call_id(code: ErrorCode, field: &str, id: &CorrelationId) -> Result<(), OperationError> {
    if is_valid_call_id(id.as_str()) {
        Ok(())
    } else {
        Err(OperationError::invalid(code, field, CALL_ID_PATTERN))
    }
}

fn require_non_empty(code: ErrorCode, field: &str, value: &str) -> Result<(), OperationError> {
    if value.trim().is_empty() {
        Err(OperationError::invalid(code, field, NON_EMPTY_PATTERN))
    } else {
        Ok(())
    }
}

fn require_positive(code: ErrorCode, field: &str, value: Option<u64>) -> Result<(), OperationError> {
    match value {
        Some(0) => Err(OperationError::invalid(code, field, "^[1-9][0-9]*$")),
        _ => Ok(()),
    }
}

fn require_positive_deadline(code: ErrorCode, deadline: Option<Duration>) -> Result<(), OperationError> {
    match deadline {
        Some(d) if d.is_zero() => Err(OperationError::invalid(code, "deadline", "> 0s")),
        _ => Ok(()),
    }
}

/// Outbound call parameters
#[derive(Debug, Clone, Default)]
pub struct CallConfig {
    /// Generated when absent
    pub call_id: Option<CorrelationId>,
    pub recording_enabled: bool,
    /// Falls back to the orchestrator default
    pub max_duration_secs: Option<u64>,
    pub file_name: String,
    pub target_number: String,
    pub originating_number: String,
    pub gateway_name: String,
    pub deadline: Option<Duration>,
}

impl CallConfig {
    pub fn new(
        target_number: impl Into<String>,
        originating_number: impl Into<String>,
        gateway_name: impl Into<String>,
    ) -> Self {
        Self {
            target_number: target_number.into(),
            originating_number: originating_number.into(),
            gateway_name: gateway_name.into(),
            ..Default::default()
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<CorrelationId>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    /// Record both legs into `file_name` once the call is active
    pub fn with_recording(mut self, file_name: impl Into<String>) -> Self {
        self.recording_enabled = true;
        self.file_name = file_name.into();
        self
    }

    pub fn with_max_duration(mut self, secs: u64) -> Self {
        self.max_duration_secs = Some(secs);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), OperationError> {
        let code = ErrorCode::OutboundCallFailed;
        if let Some(call_id) = &self.call_id {
            require_call_id(code, "callId", call_id)?;
        }
        require_non_empty(code, "targetNumber", &self.target_number)?;
        require_non_empty(code, "originatingNumber", &self.originating_number)?;
        require_non_empty(code, "gatewayName", &self.gateway_name)?;
        if self.recording_enabled {
            require_non_empty(code, "fileName", &self.file_name)?;
        }
        require_positive(code, "maxDurationSeconds", self.max_duration_secs)?;
        require_positive_deadline(code, self.deadline)
    }
}

/// Gateway registration parameters
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub username: String,
    pub password: String,
    pub template_name: String,
    pub deadline: Option<Duration>,
}

impl GatewayConfig {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        template_name: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            template_name: template_name.into(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), OperationError> {
        let code = ErrorCode::GatewayConfigurationError;
        require_non_empty(code, "username", &self.username)?;
        require_non_empty(code, "templateName", &self.template_name)?;
        require_positive_deadline(code, self.deadline)
    }
}

#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub call_id: CorrelationId,
    pub uri: String,
    pub deadline: Option<Duration>,
}

impl PlaybackConfig {
    pub fn new(call_id: impl Into<CorrelationId>, uri: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            uri: uri.into(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), OperationError> {
        let code = ErrorCode::PlayAudioFailed;
        require_call_id(code, "callId", &self.call_id)?;
        require_non_empty(code, "uri", &self.uri)?;
        require_positive_deadline(code, self.deadline)
    }
}

#[derive(Debug, Clone)]
pub struct DtmfConfig {
    pub call_id: CorrelationId,
    /// Falls back to the orchestrator default
    pub timeout_secs: Option<u64>,
    pub deadline: Option<Duration>,
}

impl DtmfConfig {
    pub fn new(call_id: impl Into<CorrelationId>) -> Self {
        Self {
            call_id: call_id.into(),
            timeout_secs: None,
            deadline: None,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), OperationError> {
        let code = ErrorCode::DtmfOperationFailed;
        require_call_id(code, "callId", &self.call_id)?;
        require_positive(code, "timeoutSeconds", self.timeout_secs)?;
        require_positive_deadline(code, self.deadline)
    }
}

/// Outcome of a successful outbound call
#[derive(Debug)]
pub struct CallResult {
    pub call_id: CorrelationId,
    /// Response to `makeCall`
    pub response: Value,
    /// Armed auto-hangup; dropping it leaves the hangup scheduled
    pub auto_hangup: Option<ScheduledCommand>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResult {
    pub gateway_name: String,
    /// Response to `activateGateway`
    pub response: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackResult {
    pub call_id: CorrelationId,
    pub uri: String,
    /// Response to `playUri`
    pub response: Value,
}

/// A captured DTMF digit, or the empty sentinel when nothing was pressed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DtmfResult {
    pub call_id: CorrelationId,
    pub digit: String,
    pub source: DtmfSource,
    pub duration: f64,
    pub event_time: String,
}

impl DtmfResult {
    /// The "no digit pressed" sentinel
    pub fn empty(call_id: CorrelationId) -> Self {
        Self {
            call_id,
            digit: String::new(),
            source: DtmfSource::default(),
            duration: 0.0,
            event_time: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.digit.is_empty()
    }
}

impl From<DtmfSignal> for DtmfResult {
    fn from(signal: DtmfSignal) -> Self {
        Self {
            call_id: CorrelationId::from(signal.call_id),
            digit: signal.dtmf_digit,
            source: signal.dtmf_source,
            duration: signal.dtmf_duration.unwrap_or(0.0),
            event_time: signal.event_time.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn test_call_id_pattern() {
        assert!(is_valid_call_id("abc_DEF-123"));
        assert!(!is_valid_call_id(""));
        assert!(!is_valid_call_id("has space"));
        assert!(!is_valid_call_id("semi;colon"));
    }

    #[test]
    fn test_call_config_requires_file_name_when_recording() {
        let config = CallConfig::new("+49301234", "+49305678", "gw-1").with_recording("");
        let err = config.validate().unwrap_err();

        assert_eq!(err.code(), ErrorCode::OutboundCallFailed);
        assert_eq!(err.kind(), FailureKind::InvalidRequest);
        assert_eq!(err.reason(), Some(ErrorCode::FieldPatternMismatch));
        assert_eq!(err.context().get("field"), Some("fileName"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = DtmfConfig::new("c1").with_timeout(0).validate().unwrap_err();
        assert_eq!(err.code(), ErrorCode::DtmfOperationFailed);
        assert_eq!(err.context().get("field"), Some("timeoutSeconds"));
    }

    #[test]
    fn test_playback_rejects_bad_call_id() {
        let err = PlaybackConfig::new("bad id", "https://x/a.wav")
            .validate()
            .unwrap_err();
        assert_eq!(err.context().get("pattern"), Some(CALL_ID_PATTERN));
    }

    #[test]
    fn test_dtmf_sentinel() {
        let empty = DtmfResult::empty(CorrelationId::from("c1"));
        assert!(empty.is_empty());
        assert_eq!(empty.source, DtmfSource::Endpoint);
        assert_eq!(empty.duration, 0.0);
    }
}
