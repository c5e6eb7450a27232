//! Operation catalog.
//!
//! Each operation instantiates a workflow shape with a static state table and
//! its side effects, then normalizes every failure under the operation's own
//! error code.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{error, field, info, instrument, warn, Span};

use crate::adapters::Channel;
use crate::config::{self, FlowDefaults};
use crate::domain::{
    AddGatewayConfigurationResponse, CallConfig, CallResult, CallState, CallStateChanged,
    CorrelationId, DtmfConfig, DtmfResult, DtmfSignal, EventKind, GatewayConfig, GatewayResult,
    GatewayState, GatewayStateChanged, PlaybackConfig, PlaybackResult, PlaybackState,
    PlaybackStateChanged, Request,
};
use crate::error::{ErrorCode, ErrorContext, OperationError};

use super::router::{EventRouter, WaitOutcome};
use super::workflow::{
    with_deadline, RaceOutcome, SideEffect, StateTable, Transition, WorkflowEngine, WorkflowError,
};

static CALL_STATES: StateTable<CallState> = StateTable::new(&[
    (CallState::Active, Transition::Success),
    (CallState::Hangup, Transition::Failure(ErrorCode::CallHungUp)),
    (CallState::Down, Transition::Failure(ErrorCode::CallNotActive)),
]);

static GATEWAY_STATES: StateTable<GatewayState> = StateTable::new(&[
    (GatewayState::Reged, Transition::Success),
    (GatewayState::Failed, Transition::Failure(ErrorCode::GatewayConfigurationFailed)),
    (GatewayState::Unregister, Transition::Failure(ErrorCode::GatewayNotRegistered)),
]);

static PLAYBACK_STATES: StateTable<PlaybackState> = StateTable::new(&[
    (PlaybackState::Stopped, Transition::Success),
    (PlaybackState::Failed, Transition::Failure(ErrorCode::PlaybackFailed)),
]);

/// Runs call-flow operations over a channel
pub struct Orchestrator {
    engine: WorkflowEngine,
    defaults: FlowDefaults,
}

impl Orchestrator {
    /// Create an orchestrator with built-in defaults
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self::with_defaults(channel, FlowDefaults::default())
    }

    pub fn with_defaults(channel: Arc<dyn Channel>, defaults: FlowDefaults) -> Self {
        Self {
            engine: WorkflowEngine::new(channel),
            defaults,
        }
    }

    /// Create an orchestrator using the resolved configuration
    pub fn from_config(channel: Arc<dyn Channel>) -> anyhow::Result<Self> {
        let resolved = config::config()?;
        Ok(Self::with_defaults(channel, resolved.defaults.clone()))
    }

    pub fn router(&self) -> &EventRouter {
        self.engine.router()
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub fn defaults(&self) -> &FlowDefaults {
        &self.defaults
    }

    fn deadline(&self, requested: Option<Duration>) -> Option<Duration> {
        requested.or_else(|| self.defaults.operation_deadline())
    }

    /// Place an outbound call and wait until it is answered.
    ///
    /// On `ACTIVE` the auto-hangup is armed and, when requested, recording is
    /// started; a recording failure fails the operation even though the call
    /// is up.
    #[instrument(skip(self, config), fields(call_id = field::Empty))]
    pub async fn place_call(&self, config: CallConfig) -> Result<CallResult, OperationError> {
        const CODE: ErrorCode = ErrorCode::OutboundCallFailed;

        config.validate().map_err(logged)?;

        let call_id = config.call_id.clone().unwrap_or_else(CorrelationId::generate);
        Span::current().record("call_id", call_id.as_str());

        let max_duration = Duration::from_secs(
            config
                .max_duration_secs
                .unwrap_or(self.defaults.max_call_duration_secs),
        );
        info!(
            target_number = %config.target_number,
            gateway = %config.gateway_name,
            max_duration_secs = max_duration.as_secs(),
            recording = config.recording_enabled,
            "Placing outbound call"
        );

        let mut effects = vec![SideEffect::schedule(
            CallState::Active,
            max_duration,
            ErrorCode::FailedToHangupCall,
            |event: &CallStateChanged| Request::hangup_call(&event.call_id),
        )];
        if config.recording_enabled {
            let file_name = config.file_name.clone();
            effects.push(SideEffect::invoke(
                CallState::Active,
                ErrorCode::RecordingFailedToStart,
                move |event: &CallStateChanged| Request::start_recording(&event.call_id, &file_name),
            ));
        }

        let request = Request::make_call(
            &call_id,
            &config.target_number,
            &config.originating_number,
            &config.gateway_name,
        );

        let mut outcome = with_deadline(
            self.deadline(config.deadline),
            self.engine.gated_state_machine::<Value, CallStateChanged, _>(
                request,
                &call_id,
                &CALL_STATES,
                describe_call,
                effects,
            ),
        )
        .await
        .map_err(|e| report(CODE, e, ErrorContext::new().with("callId", &call_id)))?;

        info!(server_call_id = ?outcome.event.server_call_id, "Call active");

        Ok(CallResult {
            call_id,
            response: outcome.response,
            auto_hangup: outcome.scheduled.pop(),
        })
    }

    /// Add a gateway configuration, activate it and wait for registration
    #[instrument(skip(self, config), fields(template = %config.template_name))]
    pub async fn configure_gateway(
        &self,
        config: GatewayConfig,
    ) -> Result<GatewayResult, OperationError> {
        const CODE: ErrorCode = ErrorCode::GatewayConfigurationError;

        config.validate().map_err(logged)?;
        info!(username = %config.username, "Configuring gateway");

        let mut gateway_name = None;
        let registered = with_deadline(
            self.deadline(config.deadline),
            self.register_gateway(&config, &mut gateway_name),
        )
        .await;

        match registered {
            Ok(response) => {
                let gateway_name = gateway_name.unwrap_or_default();
                info!(gateway = %gateway_name, "Gateway registered");
                Ok(GatewayResult {
                    gateway_name,
                    response,
                })
            }
            Err(e) => {
                let mut context = ErrorContext::new().with("templateName", &config.template_name);
                if let Some(name) = gateway_name {
                    context.insert("gatewayName", name);
                }
                Err(report(CODE, e, context))
            }
        }
    }

    async fn register_gateway(
        &self,
        config: &GatewayConfig,
        gateway_name: &mut Option<String>,
    ) -> Result<Value, WorkflowError> {
        let added: AddGatewayConfigurationResponse = self
            .engine
            .invoke(&Request::add_gateway_configuration(
                &config.template_name,
                &config.username,
                &config.password,
            ))
            .await?;

        let name = added.gateway_information.name;
        info!(gateway = %name, state = %added.gateway_information.gateway_state, "Gateway configuration added");
        *gateway_name = Some(name.clone());

        let name = CorrelationId::from(name);
        let outcome = self
            .engine
            .gated_state_machine::<Value, GatewayStateChanged, _>(
                Request::activate_gateway(&name),
                &name,
                &GATEWAY_STATES,
                describe_gateway,
                Vec::new(),
            )
            .await?;

        Ok(outcome.response)
    }

    /// Play an audio uri on a call and wait until playback stops
    #[instrument(skip(self, config), fields(call_id = %config.call_id))]
    pub async fn play_audio(&self, config: PlaybackConfig) -> Result<PlaybackResult, OperationError> {
        const CODE: ErrorCode = ErrorCode::PlayAudioFailed;

        config.validate().map_err(logged)?;
        info!(uri = %config.uri, "Starting playback");

        let uri = config.uri.clone();
        let describe = move |event: &PlaybackStateChanged| {
            ErrorContext::new()
                .with("uri", event.uri.as_deref().unwrap_or(uri.as_str()))
                .with("callId", &event.call_id)
                .with("playBackState", event.play_back_state)
        };

        let outcome = with_deadline(
            self.deadline(config.deadline),
            self.engine.gated_state_machine::<Value, PlaybackStateChanged, _>(
                Request::play_uri(&config.call_id, &config.uri),
                &config.call_id,
                &PLAYBACK_STATES,
                describe,
                Vec::new(),
            ),
        )
        .await
        .map_err(|e| {
            let context = ErrorContext::new()
                .with("callId", &config.call_id)
                .with("uri", &config.uri);
            report(CODE, e, context)
        })?;

        info!("Playback finished");

        Ok(PlaybackResult {
            call_id: config.call_id,
            uri: config.uri,
            response: outcome.response,
        })
    }

    /// Wait for one DTMF digit.
    ///
    /// A timeout is not an error: it yields [`DtmfResult::empty`].
    #[instrument(skip(self, config), fields(call_id = %config.call_id))]
    pub async fn capture_dtmf(&self, config: DtmfConfig) -> Result<DtmfResult, OperationError> {
        const CODE: ErrorCode = ErrorCode::DtmfOperationFailed;

        config.validate().map_err(logged)?;

        let call_id = config.call_id.clone();
        let timeout = Duration::from_secs(
            config
                .timeout_secs
                .unwrap_or(self.defaults.dtmf_timeout_secs),
        );
        info!(timeout_secs = timeout.as_secs(), "Capturing DTMF");

        let raced = self
            .engine
            .race_with_timeout(
                Request::enable_dtmf_events(&call_id),
                EventKind::DtmfSignal,
                &call_id,
                first_signal,
                timeout,
                Request::disable_dtmf_events(&call_id),
                self.deadline(config.deadline),
            )
            .await
        .map_err(|e| report(CODE, e, ErrorContext::new().with("callId", &call_id)))?;

        match raced {
            RaceOutcome::Event(signal) => {
                info!(digit = %signal.dtmf_digit, source = %signal.dtmf_source, "DTMF captured");
                Ok(DtmfResult::from(signal))
            }
            RaceOutcome::TimedOut => {
                info!("No DTMF digit before timeout");
                Ok(DtmfResult::empty(call_id))
            }
        }
    }
}

fn describe_call(event: &CallStateChanged) -> ErrorContext {
    ErrorContext::new()
        .with("callId", &event.call_id)
        .with("callState", event.call_state)
}

fn describe_gateway(event: &GatewayStateChanged) -> ErrorContext {
    ErrorContext::new()
        .with("gatewayName", &event.gateway.name)
        .with("gatewayState", event.gateway.gateway_state)
}

fn first_signal(envelope: &crate::domain::EventEnvelope) -> WaitOutcome<DtmfSignal> {
    match envelope.decode::<DtmfSignal>() {
        Ok(signal) => WaitOutcome::Success(signal),
        Err(e) => {
            warn!(correlation_id = %envelope.correlation_id, error = %e, "Ignoring malformed DTMF signal");
            WaitOutcome::Pending
        }
    }
}

/// Normalize under `code`, keep any identifying fields the failure lacks, log it
fn report(code: ErrorCode, error: WorkflowError, identity: ErrorContext) -> OperationError {
    let mut err = OperationError::normalize(code, error);
    for (key, value) in identity.iter() {
        if !err.context().contains_key(key) {
            err = err.with_context(key, value);
        }
    }
    logged(err)
}

fn logged(err: OperationError) -> OperationError {
    match err.reason() {
        Some(reason) => error!(code = %err.code(), kind = %err.kind(), %reason, "{}", err.message()),
        None => error!(code = %err.code(), kind = %err.kind(), "{}", err.message()),
    }
    err
}
