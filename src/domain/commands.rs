//! Commands issued over the channel.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::events::{CorrelationId, GatewayInfo};

/// Remote commands used by the operation catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    MakeCall,
    HangupCall,
    StartRecording,
    AddGatewayConfiguration,
    ActivateGateway,
    PlayUri,
    EnableDtmfEvents,
    DisableDtmfEvents,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::MakeCall => "makeCall",
            Command::HangupCall => "hangupCall",
            Command::StartRecording => "startRecording",
            Command::AddGatewayConfiguration => "addGatewayConfiguration",
            Command::ActivateGateway => "activateGateway",
            Command::PlayUri => "playUri",
            Command::EnableDtmfEvents => "enableDtmfEvents",
            Command::DisableDtmfEvents => "disableDtmfEvents",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command plus its arguments, ready to invoke
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub command: Command,
    pub args: Value,
}

impl Request {
    pub fn new(command: Command, args: Value) -> Self {
        Self { command, args }
    }

    pub fn make_call(
        call_id: &CorrelationId,
        target_number: &str,
        originating_number: &str,
        gateway_name: &str,
    ) -> Self {
        Self::new(
            Command::MakeCall,
            json!({
                "callId": call_id,
                "targetNumber": target_number,
                "originatingNumber": originating_number,
                "gatewayName": gateway_name,
            }),
        )
    }

    pub fn hangup_call(call_id: &str) -> Self {
        Self::new(Command::HangupCall, json!({ "callId": call_id }))
    }

    /// Record both legs of the call into `file_name`
    pub fn start_recording(call_id: &str, file_name: &str) -> Self {
        Self::new(
            Command::StartRecording,
            json!({
                "callId": call_id,
                "fileName": file_name,
                "leftChannel": { "recordingMode": "RECORD" },
                "rightChannel": { "recordingMode": "RECORD" },
            }),
        )
    }

    pub fn add_gateway_configuration(template_name: &str, username: &str, password: &str) -> Self {
        Self::new(
            Command::AddGatewayConfiguration,
            json!({
                "templateName": template_name,
                "properties": [
                    { "key": "username", "value": username },
                    { "key": "password", "value": password },
                ],
            }),
        )
    }

    pub fn activate_gateway(gateway_name: &CorrelationId) -> Self {
        Self::new(Command::ActivateGateway, json!({ "gatewayName": gateway_name }))
    }

    pub fn play_uri(call_id: &CorrelationId, uri: &str) -> Self {
        Self::new(Command::PlayUri, json!({ "callId": call_id, "uri": uri }))
    }

    pub fn enable_dtmf_events(call_id: &CorrelationId) -> Self {
        Self::new(Command::EnableDtmfEvents, json!({ "callId": call_id }))
    }

    pub fn disable_dtmf_events(call_id: &CorrelationId) -> Self {
        Self::new(Command::DisableDtmfEvents, json!({ "callId": call_id }))
    }
}

/// Response of `addGatewayConfiguration`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddGatewayConfigurationResponse {
    pub gateway_information: GatewayInfo,
    #[serde(default)]
    pub event_time: Option<String>,
}
