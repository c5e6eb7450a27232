//! State enums carried by push events.
//!
//! Values the service may add later decode as `Other` instead of failing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Call lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallState {
    Down,
    Waiting,
    Dialing,
    Offering,
    Ringing,
    Active,
    Hangup,
    Finalized,
    #[serde(other)]
    Other,
}

/// Gateway registration state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayState {
    Down,
    Trying,
    Register,
    Reged,
    Unregister,
    Unreged,
    FailWait,
    Failed,
    Expired,
    Noreg,
    Inactive,
    #[serde(other)]
    Other,
}

/// Audio playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
    Failed,
    #[serde(other)]
    Other,
}

/// Where a DTMF digit was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DtmfSource {
    Rtp,
    InbandAudio,
    #[default]
    Endpoint,
    #[serde(other)]
    Other,
}

/// Display in wire form (`ACTIVE`, `REGED`, ...)
macro_rules! wire_display {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    match serde_json::to_value(self) {
                        Ok(serde_json::Value::String(s)) => f.write_str(&s),
                        _ => write!(f, "{:?}", self),
                    }
                }
            }
        )*
    };
}

wire_display!(CallState, GatewayState, PlaybackState, DtmfSource);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(CallState::Active.to_string(), "ACTIVE");
        assert_eq!(GatewayState::FailWait.to_string(), "FAIL_WAIT");
        assert_eq!(PlaybackState::Stopped.to_string(), "STOPPED");
        assert_eq!(DtmfSource::default(), DtmfSource::Endpoint);
        assert_eq!(DtmfSource::InbandAudio.to_string(), "INBAND_AUDIO");
    }

    #[test]
    fn test_dtmf_sources_decode() {
        for (wire, source) in [
            ("\"RTP\"", DtmfSource::Rtp),
            ("\"INBAND_AUDIO\"", DtmfSource::InbandAudio),
            ("\"ENDPOINT\"", DtmfSource::Endpoint),
            ("\"CARRIER_PIGEON\"", DtmfSource::Other),
        ] {
            assert_eq!(serde_json::from_str::<DtmfSource>(wire).unwrap(), source);
        }
    }

    #[test]
    fn test_unknown_state_decodes_as_other() {
        let state: GatewayState = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(state, GatewayState::Other);

        let state: CallState = serde_json::from_str("\"HANGUP\"").unwrap();
        assert_eq!(state, CallState::Hangup);
    }
}
