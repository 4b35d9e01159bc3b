//! Wire envelopes exchanged with the collector.
//!
//! Every frame is a JSON text message tagged by `type`.

use racing_telemetry_core::TelemetryRecord;
use serde::{Deserialize, Serialize};

/// Frames sent to the collector.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage<'a> {
    Telemetry { data: &'a TelemetryRecord },
    Pong,
}

impl OutboundMessage<'_> {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frames received from the collector.
///
/// Anything the client does not act on lands in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Ping,
    #[serde(other)]
    Other,
}

impl InboundMessage {
    /// `None` for text that is not a tagged JSON object.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use racing_telemetry_core::{RecordTimestamp, SourceTitle};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_telemetry_envelope_shape() -> TestResult {
        let record = TelemetryRecord::new(SourceTitle::AssettoCorsa, RecordTimestamp::now());
        let json = OutboundMessage::Telemetry { data: &record }.to_json()?;
        let value: serde_json::Value = serde_json::from_str(&json)?;

        assert_eq!(value["type"], "telemetry");
        assert!(value["data"].is_object());
        let echoed: TelemetryRecord = serde_json::from_value(value["data"].clone())?;
        assert_eq!(echoed, record);
        Ok(())
    }

    #[test]
    fn test_pong_envelope() -> TestResult {
        assert_eq!(OutboundMessage::Pong.to_json()?, r#"{"type":"pong"}"#);
        Ok(())
    }

    #[test]
    fn test_inbound_parsing() -> TestResult {
        assert_eq!(InboundMessage::parse(r#"{"type":"ping"}"#), Some(InboundMessage::Ping));
        assert_eq!(
            InboundMessage::parse(r#"{"type":"ack","seq":3}"#),
            Some(InboundMessage::Other)
        );
        assert_eq!(InboundMessage::parse("not json"), None);
        assert_eq!(InboundMessage::parse(r#"{"seq":3}"#), None);
        Ok(())
    }
}
