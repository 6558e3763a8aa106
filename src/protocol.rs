//! JSON wire types exchanged with the live endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audio::AudioFormat;
use crate::audio::codec::EncodedFrame;

/// Audio formats announced in the setup message.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AudioParams {
    pub input: String,
    pub output: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Setup {
    pub endpoint: String,
    pub instruction: String,
    pub audio: AudioParams,
}

/// First client message; the endpoint answers with `{"setupComplete":{}}`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SetupMessage {
    pub setup: Setup,
}

impl SetupMessage {
    pub fn new(
        endpoint: impl Into<String>,
        instruction: impl Into<String>,
        input: AudioFormat,
        output: AudioFormat,
    ) -> Self {
        Self {
            setup: Setup {
                endpoint: endpoint.into(),
                instruction: instruction.into(),
                audio: AudioParams {
                    input: input.to_string(),
                    output: output.to_string(),
                },
            },
        }
    }
}

/// `{ "format": "pcm16@16000", "data": "<base64>" }`, one per captured block.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UplinkFrame {
    pub format: String,
    pub data: String,
}

impl From<EncodedFrame> for UplinkFrame {
    fn from(frame: EncodedFrame) -> Self {
        Self {
            format: frame.format.to_string(),
            data: frame.data,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AudioPayload {
    pub format: String,
    pub data: String,
}

/// One recognised downlink part.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Audio(AudioPayload),
    Text(String),
}

#[derive(Deserialize)]
struct RawPart {
    audio: Option<AudioPayload>,
    text: Option<String>,
}

impl Part {
    /// `None` for shapes this client does not understand.
    pub fn from_value(value: Value) -> Option<Self> {
        let raw: RawPart = serde_json::from_value(value).ok()?;
        match (raw.audio, raw.text) {
            (Some(audio), _) => Some(Part::Audio(audio)),
            (None, Some(text)) => Some(Part::Text(text)),
            (None, None) => None,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct RawServerMessage {
    setup_complete: Option<Value>,
    #[serde(default)]
    parts: Vec<Value>,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerContent {
    pub parts: Vec<Part>,
    pub turn_complete: bool,
    /// Parts dropped because their shape was not recognised
    pub ignored_parts: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    SetupComplete,
    Content(ServerContent),
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let raw: RawServerMessage = serde_json::from_str(text)?;
        if raw.setup_complete.is_some() {
            return Ok(ServerMessage::SetupComplete);
        }

        let total = raw.parts.len();
        let parts: Vec<Part> = raw.parts.into_iter().filter_map(Part::from_value).collect();
        Ok(ServerMessage::Content(ServerContent {
            ignored_parts: total - parts.len(),
            parts,
            turn_complete: raw.turn_complete,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_message_shape() {
        let msg = SetupMessage::new(
            "agent-1",
            "You are Ada.",
            AudioFormat::pcm16(16000),
            AudioFormat::pcm16(24000),
        );
        let json: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["setup"]["endpoint"], "agent-1");
        assert_eq!(json["setup"]["instruction"], "You are Ada.");
        assert_eq!(json["setup"]["audio"]["input"], "pcm16@16000");
        assert_eq!(json["setup"]["audio"]["output"], "pcm16@24000");
    }

    #[test]
    fn test_uplink_frame_shape() {
        let frame = UplinkFrame {
            format: "pcm16@16000".into(),
            data: "AAA=".into(),
        };
        assert_eq!(
            serde_json::to_string(&frame).unwrap(),
            r#"{"format":"pcm16@16000","data":"AAA="}"#
        );
    }

    #[test]
    fn test_parse_setup_complete() {
        assert_eq!(
            ServerMessage::parse(r#"{"setupComplete":{}}"#).unwrap(),
            ServerMessage::SetupComplete
        );
    }

    #[test]
    fn test_parse_mixed_parts() {
        let text = r#"{
            "parts": [
                {"audio": {"format": "pcm@24000", "data": "AAA="}},
                {"text": "Hello"},
                {"video": {"data": "??"}},
                {"audio": {"format": 5}}
            ],
            "turnComplete": false
        }"#;
        let ServerMessage::Content(content) = ServerMessage::parse(text).unwrap() else {
            panic!("expected content");
        };
        assert_eq!(content.parts.len(), 2);
        assert_eq!(content.ignored_parts, 2);
        assert!(!content.turn_complete);
        assert_eq!(content.parts[1], Part::Text("Hello".into()));
    }

    #[test]
    fn test_parse_turn_complete_without_parts() {
        let ServerMessage::Content(content) = ServerMessage::parse(r#"{"turnComplete":true}"#).unwrap()
        else {
            panic!("expected content");
        };
        assert!(content.parts.is_empty());
        assert!(content.turn_complete);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(ServerMessage::parse("not json").is_err());
    }
}
