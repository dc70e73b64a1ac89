//! Wire protocol for the streaming WebSocket channel.
//!
//! All messages are JSON objects tagged by a `type` field, matched
//! exhaustively on the server side so adding a message kind is a
//! compile-time-checked change.
//!
//! ## Client → server
//!
//! | `type` | Payload |
//! |--------|---------|
//! | `audio` | `data` (base64 / data-URL string or raw byte array) + `format` |
//! | `change_model` | `model` (variant name) |
//! | `ping` | — |
//!
//! ## Server → client
//!
//! `connection` (once, on connect), `status`, `transcription`, `error`,
//! `model_changed`, `pong`.

use serde::{Deserialize, Serialize};

use crate::inference::manager::Device;

fn default_format() -> String {
    "webm".to_string()
}

/// Messages accepted from the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// One audio fragment. `format` defaults to `webm` when omitted.
    Audio {
        data: AudioData,
        #[serde(default = "default_format")]
        format: String,
    },
    /// Hot-swap the shared transcription backend.
    ChangeModel { model: String },
    /// Liveness probe; answered immediately with `pong`.
    Ping,
}

/// Audio payload forms accepted on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AudioData {
    /// Base64 text, optionally prefixed with a `data:audio/...;base64,` header.
    Text(String),
    /// Raw bytes as a JSON number array.
    Bytes(Vec<u8>),
}

/// Messages emitted to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent exactly once, immediately after the transport is established.
    Connection {
        status: String,
        model: Option<String>,
        device: Device,
    },
    /// Human-readable progress note (`Processing audio...`, `Loading ...`).
    Status { message: String },
    /// One recognized segment. Offsets are seconds relative to the window
    /// the segment came from; windows are independent.
    Transcription {
        text: String,
        start: f64,
        end: f64,
        #[serde(rename = "final")]
        is_final: bool,
    },
    /// Per-operation failure. The session stays open.
    Error { message: String },
    /// The shared backend switched; visible to every session.
    ModelChanged { model: String, device: Device },
    Pong,
}

/// One timed span of recognized text within a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    /// Start offset in seconds, relative to the window.
    pub start: f64,
    /// End offset in seconds, relative to the window.
    pub end: f64,
    #[serde(rename = "final")]
    pub is_final: bool,
}

impl From<Segment> for ServerMessage {
    fn from(segment: Segment) -> Self {
        ServerMessage::Transcription {
            text: segment.text,
            start: segment.start,
            end: segment.end,
            is_final: segment.is_final,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_message_parses_with_default_format() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"audio","data":"AAAA"}"#).expect("parse audio message");
        match msg {
            ClientMessage::Audio { data, format } => {
                assert_eq!(format, "webm");
                assert!(matches!(data, AudioData::Text(ref t) if t == "AAAA"));
            }
            other => panic!("expected audio message, got {other:?}"),
        }
    }

    #[test]
    fn audio_message_accepts_raw_byte_arrays() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"audio","data":[0,0,128,63],"format":"pcm"}"#)
                .expect("parse audio message");
        match msg {
            ClientMessage::Audio { data, format } => {
                assert_eq!(format, "pcm");
                assert!(matches!(data, AudioData::Bytes(ref b) if b == &[0, 0, 128, 63]));
            }
            other => panic!("expected audio message, got {other:?}"),
        }
    }

    #[test]
    fn change_model_and_ping_parse() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"change_model","model":"small"}"#)
            .expect("parse change_model");
        assert!(matches!(msg, ClientMessage::ChangeModel { ref model } if model == "small"));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).expect("parse ping");
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let err = serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe"}"#);
        assert!(err.is_err(), "expected unknown type to fail");
    }

    #[test]
    fn transcription_serializes_with_final_key() {
        let msg = ServerMessage::from(Segment {
            text: "hello world".into(),
            start: 0.0,
            end: 1.4,
            is_final: true,
        });

        let json = serde_json::to_value(&msg).expect("serialize transcription");
        assert_eq!(json["type"], "transcription");
        assert_eq!(json["text"], "hello world");
        assert_eq!(json["final"], true);
        let end = json["end"].as_f64().expect("end should serialize as number");
        assert!((end - 1.4).abs() < 1e-9);
    }

    #[test]
    fn server_messages_use_snake_case_tags() {
        let json = serde_json::to_value(ServerMessage::ModelChanged {
            model: "base".into(),
            device: Device::Cpu,
        })
        .expect("serialize model_changed");
        assert_eq!(json["type"], "model_changed");
        assert_eq!(json["device"], "cpu");

        let json = serde_json::to_value(ServerMessage::Pong).expect("serialize pong");
        assert_eq!(json, serde_json::json!({"type": "pong"}));
    }

    #[test]
    fn connection_message_reports_absent_model_as_null() {
        let json = serde_json::to_value(ServerMessage::Connection {
            status: "connected".into(),
            model: None,
            device: Device::Gpu,
        })
        .expect("serialize connection");
        assert_eq!(json["type"], "connection");
        assert_eq!(json["status"], "connected");
        assert!(json["model"].is_null());
        assert_eq!(json["device"], "gpu");
    }
}
