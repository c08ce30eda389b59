//! Streaming session wire messages
//!
//! Every frame is a JSON text message `{"type": ..., "data": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::generation::{GenerationResult, RawGenerateRequest};
use crate::imaging::base64;

/// Messages accepted from the client
#[derive(Debug, Clone)]
pub enum ClientMessage {
    Generate(RawGenerateRequest),
    Ping,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| AppError::InvalidRequest(format!("Malformed message: {}", e)))?;

        match envelope.kind.as_str() {
            "generate" => {
                let data = match envelope.data {
                    Value::Null => Value::Object(Default::default()),
                    other => other,
                };
                let raw = serde_json::from_value(data)
                    .map_err(|e| AppError::InvalidRequest(format!("Malformed generate data: {}", e)))?;
                Ok(Self::Generate(raw))
            }
            "ping" => Ok(Self::Ping),
            other => Err(AppError::InvalidRequest(format!("Unknown message type: {}", other))),
        }
    }
}

/// Messages sent to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Progress { status: String, percent: u8 },
    Result { image: String, seed: u64, latency: f64 },
    Error { message: String },
    Pong,
}

impl ServerMessage {
    pub fn starting() -> Self {
        Self::Progress {
            status: "starting".to_string(),
            percent: 0,
        }
    }

    pub fn generating() -> Self {
        Self::Progress {
            status: "generating".to_string(),
            percent: 50,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Encode a finished generation; encoding failures become an error message
    pub fn from_result(result: &GenerationResult) -> Self {
        match base64::encode_png(&result.image) {
            Ok(image) => Self::Result {
                image,
                seed: result.seed_used,
                latency: result.latency_seconds,
            },
            Err(e) => Self::error(e.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Result { .. } | Self::Error { .. })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
