//! Message classifier for NDJSON stream lines
//!
//! Each line is a JSON object whose `type` field selects the message kind:
//!
//! | `type` | Payload |
//! |--------|---------|
//! | `progress` | `message`, else `step`, else `status` text |
//! | `result` | `data`, else `result`, else the line itself |
//! | `error` | `error` (string or `{message}`), else `message` |
//!
//! Parse failures are returned to the caller, which logs and skips them.
//! An `error` line is never dropped: even when the line is not valid JSON,
//! a textual `"type":"error"` declaration surfaces it as a terminal error.

use serde_json::{Map, Value};
use thiserror::Error;

/// Fallback text when an error line carries no message
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown analysis error";

/// One classified stream line
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// Human-readable progress text
    Progress(String),
    /// Raw result object, to be normalized
    Result(Value),
    /// Terminal failure sent by the service
    Error {
        message: String,
        /// Entire line object, which may carry partial data
        details: Value,
    },
}

impl StreamMessage {
    /// Result and error messages end the stream
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}

/// Why a line was skipped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("line is not a JSON object")]
    NotAnObject,

    #[error("line has no type field")]
    MissingType,

    #[error("unknown message type '{0}'")]
    UnknownType(String),

    #[error("progress message has no text")]
    EmptyProgress,
}

/// Classify one complete line
pub fn classify(line: &str) -> Result<StreamMessage, ParseFailure> {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            if declares_error_type(line) {
                return Ok(StreamMessage::Error {
                    message: line.trim().to_string(),
                    details: Value::Null,
                });
            }
            return Err(ParseFailure::InvalidJson(e.to_string()));
        }
    };

    let Value::Object(object) = value else {
        return Err(ParseFailure::NotAnObject);
    };

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ParseFailure::MissingType)?
        .to_ascii_lowercase();

    match kind.as_str() {
        "progress" => progress_text(&object)
            .map(StreamMessage::Progress)
            .ok_or(ParseFailure::EmptyProgress),
        "result" => Ok(StreamMessage::Result(result_payload(object))),
        "error" => Ok(StreamMessage::Error {
            message: error_message(&object),
            details: Value::Object(object),
        }),
        other => Err(ParseFailure::UnknownType(other.to_string())),
    }
}

fn progress_text(object: &Map<String, Value>) -> Option<String> {
    ["message", "step", "status"]
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

fn result_payload(mut object: Map<String, Value>) -> Value {
    for key in ["data", "result"] {
        if let Some(payload) = object.remove(key) {
            if !payload.is_null() {
                return payload;
            }
        }
    }
    object.remove("type");
    Value::Object(object)
}

fn error_message(object: &Map<String, Value>) -> String {
    let from_error = match object.get("error") {
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Object(inner)) => inner
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };

    from_error
        .or_else(|| object.get("message").and_then(Value::as_str).map(str::to_string))
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string())
}

fn declares_error_type(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.contains("\"type\":\"error\"")
}
