//! Stream event protocol and newline-delimited framing.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, StreamError};

/// One event received on a stream connection.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Replace the whole state.
    JsonSnapshot(Value),
    /// Upsert one item or an array of items into the keyed collection.
    Add(Value),
    /// RFC 6902 operations against the current state.
    JsonPatch(Value),
    Reconnect,
    Error(Value),
    Unknown { kind: String },
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl StreamEvent {
    /// Parse one framed `{ "type": .., "data": .. }` line.
    pub fn parse(line: &str) -> Result<Self> {
        let raw: RawEvent = serde_json::from_str(line).map_err(|source| StreamError::MalformedEvent {
            line: line.to_string(),
            source,
        })?;
        Ok(match raw.kind.as_str() {
            "json_snapshot" => Self::JsonSnapshot(raw.data),
            "add" => Self::Add(raw.data),
            "json_patch" => Self::JsonPatch(raw.data),
            "reconnect" => Self::Reconnect,
            "error" => Self::Error(raw.data),
            _ => Self::Unknown { kind: raw.kind },
        })
    }

    /// Wire name of this event's type.
    pub fn kind(&self) -> &str {
        match self {
            Self::JsonSnapshot(_) => "json_snapshot",
            Self::Add(_) => "add",
            Self::JsonPatch(_) => "json_patch",
            Self::Reconnect => "reconnect",
            Self::Error(_) => "error",
            Self::Unknown { kind } => kind.as_str(),
        }
    }

    /// Payload carried by the event, if any.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::JsonSnapshot(data) | Self::Add(data) | Self::JsonPatch(data) | Self::Error(data) => {
                Some(data)
            }
            Self::Reconnect | Self::Unknown { .. } => None,
        }
    }
}

/// Splits arbitrarily chunked text into complete lines.
///
/// Blank lines are dropped and a trailing `\r` is stripped.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if !line.trim().is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Take any unterminated trailing line.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim_end_matches('\r');
        (!rest.trim().is_empty()).then(|| rest.to_string())
    }
}
