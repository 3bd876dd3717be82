//! Stream variable state and event application.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::event::StreamEvent;
use crate::key::extract_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Connected,
    Reconnecting,
    Error,
}

/// Local state of one stream variable. Absent (`None`) until the first event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamState {
    pub data: Option<Value>,
    pub status: StreamStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Apply one event to the current state.
///
/// Events that cannot be applied are logged and return the input `Arc` itself, so
/// callers detect a no-op with [`Arc::ptr_eq`].
pub fn apply_stream_event(
    state: Option<Arc<StreamState>>,
    event: &StreamEvent,
    key_accessor: Option<&str>,
) -> Option<Arc<StreamState>> {
    match event {
        StreamEvent::JsonSnapshot(data) => Some(Arc::new(StreamState {
            data: Some(data.clone()),
            status: StreamStatus::Connected,
            error: None,
        })),
        StreamEvent::Add(payload) => {
            let Some(accessor) = key_accessor else {
                warn!("add event received without a key accessor, ignoring");
                return state;
            };
            let mut rows = keyed_rows(state.as_deref().and_then(|s| s.data.as_ref()), accessor);
            let items = match payload {
                Value::Array(items) => items.as_slice(),
                single => std::slice::from_ref(single),
            };
            for item in items {
                match extract_key(item, accessor) {
                    Some(key) => {
                        rows.insert(key, item.clone());
                    }
                    None => warn!(accessor, "could not extract key from stream item, skipping"),
                }
            }
            Some(Arc::new(StreamState {
                data: Some(Value::Object(rows)),
                status: StreamStatus::Connected,
                error: None,
            }))
        }
        StreamEvent::JsonPatch(operations) => {
            let Some(current) = state
                .as_deref()
                .and_then(|s| s.data.as_ref())
                .filter(|data| !data.is_null())
            else {
                warn!("json_patch event received before any data, ignoring");
                return state;
            };
            match apply_patch(current, operations) {
                Ok(patched) => Some(Arc::new(StreamState {
                    data: Some(patched),
                    status: StreamStatus::Connected,
                    error: None,
                })),
                Err(message) => {
                    error!(error = %message, "failed to apply stream patch");
                    Some(Arc::new(StreamState {
                        data: Some(current.clone()),
                        status: StreamStatus::Error,
                        error: Some(format!("Patch failed: {message}")),
                    }))
                }
            }
        }
        StreamEvent::Reconnect => Some(Arc::new(StreamState {
            data: state.as_deref().and_then(|s| s.data.clone()),
            status: StreamStatus::Reconnecting,
            error: state.as_deref().and_then(|s| s.error.clone()),
        })),
        StreamEvent::Error(payload) => Some(Arc::new(StreamState {
            data: state.as_deref().and_then(|s| s.data.clone()),
            status: StreamStatus::Error,
            error: Some(payload.as_str().unwrap_or("Unknown error").to_string()),
        })),
        StreamEvent::Unknown { kind } => {
            warn!(kind = %kind, "unknown stream event type, ignoring");
            state
        }
    }
}

/// Existing data as a keyed mapping. Array data (e.g. from a snapshot) is keyed by
/// the accessor; items without a key are logged and skipped.
fn keyed_rows(data: Option<&Value>, accessor: &str) -> Map<String, Value> {
    match data {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::Array(items)) => {
            let mut rows = Map::new();
            for item in items {
                match extract_key(item, accessor) {
                    Some(key) => {
                        rows.insert(key, item.clone());
                    }
                    None => warn!(
                        accessor,
                        "could not extract key from existing stream row, skipping"
                    ),
                }
            }
            rows
        }
        _ => Map::new(),
    }
}

fn apply_patch(current: &Value, operations: &Value) -> Result<Value, String> {
    let patch: json_patch::Patch =
        serde_json::from_value(operations.clone()).map_err(|err| err.to_string())?;
    let mut patched = current.clone();
    json_patch::patch(&mut patched, &patch).map_err(|err| err.to_string())?;
    Ok(with_key_order_of(current, &patched))
}

/// Rebuild `after` so every object keeps the key order it had in `before`.
///
/// Removing a key from an insertion-ordered map swaps the last key into its slot.
/// Surviving keys keep their old position and added keys follow in patch order.
fn with_key_order_of(before: &Value, after: &Value) -> Value {
    match (before, after) {
        (Value::Object(old), Value::Object(new)) => {
            let mut ordered = Map::with_capacity(new.len());
            for (key, old_value) in old {
                if let Some(new_value) = new.get(key) {
                    ordered.insert(key.clone(), with_key_order_of(old_value, new_value));
                }
            }
            for (key, new_value) in new {
                if !ordered.contains_key(key) {
                    ordered.insert(key.clone(), new_value.clone());
                }
            }
            Value::Object(ordered)
        }
        (Value::Array(old), Value::Array(new)) if old.len() == new.len() => Value::Array(
            old.iter()
                .zip(new)
                .map(|(old_value, new_value)| with_key_order_of(old_value, new_value))
                .collect(),
        ),
        _ => after.clone(),
    }
}

/// Consumer-facing value of a stream variable.
///
/// With a key accessor, keyed mappings are returned as their values in insertion
/// order; array data is returned as-is.
pub fn get_stream_value(state: Option<&StreamState>, key_accessor: Option<&str>) -> Option<Value> {
    let data = state?.data.as_ref()?;
    match (key_accessor, data) {
        (Some(_), Value::Object(rows)) => Some(Value::Array(rows.values().cloned().collect())),
        _ => Some(data.clone()),
    }
}
