//! Backend request/response contract for derived variables.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use varflow_model::{NormalizedPayload, Variable};

use crate::error::{CoreError, Result};
use crate::normalize::normalize_all;
use crate::store::ValueSource;
use crate::triggers::embed_force_key_in_values;

/// Body sent to the backend to resolve one derived variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedVariableRequest {
    pub values: NormalizedPayload,
    pub ws_channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Value>,
}

impl DerivedVariableRequest {
    /// Whether any part of this request bypasses the backend cache.
    pub fn is_forced(&self) -> bool {
        self.force_key.is_some()
            || self.force == Some(true)
            || self.values.data.iter().any(|v| v.force_key().is_some())
    }
}

/// Backend answer: either a computed value or a task to await.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DerivedVariableResponse {
    Value { cache_key: String, value: Value },
    Task { task_id: String },
}

impl DerivedVariableResponse {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value { value, .. } => Some(value),
            Self::Task { .. } => None,
        }
    }
}

/// Externally signalled trigger for one resolution.
///
/// Index 0 is the variable's own trigger; indices from 1 address the triggers of its
/// inputs in [`build_trigger_map`](crate::triggers::build_trigger_map) order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSignal {
    pub force_key: String,
    pub index: usize,
}

/// Build the request for `variable` in one synchronous pass: normalize its inputs and
/// apply any trigger before anything is sent.
pub fn prepare_request<S: ValueSource + ?Sized>(
    variable: &Variable,
    source: &S,
    ws_channel: &str,
    trigger: Option<&TriggerSignal>,
) -> Result<DerivedVariableRequest> {
    if !variable.is_derived() {
        return Err(CoreError::NotDerived {
            uid: variable.uid().to_string(),
        });
    }
    let inputs = variable.derived_inputs();
    let mut values = normalize_all(inputs, source);
    let mut force_key = None;

    if let Some(trigger) = trigger {
        if trigger.index == 0 {
            force_key = Some(trigger.force_key.clone());
        } else {
            values.data =
                embed_force_key_in_values(&values.data, inputs, Some(&trigger.force_key), trigger.index, 1);
        }
        debug!(uid = variable.uid(), trigger = trigger.index, "trigger applied");
    }

    Ok(DerivedVariableRequest {
        values,
        ws_channel: ws_channel.to_string(),
        force_key,
        force: None,
        filters: variable.filters().cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VariableStore;
    use serde_json::json;

    fn total() -> Variable {
        Variable::derived(
            "total",
            vec![
                Variable::single("a", json!(1)),
                Variable::derived("inner", vec![Variable::data("sales", None)], None),
            ],
            Some(vec![0]),
        )
    }

    #[test]
    fn test_plain_request_has_no_force() {
        let request = prepare_request(&total(), &VariableStore::new("s"), "ch", None).unwrap();
        assert_eq!(request.ws_channel, "ch");
        assert!(!request.is_forced());
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("force_key").is_none());
        assert!(json.get("filters").is_none());
    }

    #[test]
    fn test_self_trigger_sets_request_force_key() {
        let trigger = TriggerSignal {
            force_key: "k".to_string(),
            index: 0,
        };
        let request =
            prepare_request(&total(), &VariableStore::new("s"), "ch", Some(&trigger)).unwrap();
        assert_eq!(request.force_key.as_deref(), Some("k"));
        assert!(request.values.data.iter().all(|v| v.force_key().is_none()));
    }

    #[test]
    fn test_input_trigger_stamps_input_slot() {
        // Index 1 is "inner", index 2 its data input; both roll up to slot 1.
        for index in [1, 2] {
            let trigger = TriggerSignal {
                force_key: "k".to_string(),
                index,
            };
            let request =
                prepare_request(&total(), &VariableStore::new("s"), "ch", Some(&trigger)).unwrap();
            assert_eq!(request.force_key, None);
            assert_eq!(request.values.data[1].force_key(), Some("k"));
        }
    }

    #[test]
    fn test_non_derived_is_rejected() {
        let err = prepare_request(&Variable::single("a", json!(1)), &VariableStore::new("s"), "ch", None)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotDerived { .. }));
    }

    #[test]
    fn test_derived_data_carries_filters() {
        let variable = Variable::derived_data("summary", vec![], None, Some(json!({"value": 1})));
        let request = prepare_request(&variable, &VariableStore::new("s"), "ch", None).unwrap();
        assert_eq!(request.filters, Some(json!({"value": 1})));
    }

    #[test]
    fn test_parse_responses() {
        let value: DerivedVariableResponse =
            serde_json::from_value(json!({"cache_key": "c", "value": [1, 2]})).unwrap();
        assert_eq!(value.value(), Some(&json!([1, 2])));
        let task: DerivedVariableResponse = serde_json::from_value(json!({"task_id": "t"})).unwrap();
        assert_eq!(task, DerivedVariableResponse::Task { task_id: "t".to_string() });
    }
}
