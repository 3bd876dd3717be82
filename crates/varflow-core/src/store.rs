//! Session-scoped value storage and client-side leaf resolution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use varflow_model::{SwitchOperand, SwitchVariable, Variable};

use crate::error::{CoreError, Result};

/// Read interface the normalizer resolves leaf variables against.
pub trait ValueSource {
    /// Stored value of a single variable, without nested projection.
    fn value(&self, uid: &str) -> Option<Value>;
    fn url_param(&self, name: &str) -> Option<Value>;
    fn path_param(&self, name: &str) -> Option<Value>;
    fn sequence_number(&self, uid: &str) -> Option<u64>;
    /// Current consumer-facing value of a stream variable.
    fn stream_value(&self, uid: &str) -> Option<Value>;
}

/// Current value of a leaf variable as seen from the client.
///
/// Returns `None` for derived and data kinds, whose values only exist on the server.
pub fn leaf_value<S: ValueSource + ?Sized>(variable: &Variable, source: &S) -> Option<Value> {
    match variable {
        Variable::Single(single) => {
            let stored = source
                .value(&single.uid)
                .unwrap_or_else(|| single.default.clone());
            Some(project(&stored, &single.nested))
        }
        Variable::Url(url) => Some(
            source
                .url_param(&url.query)
                .unwrap_or_else(|| url.default.clone()),
        ),
        Variable::PathParam(param) => Some(source.path_param(&param.param_name).unwrap_or(Value::Null)),
        Variable::Server(server) => Some(Value::from(
            source
                .sequence_number(&server.uid)
                .unwrap_or(server.sequence_number),
        )),
        Variable::Switch(switch) => Some(evaluate_switch(switch, source)),
        Variable::Stream(stream) => {
            let value = source.stream_value(&stream.uid).unwrap_or(Value::Null);
            Some(project(&value, &stream.nested))
        }
        Variable::Derived(_) | Variable::Data(_) | Variable::DerivedData(_) => None,
    }
}

/// Map the switch's `value` through `value_map`, falling back to `default`.
pub fn evaluate_switch<S: ValueSource + ?Sized>(switch: &SwitchVariable, source: &S) -> Value {
    let value = operand_value(&switch.value, source);
    let mapping = operand_value(&switch.value_map, source);
    let key = switch_key(&value);

    match mapping.as_object().and_then(|map| map.get(&key)) {
        Some(mapped) => mapped.clone(),
        None => operand_value(&switch.default, source),
    }
}

fn operand_value<S: ValueSource + ?Sized>(operand: &SwitchOperand, source: &S) -> Value {
    match operand {
        SwitchOperand::Literal(value) => value.clone(),
        // Derived operands have no client-side value.
        SwitchOperand::Variable(variable) => leaf_value(variable, source).unwrap_or(Value::Null),
    }
}

fn switch_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Sub-value addressed by `path`; `null` when any segment is missing.
pub fn project(value: &Value, path: &[String]) -> Value {
    let mut current = value;
    for segment in path {
        match current.get(segment.as_str()) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn assign(target: &mut Value, path: &[String], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        *target = value;
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        let slot = map.entry(head.clone()).or_insert(Value::Null);
        assign(slot, rest, value);
    }
}

/// In-memory value store for one session.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    session_scope: String,
    values: BTreeMap<String, Value>,
    url: BTreeMap<String, Value>,
    path_params: BTreeMap<String, String>,
    sequence_numbers: BTreeMap<String, u64>,
    streams: BTreeMap<String, Value>,
}

impl VariableStore {
    pub fn new(session_scope: impl Into<String>) -> Self {
        Self {
            session_scope: session_scope.into(),
            ..Self::default()
        }
    }

    pub fn session_scope(&self) -> &str {
        &self.session_scope
    }

    /// Key a persisted value is stored under, namespaced by session scope.
    pub fn persistence_key(&self, uid: &str) -> String {
        format!("{}:{}", self.session_scope, uid)
    }

    /// Current value of `variable`; `None` for server-computed kinds.
    pub fn read(&self, variable: &Variable) -> Option<Value> {
        leaf_value(variable, self)
    }

    /// Write `value` into `variable`, honouring its nested path.
    ///
    /// Sibling nested paths of the same uid are left untouched.
    pub fn write(&mut self, variable: &Variable, value: Value) -> Result<()> {
        match variable {
            Variable::Single(single) => {
                let slot = self
                    .values
                    .entry(single.uid.clone())
                    .or_insert_with(|| single.default.clone());
                assign(slot, &single.nested, value);
                debug!(uid = %single.uid, nested = ?single.nested, "variable written");
                Ok(())
            }
            Variable::Url(url) => {
                self.url.insert(url.query.clone(), value);
                Ok(())
            }
            Variable::Derived(_)
            | Variable::Data(_)
            | Variable::DerivedData(_)
            | Variable::Server(_)
            | Variable::PathParam(_)
            | Variable::Switch(_)
            | Variable::Stream(_) => Err(CoreError::ReadOnlyVariable {
                kind: variable.kind(),
                uid: variable.uid().to_string(),
            }),
        }
    }

    /// Restore a value previously exported by [`persisted_values`](Self::persisted_values).
    pub fn restore(&mut self, uid: &str, value: Value) {
        self.values.insert(uid.to_string(), value);
    }

    pub fn set_url_param(&mut self, name: impl Into<String>, value: Value) {
        self.url.insert(name.into(), value);
    }

    pub fn set_path_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.path_params.insert(name.into(), value.into());
    }

    pub fn set_stream_value(&mut self, uid: impl Into<String>, value: Value) {
        self.streams.insert(uid.into(), value);
    }

    /// Advance a server variable's sequence number.
    ///
    /// Numbers only move forward; returns true when the stored number changed.
    pub fn bump_sequence_number(&mut self, uid: &str, sequence_number: u64) -> bool {
        let current = self.sequence_numbers.get(uid).copied();
        if current.is_some_and(|n| n >= sequence_number) {
            return false;
        }
        self.sequence_numbers.insert(uid.to_string(), sequence_number);
        true
    }

    /// Values of every `persist_value` single variable in the trees, keyed by
    /// [`persistence_key`](Self::persistence_key).
    pub fn persisted_values(&self, variables: &[Variable]) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        for variable in variables {
            self.collect_persisted(variable, &mut out);
        }
        out
    }

    fn collect_persisted(&self, variable: &Variable, out: &mut BTreeMap<String, Value>) {
        match variable {
            Variable::Single(single) if single.persist_value => {
                let value = self
                    .values
                    .get(&single.uid)
                    .cloned()
                    .unwrap_or_else(|| single.default.clone());
                out.insert(self.persistence_key(&single.uid), value);
            }
            other => {
                for input in other.derived_inputs() {
                    self.collect_persisted(input, out);
                }
            }
        }
    }
}

impl ValueSource for VariableStore {
    fn value(&self, uid: &str) -> Option<Value> {
        self.values.get(uid).cloned()
    }

    fn url_param(&self, name: &str) -> Option<Value> {
        self.url.get(name).cloned()
    }

    fn path_param(&self, name: &str) -> Option<Value> {
        self.path_params.get(name).cloned().map(Value::String)
    }

    fn sequence_number(&self, uid: &str) -> Option<u64> {
        self.sequence_numbers.get(uid).copied()
    }

    fn stream_value(&self, uid: &str) -> Option<Value> {
        self.streams.get(uid).cloned()
    }
}

fn default_session() -> String {
    "default".to_string()
}

/// Serialized session state: variable definitions plus everything a store holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    pub variables: Vec<Variable>,
    pub values: BTreeMap<String, Value>,
    pub url: BTreeMap<String, Value>,
    pub path_params: BTreeMap<String, String>,
    pub sequence_numbers: BTreeMap<String, u64>,
    pub streams: BTreeMap<String, Value>,
}

impl SessionSnapshot {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Build a store from this snapshot. `fallback_scope` applies when the snapshot
    /// names no session.
    pub fn to_store(&self, fallback_scope: Option<&str>) -> VariableStore {
        let scope = self
            .session
            .clone()
            .or_else(|| fallback_scope.map(str::to_string))
            .unwrap_or_else(default_session);
        VariableStore {
            session_scope: scope,
            values: self.values.clone(),
            url: self.url.clone(),
            path_params: self.path_params.clone(),
            sequence_numbers: self.sequence_numbers.clone(),
            streams: self.streams.clone(),
        }
    }
}
