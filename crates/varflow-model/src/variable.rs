use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};

/// Discriminator of a [`Variable`], rendered as its wire `__typename`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VariableKind {
    SingleVariable,
    DerivedVariable,
    DataVariable,
    DerivedDataVariable,
    ServerVariable,
    UrlVariable,
    PathParamVariable,
    SwitchVariable,
    StreamVariable,
}

impl VariableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleVariable => "SingleVariable",
            Self::DerivedVariable => "DerivedVariable",
            Self::DataVariable => "DataVariable",
            Self::DerivedDataVariable => "DerivedDataVariable",
            Self::ServerVariable => "ServerVariable",
            Self::UrlVariable => "UrlVariable",
            Self::PathParamVariable => "PathParamVariable",
            Self::SwitchVariable => "SwitchVariable",
            Self::StreamVariable => "StreamVariable",
        }
    }

    /// Returns true for kinds computed server-side from other variables.
    pub fn is_derived(&self) -> bool {
        matches!(self, Self::DerivedVariable | Self::DerivedDataVariable)
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A declarative variable definition.
///
/// The set of kinds is closed; every consumer matches exhaustively so a new kind
/// cannot be silently ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__typename")]
pub enum Variable {
    #[serde(rename = "SingleVariable")]
    Single(SingleVariable),
    #[serde(rename = "DerivedVariable")]
    Derived(DerivedVariable),
    #[serde(rename = "DataVariable")]
    Data(DataVariable),
    #[serde(rename = "DerivedDataVariable")]
    DerivedData(DerivedDataVariable),
    #[serde(rename = "ServerVariable")]
    Server(ServerVariable),
    #[serde(rename = "UrlVariable")]
    Url(UrlVariable),
    #[serde(rename = "PathParamVariable")]
    PathParam(PathParamVariable),
    #[serde(rename = "SwitchVariable")]
    Switch(SwitchVariable),
    #[serde(rename = "StreamVariable")]
    Stream(StreamVariable),
}

/// Plain client-side value with an inline default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleVariable {
    pub uid: String,
    #[serde(default)]
    pub default: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<String>,
    /// Persist the value across reloads under the session scope.
    #[serde(default)]
    pub persist_value: bool,
}

/// Value computed by the backend from `variables`.
///
/// `deps`: `None` recomputes on any input change, `Some(indices)` only on the listed
/// inputs, and `Some([])` never recomputes automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedVariable {
    pub uid: String,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub deps: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval: Option<u64>,
}

/// Server-held tabular dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataVariable {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Value>,
}

/// Derived variable whose output is a server-held dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedDataVariable {
    pub uid: String,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub deps: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval: Option<u64>,
}

/// Server-scoped value versioned by an externally maintained sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerVariable {
    pub uid: String,
    #[serde(default)]
    pub sequence_number: u64,
}

/// Value bound to a URL query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlVariable {
    pub uid: String,
    pub query: String,
    #[serde(default)]
    pub default: Value,
}

/// Value bound to a route path parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathParamVariable {
    pub uid: String,
    pub param_name: String,
}

/// Operand of a switch: either an inline literal or a variable read at resolution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SwitchOperand {
    Variable(Box<Variable>),
    Literal(Value),
}

impl Default for SwitchOperand {
    fn default() -> Self {
        Self::Literal(Value::Null)
    }
}

/// Read-only value mapped client-side through `value_map`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchVariable {
    pub uid: String,
    pub value: SwitchOperand,
    pub value_map: SwitchOperand,
    #[serde(default)]
    pub default: SwitchOperand,
}

/// Live server-push state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamVariable {
    pub uid: String,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_accessor: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<String>,
}

impl Variable {
    /// Parse a variable definition from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(ModelError::InvalidVariable)
    }

    pub fn single(uid: impl Into<String>, default: Value) -> Self {
        Self::Single(SingleVariable {
            uid: uid.into(),
            default,
            nested: Vec::new(),
            persist_value: false,
        })
    }

    pub fn derived(uid: impl Into<String>, variables: Vec<Variable>, deps: Option<Vec<usize>>) -> Self {
        Self::Derived(DerivedVariable {
            uid: uid.into(),
            variables,
            deps,
            nested: Vec::new(),
            polling_interval: None,
        })
    }

    pub fn data(uid: impl Into<String>, filters: Option<Value>) -> Self {
        Self::Data(DataVariable {
            uid: uid.into(),
            filters,
        })
    }

    pub fn derived_data(
        uid: impl Into<String>,
        variables: Vec<Variable>,
        deps: Option<Vec<usize>>,
        filters: Option<Value>,
    ) -> Self {
        Self::DerivedData(DerivedDataVariable {
            uid: uid.into(),
            variables,
            deps,
            filters,
            polling_interval: None,
        })
    }

    pub fn server(uid: impl Into<String>) -> Self {
        Self::Server(ServerVariable {
            uid: uid.into(),
            sequence_number: 0,
        })
    }

    pub fn stream(uid: impl Into<String>, variables: Vec<Variable>, key_accessor: Option<&str>) -> Self {
        Self::Stream(StreamVariable {
            uid: uid.into(),
            variables,
            key_accessor: key_accessor.map(str::to_string),
            nested: Vec::new(),
        })
    }

    /// Return a copy addressing only the given nested path of this variable's value.
    ///
    /// Only single, derived and stream variables carry a nested path; other kinds
    /// are returned unchanged.
    #[must_use]
    pub fn with_nested<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path: Vec<String> = path.into_iter().map(Into::into).collect();
        match &mut self {
            Self::Single(v) => v.nested = path,
            Self::Derived(v) => v.nested = path,
            Self::Stream(v) => v.nested = path,
            Self::Data(_)
            | Self::DerivedData(_)
            | Self::Server(_)
            | Self::Url(_)
            | Self::PathParam(_)
            | Self::Switch(_) => {}
        }
        self
    }

    pub fn kind(&self) -> VariableKind {
        match self {
            Self::Single(_) => VariableKind::SingleVariable,
            Self::Derived(_) => VariableKind::DerivedVariable,
            Self::Data(_) => VariableKind::DataVariable,
            Self::DerivedData(_) => VariableKind::DerivedDataVariable,
            Self::Server(_) => VariableKind::ServerVariable,
            Self::Url(_) => VariableKind::UrlVariable,
            Self::PathParam(_) => VariableKind::PathParamVariable,
            Self::Switch(_) => VariableKind::SwitchVariable,
            Self::Stream(_) => VariableKind::StreamVariable,
        }
    }

    pub fn uid(&self) -> &str {
        match self {
            Self::Single(v) => &v.uid,
            Self::Derived(v) => &v.uid,
            Self::Data(v) => &v.uid,
            Self::DerivedData(v) => &v.uid,
            Self::Server(v) => &v.uid,
            Self::Url(v) => &v.uid,
            Self::PathParam(v) => &v.uid,
            Self::Switch(v) => &v.uid,
            Self::Stream(v) => &v.uid,
        }
    }

    pub fn nested(&self) -> &[String] {
        match self {
            Self::Single(v) => &v.nested,
            Self::Derived(v) => &v.nested,
            Self::Stream(v) => &v.nested,
            Self::Data(_)
            | Self::DerivedData(_)
            | Self::Server(_)
            | Self::Url(_)
            | Self::PathParam(_)
            | Self::Switch(_) => &[],
        }
    }

    /// Filter expression of data-backed kinds.
    pub fn filters(&self) -> Option<&Value> {
        match self {
            Self::Data(v) => v.filters.as_ref(),
            Self::DerivedData(v) => v.filters.as_ref(),
            _ => None,
        }
    }

    /// Inputs of a derived or derived-data variable; empty for every other kind.
    pub fn derived_inputs(&self) -> &[Variable] {
        match self {
            Self::Derived(v) => &v.variables,
            Self::DerivedData(v) => &v.variables,
            _ => &[],
        }
    }

    pub fn is_derived(&self) -> bool {
        self.kind().is_derived()
    }

    /// Returns true when this variable is, or transitively takes as an input, the
    /// data or derived-data variable `data_uid`.
    pub fn references_data(&self, data_uid: &str) -> bool {
        match self {
            Self::Data(v) => v.uid == data_uid,
            Self::DerivedData(v) => {
                v.uid == data_uid || v.variables.iter().any(|i| i.references_data(data_uid))
            }
            Self::Derived(v) => v.variables.iter().any(|i| i.references_data(data_uid)),
            _ => false,
        }
    }

    /// First stream variable found in this tree (pre-order), if any.
    pub fn find_stream(&self) -> Option<&StreamVariable> {
        match self {
            Self::Stream(v) => Some(v),
            Self::Derived(v) => v.variables.iter().find_map(Variable::find_stream),
            Self::DerivedData(v) => v.variables.iter().find_map(Variable::find_stream),
            Self::Switch(v) => [&v.value, &v.value_map, &v.default]
                .into_iter()
                .find_map(|operand| match operand {
                    SwitchOperand::Variable(inner) => inner.find_stream(),
                    SwitchOperand::Literal(_) => None,
                }),
            Self::Single(_) | Self::Data(_) | Self::Server(_) | Self::Url(_) | Self::PathParam(_) => {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_derived_with_typename() {
        let variable = Variable::from_json(
            r#"{
                "__typename": "DerivedVariable",
                "uid": "total",
                "variables": [
                    {"__typename": "SingleVariable", "uid": "a", "default": 1},
                    {"__typename": "DataVariable", "uid": "sales"}
                ],
                "deps": [0]
            }"#,
        )
        .unwrap();

        assert_eq!(variable.kind(), VariableKind::DerivedVariable);
        assert_eq!(variable.uid(), "total");
        assert_eq!(variable.derived_inputs().len(), 2);
        match &variable {
            Variable::Derived(derived) => assert_eq!(derived.deps, Some(vec![0])),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_missing_deps_differs_from_empty_deps() {
        let absent = Variable::from_json(
            r#"{"__typename": "DerivedVariable", "uid": "d", "variables": []}"#,
        )
        .unwrap();
        let empty = Variable::from_json(
            r#"{"__typename": "DerivedVariable", "uid": "d", "variables": [], "deps": []}"#,
        )
        .unwrap();

        let Variable::Derived(absent) = absent else {
            panic!("expected derived")
        };
        let Variable::Derived(empty) = empty else {
            panic!("expected derived")
        };
        assert_eq!(absent.deps, None);
        assert_eq!(empty.deps, Some(vec![]));
    }

    #[test]
    fn test_unknown_typename_is_rejected() {
        let result = Variable::from_json(r#"{"__typename": "MysteryVariable", "uid": "x"}"#);
        assert!(matches!(result, Err(ModelError::InvalidVariable(_))));
    }

    #[test]
    fn test_switch_operands_parse_as_variable_or_literal() {
        let variable = Variable::from_json(
            r#"{
                "__typename": "SwitchVariable",
                "uid": "label",
                "value": {"__typename": "SingleVariable", "uid": "flag", "default": true},
                "value_map": {"true": "On", "false": "Off"},
                "default": "Unknown"
            }"#,
        )
        .unwrap();

        let Variable::Switch(switch) = variable else {
            panic!("expected switch")
        };
        assert!(matches!(switch.value, SwitchOperand::Variable(_)));
        assert_eq!(
            switch.value_map,
            SwitchOperand::Literal(json!({"true": "On", "false": "Off"}))
        );
        assert_eq!(switch.default, SwitchOperand::Literal(json!("Unknown")));
    }

    #[test]
    fn test_references_data_is_transitive() {
        let tree = Variable::derived(
            "outer",
            vec![
                Variable::single("a", json!(1)),
                Variable::derived("inner", vec![Variable::data("sales", None)], Some(vec![])),
            ],
            Some(vec![0]),
        );

        assert!(tree.references_data("sales"));
        assert!(!tree.references_data("other"));
    }

    #[test]
    fn test_find_stream_inside_derived() {
        let tree = Variable::derived(
            "outer",
            vec![Variable::stream("ticks", vec![], Some("id"))],
            None,
        );
        assert_eq!(tree.find_stream().map(|s| s.uid.as_str()), Some("ticks"));
        assert!(Variable::single("a", json!(0)).find_stream().is_none());
    }

    #[test]
    fn test_kind_round_trip_through_json() {
        let variable = Variable::server("seq");
        let json = serde_json::to_value(&variable).unwrap();
        assert_eq!(json["__typename"], "ServerVariable");
        let parsed: Variable = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, variable);
    }
}
