use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifier::Identifier;
use crate::variable::VariableKind;

/// Wire form of one variable inside a normalized payload.
///
/// Leaves become references into the lookup table; derived kinds are always inlined so
/// their force state can differ per call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResolvedVariable {
    Ref(ResolvedRef),
    Derived(ResolvedDerived),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRef {
    #[serde(rename = "__ref")]
    pub reference: Identifier,
}

/// `type` discriminator of an inline derived node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DerivedKind {
    Derived,
    DerivedData,
}

impl DerivedKind {
    pub fn variable_kind(self) -> VariableKind {
        match self {
            Self::Derived => VariableKind::DerivedVariable,
            Self::DerivedData => VariableKind::DerivedDataVariable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedDerived {
    #[serde(rename = "type")]
    pub kind: DerivedKind,
    pub uid: String,
    pub values: Vec<ResolvedVariable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deps: Option<Vec<usize>>,
    /// `null` unless this node is forced for the current resolution.
    #[serde(default)]
    pub force_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Value>,
}

impl ResolvedVariable {
    pub fn reference(identifier: Identifier) -> Self {
        Self::Ref(ResolvedRef {
            reference: identifier,
        })
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, Self::Derived(_))
    }

    pub fn as_derived(&self) -> Option<&ResolvedDerived> {
        match self {
            Self::Derived(derived) => Some(derived),
            Self::Ref(_) => None,
        }
    }

    pub fn force_key(&self) -> Option<&str> {
        self.as_derived().and_then(|d| d.force_key.as_deref())
    }

    /// Copy of this entry with `force_key` set. References are returned unchanged.
    #[must_use]
    pub fn with_force_key(&self, force_key: &str) -> Self {
        match self {
            Self::Derived(derived) => Self::Derived(ResolvedDerived {
                force_key: Some(force_key.to_string()),
                ..derived.clone()
            }),
            Self::Ref(_) => self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn derived_node() -> ResolvedVariable {
        ResolvedVariable::Derived(ResolvedDerived {
            kind: DerivedKind::Derived,
            uid: "total".to_string(),
            values: vec![ResolvedVariable::Ref(ResolvedRef {
                reference: serde_json::from_value(json!("SingleVariable:a")).unwrap(),
            })],
            deps: None,
            force_key: None,
            filters: None,
        })
    }

    #[test]
    fn test_derived_serializes_null_force_key() {
        let json = serde_json::to_value(derived_node()).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "derived",
                "uid": "total",
                "values": [{"__ref": "SingleVariable:a"}],
                "force_key": null
            })
        );
    }

    #[test]
    fn test_untagged_parse_distinguishes_ref_and_derived() {
        let parsed: Vec<ResolvedVariable> = serde_json::from_value(json!([
            {"__ref": "DataVariable:sales"},
            {"type": "derived-data", "uid": "d", "values": [], "deps": [], "force_key": "k"}
        ]))
        .unwrap();

        assert!(!parsed[0].is_derived());
        let derived = parsed[1].as_derived().unwrap();
        assert_eq!(derived.kind, DerivedKind::DerivedData);
        assert_eq!(derived.deps, Some(vec![]));
        assert_eq!(parsed[1].force_key(), Some("k"));
    }

    #[test]
    fn test_with_force_key_leaves_refs_alone() {
        let reference = ResolvedVariable::reference(
            serde_json::from_value(json!("SingleVariable:a")).unwrap(),
        );
        assert_eq!(reference.with_force_key("k"), reference);
        assert_eq!(derived_node().with_force_key("k").force_key(), Some("k"));
    }
}
