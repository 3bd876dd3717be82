//! Dependency flattening for derived variables with restricted `deps`.

use serde_json::Value;
use varflow_model::{NormalizedPayload, ResolvedVariable};

/// One input slot as seen by the dependency flattener.
#[derive(Debug, Clone, PartialEq)]
pub enum DepValue {
    Leaf(Value),
    Derived(DerivedDeps),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedDeps {
    pub deps: Option<Vec<usize>>,
    pub values: Vec<DepValue>,
}

impl DepValue {
    pub fn leaf(value: impl Into<Value>) -> Self {
        Self::Leaf(value.into())
    }

    pub fn derived(deps: Option<Vec<usize>>, values: Vec<DepValue>) -> Self {
        Self::Derived(DerivedDeps { deps, values })
    }
}

/// Observed values per input slot.
///
/// Leaves pass through. A derived slot becomes the array of leaf values its `deps`
/// declaration actually observes; `deps: []` yields an empty array.
pub fn get_deps(values: &[DepValue]) -> Vec<Value> {
    values
        .iter()
        .map(|entry| match entry {
            DepValue::Leaf(value) => value.clone(),
            DepValue::Derived(derived) => Value::Array(flatten(derived)),
        })
        .collect()
}

/// Leaf values selected by `entry.deps`, recursing into derived inputs.
///
/// Out-of-range indices are ignored and repeated indices are kept.
pub fn flatten(entry: &DerivedDeps) -> Vec<Value> {
    let selected: Vec<&DepValue> = match &entry.deps {
        None => entry.values.iter().collect(),
        Some(indices) => indices.iter().filter_map(|&i| entry.values.get(i)).collect(),
    };

    let mut out = Vec::new();
    for slot in selected {
        match slot {
            DepValue::Derived(nested) => out.extend(flatten(nested)),
            DepValue::Leaf(value) => out.push(value.clone()),
        }
    }
    out
}

/// Convert a normalized payload's `data` into flattener input, substituting
/// references with their lookup values.
pub fn dep_values(payload: &NormalizedPayload) -> Vec<DepValue> {
    payload
        .data
        .iter()
        .map(|entry| to_dep_value(entry, payload))
        .collect()
}

fn to_dep_value(entry: &ResolvedVariable, payload: &NormalizedPayload) -> DepValue {
    match entry {
        ResolvedVariable::Ref(_) => {
            DepValue::Leaf(payload.dereference(entry).cloned().unwrap_or(Value::Null))
        }
        ResolvedVariable::Derived(derived) => DepValue::derived(
            derived.deps.clone(),
            derived
                .values
                .iter()
                .map(|value| to_dep_value(value, payload))
                .collect(),
        ),
    }
}

/// Whether an edit moved any observed dependency.
pub fn deps_changed(previous: &[Value], current: &[Value]) -> bool {
    previous != current
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn innermost() -> DepValue {
        DepValue::derived(
            Some(vec![0, 2]),
            vec![DepValue::leaf(5), DepValue::leaf(99), DepValue::leaf(6)],
        )
    }

    fn middle() -> DepValue {
        DepValue::derived(None, vec![innermost(), DepValue::leaf(4)])
    }

    #[test]
    fn test_nested_chain_flattens() {
        let DepValue::Derived(middle) = middle() else {
            unreachable!()
        };
        assert_eq!(flatten(&middle), vec![json!(5), json!(6), json!(4)]);

        let outer = DerivedDeps {
            deps: None,
            values: vec![DepValue::Derived(middle), DepValue::leaf(2)],
        };
        assert_eq!(flatten(&outer), vec![json!(5), json!(6), json!(4), json!(2)]);
    }

    #[test]
    fn test_get_deps_mixed_slots() {
        let values = vec![
            DepValue::leaf(1),
            middle(),
            DepValue::derived(
                Some(vec![]),
                vec![
                    DepValue::leaf(0),
                    DepValue::leaf(1),
                    DepValue::leaf(2),
                    DepValue::leaf(3),
                ],
            ),
            DepValue::leaf(3),
        ];
        assert_eq!(get_deps(&values), vec![json!(1), json!([5, 6, 4]), json!([]), json!(3)]);
    }

    #[test]
    fn test_out_of_range_indices_are_ignored() {
        let entry = DerivedDeps {
            deps: Some(vec![0, 7]),
            values: vec![DepValue::leaf("a")],
        };
        assert_eq!(flatten(&entry), vec![json!("a")]);
    }

    #[test]
    fn test_duplicate_indices_are_preserved() {
        let entry = DerivedDeps {
            deps: Some(vec![1, 1, 0]),
            values: vec![DepValue::leaf("a"), DepValue::leaf("b")],
        };
        assert_eq!(flatten(&entry), vec![json!("b"), json!("b"), json!("a")]);
    }

    #[test]
    fn test_deps_changed_only_for_observed_slots() {
        let before = get_deps(&[DepValue::derived(
            Some(vec![0]),
            vec![DepValue::leaf(1), DepValue::leaf("ignored")],
        )]);
        let after_unobserved = get_deps(&[DepValue::derived(
            Some(vec![0]),
            vec![DepValue::leaf(1), DepValue::leaf("edited")],
        )]);
        let after_observed = get_deps(&[DepValue::derived(
            Some(vec![0]),
            vec![DepValue::leaf(2), DepValue::leaf("ignored")],
        )]);

        assert!(!deps_changed(&before, &after_unobserved));
        assert!(deps_changed(&before, &after_observed));
    }
}
