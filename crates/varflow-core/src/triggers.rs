//! Trigger enumeration and force-key embedding.
//!
//! A trigger is one recomputable unit inside a variable tree: every derived or
//! derived-data node counts for itself, and every data input counts once. Units are
//! numbered in pre-order across the top-level variables, and each number maps back
//! to the top-level slot that owns it, because only top-level resolved values carry
//! a force key.

use serde::Serialize;
use tracing::trace;
use varflow_model::{ResolvedVariable, Variable};

/// One recomputable unit of a [`TriggerMap`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerEntry {
    /// Position of this unit within its owning top-level variable's numbering.
    pub index: usize,
    /// Top-level slot this unit rolls up to.
    pub variable_index: usize,
    pub variable: Variable,
}

/// Pre-order enumeration of every trigger reachable from a list of variables.
///
/// The trigger index of an entry is its position in the map.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TriggerMap {
    entries: Vec<TriggerEntry>,
}

impl TriggerMap {
    pub fn get(&self, trigger_index: usize) -> Option<&TriggerEntry> {
        self.entries.get(trigger_index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries paired with their trigger index, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &TriggerEntry)> {
        self.entries.iter().enumerate()
    }
}

/// Number of triggers `variable` contributes.
///
/// Derived kinds count one for themselves plus their inputs' contributions, data
/// variables count one, and every other kind counts zero.
pub fn count_triggers_for_variable(variable: &Variable) -> usize {
    match variable {
        Variable::Derived(_) | Variable::DerivedData(_) => {
            1 + variable
                .derived_inputs()
                .iter()
                .map(count_triggers_for_variable)
                .sum::<usize>()
        }
        Variable::Data(_) => 1,
        Variable::Single(_)
        | Variable::Server(_)
        | Variable::Url(_)
        | Variable::PathParam(_)
        | Variable::Switch(_)
        | Variable::Stream(_) => 0,
    }
}

pub fn build_trigger_map(variables: &[Variable]) -> TriggerMap {
    let mut map = TriggerMap::default();
    for (variable_index, variable) in variables.iter().enumerate() {
        let mut local = 0;
        collect(variable, variable_index, &mut local, &mut map.entries);
    }
    map
}

fn collect(variable: &Variable, variable_index: usize, local: &mut usize, out: &mut Vec<TriggerEntry>) {
    let counts = matches!(
        variable,
        Variable::Derived(_) | Variable::DerivedData(_) | Variable::Data(_)
    );
    if counts {
        out.push(TriggerEntry {
            index: *local,
            variable_index,
            variable: variable.clone(),
        });
        *local += 1;
    }
    for input in variable.derived_inputs() {
        collect(input, variable_index, local, out);
    }
}

/// Return `values` with `force_key` stamped on the slot owning `trigger_index`.
///
/// See [`embed_force_key_in_values_with_map`].
pub fn embed_force_key_in_values(
    values: &[ResolvedVariable],
    variables: &[Variable],
    force_key: Option<&str>,
    trigger_index: usize,
    self_trigger_offset: usize,
) -> Vec<ResolvedVariable> {
    let map = build_trigger_map(variables);
    embed_force_key_in_values_with_map(values, &map, force_key, trigger_index, self_trigger_offset)
}

/// Return `values` with `force_key` stamped on the slot owning `trigger_index`.
///
/// The first `self_trigger_offset` indices belong to an earlier sibling and are
/// skipped; later indices are shifted down by the offset before lookup. A missing
/// force key, an unknown index or a non-derived target slot leaves the values
/// unchanged.
pub fn embed_force_key_in_values_with_map(
    values: &[ResolvedVariable],
    map: &TriggerMap,
    force_key: Option<&str>,
    trigger_index: usize,
    self_trigger_offset: usize,
) -> Vec<ResolvedVariable> {
    let mut out = values.to_vec();
    let Some(force_key) = force_key else {
        return out;
    };
    let Some(local_index) = trigger_index.checked_sub(self_trigger_offset) else {
        trace!(trigger_index, self_trigger_offset, "trigger owned by sibling");
        return out;
    };
    let Some(entry) = map.get(local_index) else {
        trace!(trigger_index, triggers = map.len(), "trigger index out of range");
        return out;
    };

    if let Some(slot) = out.get_mut(entry.variable_index)
        && slot.is_derived()
    {
        *slot = slot.with_force_key(force_key);
        trace!(
            trigger_index,
            variable_index = entry.variable_index,
            uid = entry.variable.uid(),
            "force key embedded"
        );
    }
    out
}

/// Fresh opaque force-key token.
pub fn new_force_key() -> String {
    uuid::Uuid::new_v4().to_string()
}
