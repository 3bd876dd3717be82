//! Server-push invalidation.
//!
//! A sequence-number bump is an ordinary value change of a server variable. A data
//! update is an external invalidation: every derived node that transitively reads the
//! dataset is forced, whatever its `deps` declaration says.

use serde::{Deserialize, Serialize};
use tracing::debug;
use varflow_model::{ResolvedDerived, ResolvedVariable, Variable};

use crate::store::VariableStore;

/// Message received on the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerPushMessage {
    ServerVariable(ServerVariableUpdate),
    DataUpdated(DataUpdate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerVariableTag {
    ServerVariable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerVariableUpdate {
    #[serde(rename = "__type")]
    pub kind: ServerVariableTag,
    pub uid: String,
    pub sequence_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataUpdate {
    pub data_id: String,
}

/// What applying a push message changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEffect {
    SequenceBumped { uid: String, changed: bool },
    /// Top-level slots whose trees read the updated dataset.
    DataInvalidated { data_id: String, slots: Vec<usize> },
}

pub fn apply_server_push(
    store: &mut VariableStore,
    message: &ServerPushMessage,
    variables: &[Variable],
) -> PushEffect {
    match message {
        ServerPushMessage::ServerVariable(update) => {
            let changed = store.bump_sequence_number(&update.uid, update.sequence_number);
            debug!(
                uid = %update.uid,
                sequence_number = update.sequence_number,
                changed,
                "server variable push"
            );
            PushEffect::SequenceBumped {
                uid: update.uid.clone(),
                changed,
            }
        }
        ServerPushMessage::DataUpdated(update) => {
            let slots: Vec<usize> = variables
                .iter()
                .enumerate()
                .filter(|(_, v)| v.references_data(&update.data_id))
                .map(|(i, _)| i)
                .collect();
            debug!(data_id = %update.data_id, slots = ?slots, "data push");
            PushEffect::DataInvalidated {
                data_id: update.data_id.clone(),
                slots,
            }
        }
    }
}

/// Return `values` with `force_key` set on every derived node reading `data_id`.
///
/// `values` must be the normalized form of `variables` (same shape, slot for slot).
pub fn force_data_dependents(
    values: &[ResolvedVariable],
    variables: &[Variable],
    data_id: &str,
    force_key: &str,
) -> Vec<ResolvedVariable> {
    values
        .iter()
        .zip(variables)
        .map(|(value, variable)| force_node(value, variable, data_id, force_key))
        .chain(values.iter().skip(variables.len()).cloned())
        .collect()
}

fn force_node(
    value: &ResolvedVariable,
    variable: &Variable,
    data_id: &str,
    force_key: &str,
) -> ResolvedVariable {
    let ResolvedVariable::Derived(derived) = value else {
        return value.clone();
    };
    let forced = variable.references_data(data_id);
    ResolvedVariable::Derived(ResolvedDerived {
        values: force_data_dependents(&derived.values, variable.derived_inputs(), data_id, force_key),
        force_key: if forced {
            Some(force_key.to_string())
        } else {
            derived.force_key.clone()
        },
        ..derived.clone()
    })
}
