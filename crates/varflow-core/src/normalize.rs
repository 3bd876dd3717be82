//! Graph normalization: variable trees to deduplicated `{ data, lookup }` payloads.

use serde_json::{Value, json};
use tracing::{debug, trace};
use varflow_model::{
    DerivedKind, Identifier, NormalizedPayload, ResolvedDerived, ResolvedVariable, Variable,
};

use crate::error::{CoreError, Result};
use crate::store::{ValueSource, leaf_value};

/// Normalize a single variable tree. `data` holds exactly one entry.
pub fn normalize<S: ValueSource + ?Sized>(variable: &Variable, source: &S) -> NormalizedPayload {
    normalize_all(std::slice::from_ref(variable), source)
}

/// Normalize a list of sibling trees into one payload sharing a lookup table.
///
/// Leaves are deduplicated by [`Identifier`]; derived nodes are inlined at every
/// occurrence with a `null` force key.
pub fn normalize_all<S: ValueSource + ?Sized>(
    variables: &[Variable],
    source: &S,
) -> NormalizedPayload {
    let mut payload = NormalizedPayload::default();
    for variable in variables {
        let resolved = resolve(variable, source, &mut payload);
        payload.data.push(resolved);
    }
    debug!(
        roots = payload.data.len(),
        lookup_entries = payload.lookup.len(),
        "normalized variables"
    );
    payload
}

/// Like [`normalize_all`], but refuses trees containing a stream variable.
///
/// Stream values only exist on a live client connection and cannot be resolved
/// ahead of time.
pub fn normalize_for_preload<S: ValueSource + ?Sized>(
    variables: &[Variable],
    source: &S,
) -> Result<NormalizedPayload> {
    if let Some(stream) = variables.iter().find_map(Variable::find_stream) {
        return Err(CoreError::StreamPreloadUnsupported {
            uid: stream.uid.clone(),
        });
    }
    Ok(normalize_all(variables, source))
}

fn resolve<S: ValueSource + ?Sized>(
    variable: &Variable,
    source: &S,
    payload: &mut NormalizedPayload,
) -> ResolvedVariable {
    match variable {
        Variable::Derived(derived) => ResolvedVariable::Derived(ResolvedDerived {
            kind: DerivedKind::Derived,
            uid: derived.uid.clone(),
            values: resolve_inputs(&derived.variables, source, payload),
            deps: derived.deps.clone(),
            force_key: None,
            filters: None,
        }),
        Variable::DerivedData(derived) => ResolvedVariable::Derived(ResolvedDerived {
            kind: DerivedKind::DerivedData,
            uid: derived.uid.clone(),
            values: resolve_inputs(&derived.variables, source, payload),
            deps: derived.deps.clone(),
            force_key: None,
            filters: derived.filters.clone(),
        }),
        Variable::Data(data) => {
            let value = json!({
                "filters": data.filters.clone().unwrap_or(Value::Null),
                "type": "data",
                "uid": data.uid,
            });
            insert_ref(variable, value, payload)
        }
        Variable::Server(server) => {
            let sequence_number = source
                .sequence_number(&server.uid)
                .unwrap_or(server.sequence_number);
            let value = json!({
                "sequence_number": sequence_number,
                "type": "server",
                "uid": server.uid,
            });
            insert_ref(variable, value, payload)
        }
        Variable::Single(_)
        | Variable::Url(_)
        | Variable::PathParam(_)
        | Variable::Switch(_)
        | Variable::Stream(_) => {
            let value = leaf_value(variable, source).unwrap_or(Value::Null);
            insert_ref(variable, value, payload)
        }
    }
}

fn resolve_inputs<S: ValueSource + ?Sized>(
    inputs: &[Variable],
    source: &S,
    payload: &mut NormalizedPayload,
) -> Vec<ResolvedVariable> {
    inputs
        .iter()
        .map(|input| resolve(input, source, payload))
        .collect()
}

fn insert_ref(variable: &Variable, value: Value, payload: &mut NormalizedPayload) -> ResolvedVariable {
    let identifier = Identifier::for_variable(variable);
    if !payload.insert_lookup(identifier.clone(), value) {
        trace!(identifier = %identifier, "reusing lookup entry");
    }
    ResolvedVariable::reference(identifier)
}
