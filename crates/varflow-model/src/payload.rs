use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};
use crate::identifier::Identifier;
use crate::resolved::ResolvedVariable;

/// `{ data, lookup }` payload sent to the backend.
///
/// Every identifier appears at most once in `lookup`; `data` may reference the same
/// identifier any number of times. The lookup is ordered by identifier so the
/// serialized form is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPayload {
    pub data: Vec<ResolvedVariable>,
    pub lookup: BTreeMap<Identifier, Value>,
}

impl NormalizedPayload {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(ModelError::InvalidPayload)
    }

    /// Value stored for `identifier`, if any.
    pub fn get(&self, identifier: &Identifier) -> Option<&Value> {
        self.lookup.get(identifier)
    }

    /// Follow a `__ref` entry to its lookup value. Inline derived entries return `None`.
    pub fn dereference(&self, resolved: &ResolvedVariable) -> Option<&Value> {
        match resolved {
            ResolvedVariable::Ref(reference) => self.lookup.get(&reference.reference),
            ResolvedVariable::Derived(_) => None,
        }
    }

    /// Insert `value` under `identifier` unless an entry already exists.
    ///
    /// Returns true when the entry was newly created.
    pub fn insert_lookup(&mut self, identifier: Identifier, value: Value) -> bool {
        match self.lookup.entry(identifier) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }
}
