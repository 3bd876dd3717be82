use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hash::filter_hash;
use crate::variable::{Variable, VariableKind};

/// Deduplication key of the normalized lookup table.
///
/// Rendered as `<Kind>:<uid>[:<nested.path>][:<filterHash>]`. Two references to the same
/// `(kind, uid, nested path, filter hash)` always produce the same identifier. Path
/// segments escape `~` as `~0` and `.` as `~1`, so distinct paths never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(kind: VariableKind, uid: &str, nested: &[String], filters: Option<&Value>) -> Self {
        let mut key = format!("{}:{}", kind.as_str(), uid);
        if !nested.is_empty() {
            key.push(':');
            let segments: Vec<String> = nested.iter().map(|s| escape_segment(s)).collect();
            key.push_str(&segments.join("."));
        }
        if let Some(filters) = filters.filter(|f| !f.is_null()) {
            key.push(':');
            key.push_str(&filter_hash(filters));
        }
        Self(key)
    }

    /// Identifier of `variable` as it would appear in a lookup table.
    pub fn for_variable(variable: &Variable) -> Self {
        Self::new(
            variable.kind(),
            variable.uid(),
            variable.nested(),
            variable.filters(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('.', "~1")
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}
