//! Data model for the varflow reactive variable engine.
//!
//! This crate defines the declarative variable graph and its wire form:
//!
//! - [`Variable`] - closed sum type over every variable kind the engine understands
//! - [`Identifier`] - deduplication key used in the normalized lookup table
//! - [`ResolvedVariable`] - wire form of a variable (`{ "__ref": .. }` or an inline derived node)
//! - [`NormalizedPayload`] - `{ data, lookup }` payload sent to the backend
//! - [`hash`] - canonical JSON and SHA-256 helpers (filter hashing, request keys)
//!
//! The types are plain data. Resolution, trigger handling and stream state live in
//! `varflow-core` and `varflow-stream`.

pub mod error;
pub mod hash;
pub mod identifier;
pub mod payload;
pub mod resolved;
pub mod variable;

pub use error::{ModelError, Result};
pub use hash::{ArrayOrder, canonical_string, filter_hash, sha256_hex, stable_hash};
pub use identifier::Identifier;
pub use payload::NormalizedPayload;
pub use resolved::{DerivedKind, ResolvedDerived, ResolvedRef, ResolvedVariable};
pub use variable::{
    DataVariable, DerivedDataVariable, DerivedVariable, PathParamVariable, ServerVariable,
    SingleVariable, StreamVariable, SwitchOperand, SwitchVariable, UrlVariable, Variable,
    VariableKind,
};
