//! Resolution engine for varflow variable graphs.
//!
//! - [`store`] - session-scoped values and client-side leaf resolution
//! - [`normalize`] - variable trees to deduplicated `{ data, lookup }` payloads
//! - [`deps`] - the leaf values a restricted `deps` declaration observes
//! - [`triggers`] - trigger enumeration and force-key embedding
//! - [`invalidation`] - server-push messages (sequence bumps, data updates)
//! - [`request`] - backend request/response contract
//! - [`resolver`] - coalescing, memoising resolver over a [`Transport`]

pub mod deps;
pub mod error;
pub mod invalidation;
pub mod normalize;
pub mod request;
pub mod resolver;
pub mod store;
pub mod triggers;

pub use deps::{DepValue, DerivedDeps, dep_values, deps_changed, flatten, get_deps};
pub use error::{CoreError, Result, TransportError};
pub use invalidation::{
    DataUpdate, PushEffect, ServerPushMessage, ServerVariableTag, ServerVariableUpdate,
    apply_server_push, force_data_dependents,
};
pub use normalize::{normalize, normalize_all, normalize_for_preload};
pub use request::{
    DerivedVariableRequest, DerivedVariableResponse, TriggerSignal, prepare_request,
};
pub use resolver::{Resolver, Transport, request_key};
pub use store::{SessionSnapshot, ValueSource, VariableStore, evaluate_switch, leaf_value};
pub use triggers::{
    TriggerEntry, TriggerMap, build_trigger_map, count_triggers_for_variable,
    embed_force_key_in_values, embed_force_key_in_values_with_map, new_force_key,
};
