//! Coalescing, memoising resolution of derived variables.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;
use tracing::{debug, warn};
use varflow_model::{ArrayOrder, stable_hash};

use crate::error::{CoreError, Result, TransportError};
use crate::request::{DerivedVariableRequest, DerivedVariableResponse};

type SendResult = std::result::Result<DerivedVariableResponse, TransportError>;

struct CachedResponse {
    key: String,
    response: DerivedVariableResponse,
}

/// Backend RPC used to resolve derived variables.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        uid: &str,
        request: &DerivedVariableRequest,
    ) -> impl Future<Output = SendResult> + Send;
}

/// Resolves derived variables through a [`Transport`].
///
/// Concurrent calls for the same uid and request body share one transport call.
/// The latest successful value response to an unforced request is memoised per uid
/// until a request with different inputs replaces it or
/// [`invalidate`](Self::invalidate) is called.
pub struct Resolver<T> {
    transport: T,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<SendResult>>>>,
    cache: Mutex<HashMap<String, CachedResponse>>,
}

impl<T: Transport> Resolver<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            in_flight: Mutex::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn resolve(
        &self,
        uid: &str,
        request: &DerivedVariableRequest,
    ) -> Result<DerivedVariableResponse> {
        let key = request_key(uid, request)?;
        let forced = request.is_forced();

        if !forced && let Some(hit) = self.cached(uid, &key) {
            debug!(uid, "resolved from cache");
            return Ok(hit);
        }

        let cell = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(in_flight.entry(key.clone()).or_default())
        };

        let result = cell
            .get_or_init(|| async {
                debug!(uid, forced, "sending derived variable request");
                self.transport.send(uid, request).await
            })
            .await
            .clone();

        if !forced && let Ok(response @ DerivedVariableResponse::Value { .. }) = &result {
            self.cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(
                    uid.to_string(),
                    CachedResponse {
                        key: key.clone(),
                        response: response.clone(),
                    },
                );
        }

        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if in_flight.get(&key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
                in_flight.remove(&key);
            }
        }

        if let Err(err) = &result {
            warn!(uid, error = %err, retryable = err.retryable, "derived variable request failed");
        }
        result.map_err(CoreError::from)
    }

    /// Drop the memoised response for `uid`.
    pub fn invalidate(&self, uid: &str) {
        let removed = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uid)
            .is_some();
        debug!(uid, removed, "cache invalidated");
    }

    /// Number of memoised responses for `uid` (zero or one).
    pub fn cached_entries(&self, uid: &str) -> usize {
        usize::from(
            self.cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(uid),
        )
    }

    fn cached(&self, uid: &str, key: &str) -> Option<DerivedVariableResponse> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uid)
            .filter(|entry| entry.key == key)
            .map(|entry| entry.response.clone())
    }
}

/// Coalescing key: uid plus the hash of the canonical request body.
pub fn request_key(uid: &str, request: &DerivedVariableRequest) -> Result<String> {
    let body = serde_json::to_value(request)?;
    Ok(format!("{uid}:{}", stable_hash(&body, ArrayOrder::Preserve)))
}
