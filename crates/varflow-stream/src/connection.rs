//! Stream connection manager.
//!
//! At most one live connection exists per identity key. Starting a connection whose
//! parameters match a live one aborts the old connection before the new one opens.
//! A connection that ends or fails is reopened with exponential backoff until it is
//! closed or runs out of reconnect attempts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use futures_util::future::{AbortHandle, Abortable};
use futures_util::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, trace, warn};
use varflow_model::{ArrayOrder, NormalizedPayload, Variable, stable_hash};

use crate::backoff::StreamSettings;
use crate::error::{Result, StreamTransportError};
use crate::event::{LineDecoder, StreamEvent};
use crate::state::{StreamState, apply_stream_event};

/// Raw text chunks of one connection; framing into lines happens in the manager.
pub type EventStream = BoxStream<'static, std::result::Result<String, StreamTransportError>>;

type AbortFn = Box<dyn FnOnce() + Send>;
type StateSink = Arc<dyn Fn(Arc<StreamState>) + Send + Sync>;
type Registry = Arc<Mutex<HashMap<String, ActiveConnection>>>;

/// A freshly opened connection and the callback that tears it down.
pub struct OpenedStream {
    pub events: EventStream,
    pub abort: AbortFn,
}

impl OpenedStream {
    pub fn new(events: EventStream, abort: impl FnOnce() + Send + 'static) -> Self {
        Self {
            events,
            abort: Box::new(abort),
        }
    }
}

/// Opens server-push connections for stream variables.
pub trait StreamTransport: Send + Sync + 'static {
    fn open_stream(&self, params: &StreamParams) -> std::result::Result<OpenedStream, StreamTransportError>;
}

/// Everything that identifies one stream subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamParams {
    pub uid: String,
    pub resolved_values: NormalizedPayload,
    pub variables: Vec<Variable>,
    pub key_accessor: Option<String>,
    pub extras: Value,
}

impl StreamParams {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            resolved_values: NormalizedPayload::default(),
            variables: Vec::new(),
            key_accessor: None,
            extras: Value::Null,
        }
    }

    #[must_use]
    pub fn with_key_accessor(mut self, accessor: impl Into<String>) -> Self {
        self.key_accessor = Some(accessor.into());
        self
    }

    #[must_use]
    pub fn with_resolved_values(mut self, values: NormalizedPayload) -> Self {
        self.resolved_values = values;
        self
    }

    #[must_use]
    pub fn with_extras(mut self, extras: Value) -> Self {
        self.extras = extras;
        self
    }

    /// Stable hash of the serialized parameters.
    pub fn identity_key(&self) -> Result<String> {
        let value = serde_json::to_value(self)?;
        Ok(stable_hash(&value, ArrayOrder::Preserve))
    }
}

struct ConnectionControl {
    aborted: AtomicBool,
    task: AbortHandle,
    transport_abort: Mutex<Option<AbortFn>>,
}

impl ConnectionControl {
    fn new(task: AbortHandle) -> Self {
        Self {
            aborted: AtomicBool::new(false),
            task,
            transport_abort: Mutex::new(None),
        }
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Stop the task and release the transport. Safe to call repeatedly.
    fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.task.abort();
        let release = self
            .transport_abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(release) = release {
            release();
        }
    }

    fn replace_transport_abort(&self, release: AbortFn) {
        *self
            .transport_abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(release);
        // An abort that raced the reopen must still release the new connection.
        if self.is_aborted() {
            self.abort();
        }
    }
}

struct ActiveConnection {
    id: u64,
    control: Arc<ConnectionControl>,
}

fn unregister(registry: &Registry, identity: &str, id: u64) {
    let mut connections = registry.lock().unwrap_or_else(PoisonError::into_inner);
    if connections.get(identity).is_some_and(|c| c.id == id) {
        connections.remove(identity);
    }
}

/// Starts and tracks stream connections.
pub struct StreamManager<T> {
    transport: Arc<T>,
    settings: StreamSettings,
    connections: Registry,
    next_id: AtomicU64,
}

impl<T: StreamTransport> StreamManager<T> {
    pub fn new(transport: T, settings: StreamSettings) -> Self {
        Self {
            transport: Arc::new(transport),
            settings,
            connections: Arc::default(),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Open a connection for `params`, delivering every state change to `sink`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<F>(&self, params: StreamParams, sink: F) -> Result<StreamSubscription>
    where
        F: Fn(Arc<StreamState>) + Send + Sync + 'static,
    {
        let identity = params.identity_key()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (task, registration) = AbortHandle::new_pair();
        let control = Arc::new(ConnectionControl::new(task));

        let previous = self
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&identity);
        if let Some(previous) = previous {
            debug!(uid = %params.uid, identity = %identity, "replacing live stream connection");
            previous.control.abort();
        }

        let first = match self.transport.open_stream(&params) {
            Ok(opened) => {
                control.replace_transport_abort(opened.abort);
                Some(opened.events)
            }
            Err(err) => {
                warn!(uid = %params.uid, error = %err, "failed to open stream");
                None
            }
        };

        let displaced = self
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                identity.clone(),
                ActiveConnection {
                    id,
                    control: Arc::clone(&control),
                },
            );
        if let Some(displaced) = displaced {
            displaced.control.abort();
        }

        let run = ConnectionRun {
            transport: Arc::clone(&self.transport),
            params,
            settings: self.settings.clone(),
            control: Arc::clone(&control),
            sink: Arc::new(sink),
            registry: Arc::clone(&self.connections),
            identity: identity.clone(),
            id,
        };
        tokio::spawn(Abortable::new(run.run(first), registration));

        Ok(StreamSubscription {
            identity,
            id,
            control,
            registry: Arc::clone(&self.connections),
        })
    }

    /// Number of identities with a live connection.
    pub fn active_connections(&self) -> usize {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Handle to one started connection. Dropping it closes the connection.
pub struct StreamSubscription {
    identity: String,
    id: u64,
    control: Arc<ConnectionControl>,
    registry: Registry,
}

impl StreamSubscription {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Whether this connection is still the live one for its identity.
    pub fn is_active(&self) -> bool {
        !self.control.is_aborted()
            && self
                .registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&self.identity)
                .is_some_and(|c| c.id == self.id)
    }

    /// Abort the connection. No state change is delivered afterwards.
    pub fn close(&self) {
        self.control.abort();
        unregister(&self.registry, &self.identity, self.id);
    }
}

impl Drop for StreamSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

struct ConnectionRun<T> {
    transport: Arc<T>,
    params: StreamParams,
    settings: StreamSettings,
    control: Arc<ConnectionControl>,
    sink: StateSink,
    registry: Registry,
    identity: String,
    id: u64,
}

impl<T: StreamTransport> ConnectionRun<T> {
    async fn run(self, mut events: Option<EventStream>) {
        let mut state: Option<Arc<StreamState>> = None;
        let mut attempt: u32 = 0;

        loop {
            if let Some(stream) = events.take() {
                self.consume(stream, &mut state, &mut attempt).await;
            }
            if self.control.is_aborted() {
                return;
            }

            if self
                .settings
                .max_reconnect_attempts
                .is_some_and(|max| attempt >= max)
            {
                warn!(uid = %self.params.uid, attempts = attempt, "giving up on stream");
                let message = format!("Connection lost after {attempt} reconnect attempts");
                unregister(&self.registry, &self.identity, self.id);
                self.emit(&mut state, &StreamEvent::Error(Value::String(message)));
                return;
            }

            self.emit(&mut state, &StreamEvent::Reconnect);
            let delay = self.settings.delay_for(attempt);
            info!(
                uid = %self.params.uid,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "reconnecting stream"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
            if self.control.is_aborted() {
                return;
            }

            match self.transport.open_stream(&self.params) {
                Ok(opened) => {
                    self.control.replace_transport_abort(opened.abort);
                    events = Some(opened.events);
                }
                Err(err) => warn!(uid = %self.params.uid, attempt, error = %err, "reconnect failed"),
            }
        }
    }

    async fn consume(
        &self,
        mut stream: EventStream,
        state: &mut Option<Arc<StreamState>>,
        attempt: &mut u32,
    ) {
        let mut decoder = LineDecoder::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(text) => {
                    for line in decoder.push(&text) {
                        self.deliver(&line, state, attempt);
                    }
                }
                Err(err) => {
                    warn!(uid = %self.params.uid, error = %err, "stream connection failed");
                    return;
                }
            }
            if self.control.is_aborted() {
                return;
            }
        }
        if let Some(line) = decoder.finish() {
            self.deliver(&line, state, attempt);
        }
        debug!(uid = %self.params.uid, "stream connection ended");
    }

    fn deliver(&self, line: &str, state: &mut Option<Arc<StreamState>>, attempt: &mut u32) {
        match StreamEvent::parse(line) {
            Ok(event) => {
                *attempt = 0;
                trace!(uid = %self.params.uid, kind = event.kind(), "stream event");
                self.emit(state, &event);
            }
            Err(err) => warn!(uid = %self.params.uid, error = %err, "skipping malformed stream event"),
        }
    }

    fn emit(&self, state: &mut Option<Arc<StreamState>>, event: &StreamEvent) {
        let next = apply_stream_event(state.clone(), event, self.params.key_accessor.as_deref());
        let changed = match (&next, state.as_ref()) {
            (Some(next), Some(previous)) => !Arc::ptr_eq(next, previous),
            (Some(_), None) => true,
            (None, _) => false,
        };
        *state = next;
        if changed
            && !self.control.is_aborted()
            && let Some(current) = state
        {
            (self.sink)(Arc::clone(current));
        }
    }
}
