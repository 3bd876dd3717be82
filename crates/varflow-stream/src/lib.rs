//! Stream variables for varflow.
//!
//! A stream variable's value is kept up to date by a server-push connection that
//! sends newline-delimited `{ type, data }` events. This crate holds the pure state
//! machine ([`apply_stream_event`], [`get_stream_value`]) and the connection manager
//! that feeds it ([`StreamManager`]).

pub mod backoff;
pub mod connection;
pub mod error;
pub mod event;
pub mod key;
pub mod state;

pub use backoff::{StreamSettings, get_backoff_delay};
pub use connection::{
    EventStream, OpenedStream, StreamManager, StreamParams, StreamSubscription, StreamTransport,
};
pub use error::{Result, StreamError, StreamTransportError};
pub use event::{LineDecoder, StreamEvent};
pub use key::extract_key;
pub use state::{StreamState, StreamStatus, apply_stream_event, get_stream_value};
