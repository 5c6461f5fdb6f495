//! Transport abstraction
//!
//! The manager never speaks a wire protocol. It drives a [`Connector`] that
//! opens [`TransportHandle`]s, and it reads [`TransportSignal`]s from the
//! channel that comes with each handle.

pub mod memory;

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::error::Result;
use crate::events;

/// Options passed to the connector for every new handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Server endpoint
    pub address: String,
    /// Connection-time authentication data, sent as query parameters
    pub query: Vec<(String, String)>,
}

impl TransportOptions {
    /// Options carrying `credential` as the `token` query parameter
    pub fn new(address: &str, credential: &str) -> Self {
        Self {
            address: address.to_string(),
            query: vec![("token".to_string(), credential.to_string())],
        }
    }

    /// Look up a query parameter
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Something delivered by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// The connection is established
    Connect,
    /// The connection was lost or closed
    Disconnect { reason: String },
    /// Establishing the connection failed
    ConnectError(Value),
    /// Any other transport failure
    Error(Value),
    /// A named server event
    Event { name: String, payload: Value },
}

impl TransportSignal {
    /// Map a raw event as reported by an event-emitter style client.
    pub fn from_raw(name: &str, payload: Value) -> Self {
        match name {
            events::CONNECT => TransportSignal::Connect,
            events::DISCONNECT => TransportSignal::Disconnect {
                reason: payload.as_str().unwrap_or_default().to_string(),
            },
            events::CONNECT_ERROR => TransportSignal::ConnectError(payload),
            events::ERROR => TransportSignal::Error(payload),
            _ => TransportSignal::Event {
                name: name.to_string(),
                payload,
            },
        }
    }
}

/// Receiver for a server acknowledgement
pub type AckReceiver = oneshot::Receiver<Value>;

/// One open connection to the server
pub trait TransportHandle: Send + Sync + fmt::Debug {
    /// Emit a named event
    fn emit(&self, event: &str, payload: Value) -> Result<()>;

    /// Emit a named event and ask the server to acknowledge it
    fn emit_with_ack(&self, event: &str, payload: Value) -> Result<AckReceiver>;

    /// Shut the connection down. Idempotent.
    fn close(&self);
}

/// A freshly opened handle with its signal stream
pub struct TransportSession {
    pub handle: Arc<dyn TransportHandle>,
    pub signals: mpsc::UnboundedReceiver<TransportSignal>,
}

/// Opens transport handles
pub trait Connector: Send + Sync {
    /// Create a new handle. Connection progress and failures after this call
    /// arrive as signals.
    fn open(&self, options: &TransportOptions) -> Result<TransportSession>;
}
