//! Error types
//!
//! Failures that are returned to the caller. Transport-level failures are not
//! in here: they are delivered asynchronously through the `on_error` callback.

use serde_json::{json, Value};
use thiserror::Error;

/// Errors returned by the connection manager and transports
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnlyError {
    /// A constructor or builder argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An outbound action was attempted while not connected. Nothing was emitted.
    #[error("not connected, `{event}` was not sent")]
    NotConnected { event: &'static str },

    /// The transport reported a failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport handle has already been closed.
    #[error("transport handle is closed")]
    TransportClosed,
}

impl ConnlyError {
    /// Error value handed to the `on_error` callback
    pub fn to_payload(&self) -> Value {
        json!({ "message": self.to_string() })
    }
}

/// Result alias for this crate
pub type Result<T> = std::result::Result<T, ConnlyError>;
