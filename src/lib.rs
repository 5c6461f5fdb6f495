//! Connly Client - connection lifecycle for Connly messaging
//!
//! This library manages a single logical connection to a Connly server over
//! an event-based transport: connecting and reconnecting, keepalive pings,
//! dispatching server events to callbacks, and gating outbound events on the
//! connection state.

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod metrics;
pub mod transport;
pub mod util;

pub use config::ClientConfig;
pub use connection::{ConnectionManager, ConnectionState, Registration};
pub use error::{ConnlyError, Result};
pub use events::{ConnectionStatus, EventSlot, OutboundEvent};

/// Client version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
