//! Connection management
//!
//! Handles connection state, lifecycle, keepalive and callback dispatch.

mod callbacks;
mod keepalive;
mod manager;
mod state;

pub use callbacks::{Callback, CallbackTable, Registration};
pub use keepalive::{KeepaliveTimer, DEFAULT_KEEPALIVE_INTERVAL};
pub use manager::{AckCallback, ConnectionManager};
pub use state::ConnectionState;
