//! Connection state

use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::keepalive::KeepaliveTimer;
use crate::transport::TransportHandle;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No live connection. Initial state.
    #[default]
    Disconnected,
    /// The transport reported a successful connect
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connected => f.write_str("connected"),
        }
    }
}

/// A transport handle together with the task listening to its signals.
///
/// Dropping the link closes the handle and detaches the listener.
pub(crate) struct ActiveLink {
    handle: Arc<dyn TransportHandle>,
    listener: JoinHandle<()>,
}

impl ActiveLink {
    pub(crate) fn new(handle: Arc<dyn TransportHandle>, listener: JoinHandle<()>) -> Self {
        Self { handle, listener }
    }
}

impl Drop for ActiveLink {
    fn drop(&mut self) {
        self.listener.abort();
        self.handle.close();
    }
}

/// Mutable per-manager state.
///
/// Only these methods change it. `generation` is bumped whenever a handle is
/// attached or torn down; listeners and timers created for an older
/// generation are stale and must not touch the state.
#[derive(Default)]
pub(crate) struct Lifecycle {
    state: ConnectionState,
    generation: u64,
    link: Option<ActiveLink>,
    keepalive: Option<KeepaliveTimer>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether `generation` belongs to the attached handle
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.link.is_some() && self.generation == generation
    }

    /// Reserve the generation for the next handle
    pub(crate) fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Attach the link opened for the latest reserved generation.
    /// Callers tear down the previous link first.
    pub(crate) fn attach(&mut self, link: ActiveLink) {
        debug_assert!(self.link.is_none(), "previous link not torn down");
        self.link = Some(link);
    }

    /// Transport reported connect: replace the keepalive timer
    pub(crate) fn mark_connected(&mut self, keepalive: KeepaliveTimer) {
        self.state = ConnectionState::Connected;
        // the old timer, if any, is cancelled on drop
        self.keepalive = Some(keepalive);
    }

    /// Transport reported disconnect: stop the keepalive timer
    pub(crate) fn mark_disconnected(&mut self) -> ConnectionState {
        self.keepalive = None;
        std::mem::replace(&mut self.state, ConnectionState::Disconnected)
    }

    /// Close the attached handle, detach its listener and stop the keepalive.
    ///
    /// Returns the state before teardown, or `None` if nothing was attached.
    pub(crate) fn teardown(&mut self) -> Option<ConnectionState> {
        let link = self.link.take()?;
        let previous = self.mark_disconnected();
        self.generation += 1;
        drop(link);
        Some(previous)
    }

    /// The handle, but only while connected
    pub(crate) fn connected_handle(&self) -> Option<Arc<dyn TransportHandle>> {
        match (self.state, &self.link) {
            (ConnectionState::Connected, Some(link)) => Some(link.handle.clone()),
            _ => None,
        }
    }

    pub(crate) fn keepalive_running(&self) -> bool {
        self.keepalive.is_some()
    }
}
