//! Connection manager
//!
//! Owns one transport handle at a time, tracks the connection state reported
//! by the transport, keeps the connection alive while it is up and fans
//! inbound events out to the registered callbacks.

use parking_lot::{Mutex, ReentrantMutex};
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::callbacks::{CallbackTable, Registration};
use super::keepalive::{KeepaliveTimer, DEFAULT_KEEPALIVE_INTERVAL};
use super::state::{ActiveLink, ConnectionState, Lifecycle};
use crate::config::ClientConfig;
use crate::error::{ConnlyError, Result};
use crate::events::{ping_payload, ConnectionStatus, EventSlot, OutboundEvent};
use crate::metrics::{ConnectionMetrics, MetricsSnapshot};
use crate::transport::{Connector, TransportHandle, TransportOptions, TransportSignal};

/// Callback for a server acknowledgement. Runs at most once.
pub type AckCallback = Box<dyn FnOnce(Value) + Send>;

/// Client connection manager.
///
/// Cloning is cheap; clones share the same connection. The manager never
/// connects on its own: call [`connect`](Self::connect) after registering
/// callbacks. Methods that start background work (`connect`, the `_with_ack`
/// senders) must be called from within a Tokio runtime.
///
/// State changes and their `on_connect`/`on_disconnect` callbacks are
/// serialized, so callbacks observe transitions in the order they happened
/// even when `disconnect` races the transport on another thread. Callbacks
/// may call back into the manager.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    /// Server endpoint
    address: String,
    /// Auth data sent with every new handle
    credential: String,
    /// Period between keepalive pings
    keepalive_interval: Duration,
    /// Opens transport handles
    connector: Arc<dyn Connector>,
    /// Registered callbacks by slot
    callbacks: CallbackTable,
    /// Held across a state transition and its callback. Reentrant so
    /// callbacks can call `connect`/`disconnect`.
    transitions: ReentrantMutex<()>,
    /// Current state, handle and keepalive
    lifecycle: Mutex<Lifecycle>,
    /// Activity counters
    metrics: ConnectionMetrics,
}

impl ConnectionManager {
    /// Create a manager for `address`, authenticating with `credential`
    pub fn new(
        address: impl Into<String>,
        credential: impl Into<String>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        Self::with_keepalive_interval(address, credential, DEFAULT_KEEPALIVE_INTERVAL, connector)
    }

    /// Like [`new`](Self::new) with a custom keepalive period
    pub fn with_keepalive_interval(
        address: impl Into<String>,
        credential: impl Into<String>,
        keepalive_interval: Duration,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        let address = address.into();
        if address.trim().is_empty() {
            return Err(ConnlyError::InvalidArgument(
                "address must not be empty".into(),
            ));
        }
        if keepalive_interval.is_zero() {
            return Err(ConnlyError::InvalidArgument(
                "keepalive interval must be > 0".into(),
            ));
        }

        Ok(Self {
            shared: Arc::new(Shared {
                address,
                credential: credential.into(),
                keepalive_interval,
                connector,
                callbacks: CallbackTable::new(),
                transitions: ReentrantMutex::new(()),
                lifecycle: Mutex::new(Lifecycle::new()),
                metrics: ConnectionMetrics::new(),
            }),
        })
    }

    /// Create a manager from loaded configuration
    pub fn from_config(config: &ClientConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        Self::with_keepalive_interval(
            config.server.address.clone(),
            config.server.token.clone(),
            config.keepalive.interval(),
            connector,
        )
    }

    pub fn address(&self) -> &str {
        &self.shared.address
    }

    pub fn keepalive_interval(&self) -> Duration {
        self.shared.keepalive_interval
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lifecycle.lock().state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Whether a keepalive timer is currently running
    pub fn keepalive_running(&self) -> bool {
        self.shared.lifecycle.lock().keepalive_running()
    }

    /// Get a snapshot of this manager's counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    // Lifecycle

    /// Open a new transport handle.
    ///
    /// Any existing handle is torn down first. Failures are reported through
    /// the `on_error` callback, never returned, and only after `connect` has
    /// returned, so the callback may simply call `connect` again.
    pub fn connect(&self) {
        let shared = &self.shared;
        let _transition = shared.transitions.lock();

        // bound first so the lock is released before callbacks run
        let previous = shared.lifecycle.lock().teardown();
        if let Some(previous) = previous {
            info!(address = %shared.address, "Replacing existing connection");
            shared.link_closed(previous);
        }

        let options = TransportOptions::new(&shared.address, &shared.credential);
        let mut lifecycle = shared.lifecycle.lock();
        // a disconnect callback may have reconnected already
        let raced = lifecycle.teardown();
        let generation = lifecycle.next_generation();

        let opened = shared.connector.open(&options).map(|session| {
            let listener = tokio::spawn(listen(Arc::downgrade(shared), generation, session.signals));
            lifecycle.attach(ActiveLink::new(session.handle, listener));
        });
        drop(lifecycle);

        if let Some(previous) = raced {
            shared.link_closed(previous);
        }

        match opened {
            Ok(()) => {
                shared.metrics.handle_opened();
                info!(address = %shared.address, generation, "Transport handle opened");
            }
            Err(err) => {
                shared.metrics.error();
                warn!(address = %shared.address, error = %err, "Failed to open transport handle");
                let payload = err.to_payload();
                let shared = Arc::downgrade(shared);
                tokio::spawn(async move {
                    if let Some(shared) = shared.upgrade() {
                        shared.callbacks.invoke(EventSlot::Error, payload);
                    }
                });
            }
        }
    }

    /// Close the current handle and stop the keepalive. No-op when nothing
    /// is attached.
    pub fn disconnect(&self) {
        let _transition = self.shared.transitions.lock();
        let previous = self.shared.lifecycle.lock().teardown();
        if let Some(previous) = previous {
            info!(address = %self.shared.address, "Disconnected by client");
            self.shared.link_closed(previous);
        }
    }

    // Registration

    /// Register `callback` for `slot`, replacing any previous one
    pub fn on<F>(&self, slot: EventSlot, callback: F) -> Registration
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let registration = self.shared.callbacks.register(slot, Arc::new(callback));
        trace!(slot = %slot, ?registration, "Callback registered");
        registration
    }

    /// Remove the callback for `slot`. Returns whether one was registered.
    pub fn off(&self, slot: EventSlot) -> bool {
        self.shared.callbacks.remove(slot)
    }

    /// Called with `{"isConnected": true}` when the transport connects
    pub fn on_connect<F>(&self, callback: F) -> Registration
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.on(EventSlot::Connect, callback)
    }

    /// Called with `{"isConnected": false}` when the connection goes down
    pub fn on_disconnect<F>(&self, callback: F) -> Registration
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.on(EventSlot::Disconnect, callback)
    }

    /// Called with the error value of connect errors and transport errors
    pub fn on_error<F>(&self, callback: F) -> Registration
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.on(EventSlot::Error, callback)
    }

    pub fn on_status<F>(&self, callback: F) -> Registration
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.on(EventSlot::Status, callback)
    }

    pub fn on_message<F>(&self, callback: F) -> Registration
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.on(EventSlot::Message, callback)
    }

    pub fn on_reaction<F>(&self, callback: F) -> Registration
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.on(EventSlot::Reaction, callback)
    }

    pub fn on_read_receipt<F>(&self, callback: F) -> Registration
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.on(EventSlot::ReadReceipt, callback)
    }

    pub fn on_delivery_receipt<F>(&self, callback: F) -> Registration
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.on(EventSlot::DeliveryReceipt, callback)
    }

    pub fn on_typing_status<F>(&self, callback: F) -> Registration
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.on(EventSlot::TypingStatus, callback)
    }

    pub fn on_call_action<F>(&self, callback: F) -> Registration
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.on(EventSlot::CallAction, callback)
    }

    pub fn on_presence<F>(&self, callback: F) -> Registration
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.on(EventSlot::Presence, callback)
    }

    pub fn on_change<F>(&self, callback: F) -> Registration
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.on(EventSlot::Change, callback)
    }

    // Outbound actions. All of them fail with `NotConnected` and emit nothing
    // unless the transport has reported a connect.

    /// Publish the user's status as `{"status": status}`
    pub fn set_status(&self, status: impl Into<Value>) -> Result<()> {
        self.emit(OutboundEvent::Status, json!({ "status": status.into() }))
    }

    /// Send a message; the server acknowledgement is discarded
    pub fn send_message(&self, content: impl Into<Value>) -> Result<()> {
        self.emit_acked(OutboundEvent::Message, content.into(), None)
    }

    /// Send a message and receive the server acknowledgement in `ack`
    pub fn send_message_with_ack<F>(&self, content: impl Into<Value>, ack: F) -> Result<()>
    where
        F: FnOnce(Value) + Send + 'static,
    {
        self.emit_acked(OutboundEvent::Message, content.into(), Some(Box::new(ack)))
    }

    /// Send a reaction; the server acknowledgement is discarded
    pub fn send_reaction(&self, reaction: impl Into<Value>) -> Result<()> {
        self.emit_acked(OutboundEvent::Reaction, reaction.into(), None)
    }

    /// Send a reaction and receive the server acknowledgement in `ack`
    pub fn send_reaction_with_ack<F>(&self, reaction: impl Into<Value>, ack: F) -> Result<()>
    where
        F: FnOnce(Value) + Send + 'static,
    {
        self.emit_acked(OutboundEvent::Reaction, reaction.into(), Some(Box::new(ack)))
    }

    pub fn send_read_receipt(&self, details: impl Into<Value>) -> Result<()> {
        self.emit(OutboundEvent::ReadReceipt, details.into())
    }

    pub fn send_typing_status(&self, details: impl Into<Value>) -> Result<()> {
        self.emit(OutboundEvent::TypingStatus, details.into())
    }

    fn connected_handle(&self, event: OutboundEvent) -> Result<Arc<dyn TransportHandle>> {
        let handle = self.shared.lifecycle.lock().connected_handle();
        handle.ok_or_else(|| {
            self.shared.metrics.dropped();
            debug!(event = %event, "Not connected, outbound event dropped");
            ConnlyError::NotConnected {
                event: event.name(),
            }
        })
    }

    fn emit(&self, event: OutboundEvent, payload: Value) -> Result<()> {
        let handle = self.connected_handle(event)?;
        handle.emit(event.name(), payload)?;
        self.shared.metrics.emit();
        trace!(event = %event, "Emitted");
        Ok(())
    }

    fn emit_acked(
        &self,
        event: OutboundEvent,
        payload: Value,
        ack: Option<AckCallback>,
    ) -> Result<()> {
        debug_assert!(event.supports_ack());
        let handle = self.connected_handle(event)?;
        let reply = handle.emit_with_ack(event.name(), payload)?;
        self.shared.metrics.emit();
        trace!(event = %event, "Emitted, awaiting acknowledgement");

        if let Some(ack) = ack {
            let shared = Arc::downgrade(&self.shared);
            tokio::spawn(async move {
                // the sender is dropped if the transport never answers
                if let Ok(value) = reply.await {
                    if let Some(shared) = shared.upgrade() {
                        shared.metrics.ack_received();
                    }
                    debug!(event = %event, "Acknowledgement received");
                    ack(value);
                }
            });
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("address", &self.shared.address)
            .field("state", &self.state())
            .finish()
    }
}

impl Shared {
    /// Report a link that was torn down locally
    fn link_closed(&self, previous: ConnectionState) {
        if previous == ConnectionState::Connected {
            self.metrics.disconnected();
            self.callbacks
                .invoke(EventSlot::Disconnect, ConnectionStatus::disconnected().to_payload());
        }
    }

    /// Apply one transport signal. Returns `false` once the listener's
    /// handle has been replaced or torn down.
    fn handle_signal(self: &Arc<Self>, generation: u64, signal: TransportSignal) -> bool {
        match signal {
            TransportSignal::Connect => {
                let _transition = self.transitions.lock();
                {
                    let mut lifecycle = self.lifecycle.lock();
                    if !lifecycle.is_current(generation) {
                        return false;
                    }
                    let shared = Arc::downgrade(self);
                    let keepalive = KeepaliveTimer::start(self.keepalive_interval, move || {
                        match shared.upgrade() {
                            Some(shared) => shared.keepalive_tick(generation),
                            None => false,
                        }
                    });
                    lifecycle.mark_connected(keepalive);
                }
                self.metrics.connected();
                info!(address = %self.address, generation, "Connected");
                self.callbacks
                    .invoke(EventSlot::Connect, ConnectionStatus::connected().to_payload());
            }
            TransportSignal::Disconnect { reason } => {
                let _transition = self.transitions.lock();
                {
                    let mut lifecycle = self.lifecycle.lock();
                    if !lifecycle.is_current(generation) {
                        return false;
                    }
                    lifecycle.mark_disconnected();
                }
                self.metrics.disconnected();
                info!(address = %self.address, generation, %reason, "Disconnected");
                self.callbacks
                    .invoke(EventSlot::Disconnect, ConnectionStatus::disconnected().to_payload());
            }
            TransportSignal::ConnectError(error) | TransportSignal::Error(error) => {
                if !self.lifecycle.lock().is_current(generation) {
                    return false;
                }
                self.metrics.error();
                warn!(address = %self.address, generation, %error, "Transport error");
                self.callbacks.invoke(EventSlot::Error, error);
            }
            TransportSignal::Event { name, payload } => {
                if !self.lifecycle.lock().is_current(generation) {
                    return false;
                }
                self.dispatch(&name, payload);
            }
        }
        true
    }

    fn dispatch(&self, name: &str, payload: Value) {
        let Some(slot) = EventSlot::from_inbound_event(name) else {
            self.metrics.event_unhandled();
            debug!(event = name, "Ignoring event outside the catalog");
            return;
        };

        if self.callbacks.invoke(slot, payload) {
            self.metrics.event_dispatched();
            trace!(event = name, slot = %slot, "Dispatched");
        } else {
            self.metrics.event_unhandled();
            trace!(event = name, slot = %slot, "No callback registered");
        }
    }

    /// One keepalive period elapsed. Returns `false` to stop the timer.
    fn keepalive_tick(&self, generation: u64) -> bool {
        let handle = {
            let lifecycle = self.lifecycle.lock();
            if !lifecycle.is_current(generation) {
                return false;
            }
            lifecycle.connected_handle()
        };
        // state is re-read every tick; skip while not connected
        let Some(handle) = handle else {
            return true;
        };

        match handle.emit(OutboundEvent::Ping.name(), ping_payload()) {
            Ok(()) => {
                self.metrics.keepalive();
                debug!(address = %self.address, "ping");
            }
            Err(err) => {
                warn!(address = %self.address, error = %err, "Keepalive ping failed");
            }
        }
        true
    }
}

/// Drain the signals of one handle in arrival order
async fn listen(
    shared: Weak<Shared>,
    generation: u64,
    mut signals: mpsc::UnboundedReceiver<TransportSignal>,
) {
    while let Some(signal) = signals.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if !shared.handle_signal(generation, signal) {
            break;
        }
    }
    trace!(generation, "Listener stopped");
}
