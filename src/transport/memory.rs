//! In-process transport
//!
//! `MemoryConnector` opens handles that talk to a [`MemoryRemote`] instead of
//! a socket. The remote plays the server: it injects lifecycle signals and
//! events, records what the client emitted, and answers acknowledgements.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use super::{
    AckReceiver, Connector, TransportHandle, TransportOptions, TransportSession, TransportSignal,
};
use crate::error::{ConnlyError, Result};

/// Disconnect reason reported when the client closes its own handle
pub const CLIENT_CLOSE_REASON: &str = "io client disconnect";

/// One event emitted by the client
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub event: String,
    pub payload: Value,
    pub wants_ack: bool,
}

/// Connector handing out in-memory handles
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<ConnectorState>>,
}

#[derive(Default)]
struct ConnectorState {
    remotes: Vec<MemoryRemote>,
    refuse_next: Option<String>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` fail with the given reason
    pub fn refuse_next(&self, reason: impl Into<String>) {
        self.state.lock().refuse_next = Some(reason.into());
    }

    /// Number of handles opened so far
    pub fn opened(&self) -> usize {
        self.state.lock().remotes.len()
    }

    /// Number of handles not yet closed by the client
    pub fn open_handles(&self) -> usize {
        self.state
            .lock()
            .remotes
            .iter()
            .filter(|r| !r.is_closed())
            .count()
    }

    /// Server side of the `index`-th opened handle
    pub fn remote(&self, index: usize) -> Option<MemoryRemote> {
        self.state.lock().remotes.get(index).cloned()
    }

    /// Server side of the most recently opened handle
    pub fn latest(&self) -> Option<MemoryRemote> {
        self.state.lock().remotes.last().cloned()
    }
}

impl Connector for MemoryConnector {
    fn open(&self, options: &TransportOptions) -> Result<TransportSession> {
        let mut state = self.state.lock();
        if let Some(reason) = state.refuse_next.take() {
            return Err(ConnlyError::Transport(reason));
        }

        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let link = Arc::new(Link {
            options: options.clone(),
            signals: signals_tx,
            emissions: Mutex::new(Vec::new()),
            pending_acks: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        });

        state.remotes.push(MemoryRemote { link: link.clone() });
        trace!(address = %options.address, index = state.remotes.len() - 1, "Memory handle opened");

        Ok(TransportSession {
            handle: Arc::new(MemoryHandle { link }),
            signals: signals_rx,
        })
    }
}

struct Link {
    options: TransportOptions,
    signals: mpsc::UnboundedSender<TransportSignal>,
    emissions: Mutex<Vec<Emission>>,
    pending_acks: Mutex<VecDeque<(String, oneshot::Sender<Value>)>>,
    closed: AtomicBool,
}

impl Link {
    fn record(&self, event: &str, payload: Value, wants_ack: bool) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ConnlyError::TransportClosed);
        }
        self.emissions.lock().push(Emission {
            event: event.to_string(),
            payload,
            wants_ack,
        });
        Ok(())
    }
}

/// Client side of an in-memory connection
pub struct MemoryHandle {
    link: Arc<Link>,
}

impl fmt::Debug for MemoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHandle")
            .field("address", &self.link.options.address)
            .field("closed", &self.link.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl TransportHandle for MemoryHandle {
    fn emit(&self, event: &str, payload: Value) -> Result<()> {
        self.link.record(event, payload, false)
    }

    fn emit_with_ack(&self, event: &str, payload: Value) -> Result<AckReceiver> {
        self.link.record(event, payload, true)?;
        let (tx, rx) = oneshot::channel();
        self.link.pending_acks.lock().push_back((event.to_string(), tx));
        Ok(rx)
    }

    fn close(&self) {
        if !self.link.closed.swap(true, Ordering::AcqRel) {
            // unanswered acks resolve with an error
            self.link.pending_acks.lock().clear();
            // mirror event-emitter clients, which report their own close
            let _ = self.link.signals.send(TransportSignal::Disconnect {
                reason: CLIENT_CLOSE_REASON.to_string(),
            });
        }
    }
}

/// Server side of an in-memory connection
#[derive(Clone)]
pub struct MemoryRemote {
    link: Arc<Link>,
}

impl MemoryRemote {
    /// Options the client opened this handle with
    pub fn options(&self) -> &TransportOptions {
        &self.link.options
    }

    /// Deliver a raw signal. Returns `false` once nobody listens anymore.
    pub fn send(&self, signal: TransportSignal) -> bool {
        self.link.signals.send(signal).is_ok()
    }

    pub fn connect(&self) -> bool {
        self.send(TransportSignal::Connect)
    }

    pub fn disconnect(&self, reason: impl Into<String>) -> bool {
        self.send(TransportSignal::Disconnect {
            reason: reason.into(),
        })
    }

    pub fn connect_error(&self, error: Value) -> bool {
        self.send(TransportSignal::ConnectError(error))
    }

    pub fn error(&self, error: Value) -> bool {
        self.send(TransportSignal::Error(error))
    }

    /// Deliver a named server event
    pub fn deliver(&self, event: &str, payload: Value) -> bool {
        self.send(TransportSignal::Event {
            name: event.to_string(),
            payload,
        })
    }

    /// Everything the client emitted, in order
    pub fn emissions(&self) -> Vec<Emission> {
        self.link.emissions.lock().clone()
    }

    /// Payloads emitted under one event name
    pub fn emitted(&self, event: &str) -> Vec<Value> {
        self.link
            .emissions
            .lock()
            .iter()
            .filter(|e| e.event == event)
            .map(|e| e.payload.clone())
            .collect()
    }

    /// Answer the oldest pending acknowledgement for `event`.
    ///
    /// Returns `false` if there was none or the client stopped waiting.
    pub fn acknowledge(&self, event: &str, value: Value) -> bool {
        let pending = {
            let mut acks = self.link.pending_acks.lock();
            let idx = acks.iter().position(|(name, _)| name == event);
            idx.and_then(|idx| acks.remove(idx))
        };
        match pending {
            Some((_, tx)) => tx.send(value).is_ok(),
            None => false,
        }
    }

    /// Whether the client closed this handle
    pub fn is_closed(&self) -> bool {
        self.link.closed.load(Ordering::Acquire)
    }
}
