//! Event catalog
//!
//! The fixed set of inbound callback slots, the outbound events the client
//! emits, and the status payload handed to connect/disconnect callbacks.

use serde_json::{json, Value};
use std::fmt;

/// Transport-level signal names
pub const CONNECT: &str = "connect";
pub const DISCONNECT: &str = "disconnect";
pub const CONNECT_ERROR: &str = "connect_error";
pub const ERROR: &str = "error";

/// A callback slot. Each slot holds at most one registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSlot {
    /// Transport connected
    Connect,
    /// Transport disconnected
    Disconnect,
    /// Connect error or generic transport error
    Error,
    Status,
    Message,
    Reaction,
    ReadReceipt,
    DeliveryReceipt,
    TypingStatus,
    CallAction,
    Presence,
    Change,
}

impl EventSlot {
    /// Every slot, lifecycle slots first
    pub const ALL: [EventSlot; 12] = [
        EventSlot::Connect,
        EventSlot::Disconnect,
        EventSlot::Error,
        EventSlot::Status,
        EventSlot::Message,
        EventSlot::Reaction,
        EventSlot::ReadReceipt,
        EventSlot::DeliveryReceipt,
        EventSlot::TypingStatus,
        EventSlot::CallAction,
        EventSlot::Presence,
        EventSlot::Change,
    ];

    /// Server event name feeding this slot.
    ///
    /// `None` for the lifecycle slots, which are driven by transport signals
    /// rather than named domain events.
    pub fn inbound_event(self) -> Option<&'static str> {
        match self {
            EventSlot::Connect | EventSlot::Disconnect | EventSlot::Error => None,
            EventSlot::Status => Some("connly_on_status"),
            EventSlot::Message => Some("connly_on_message"),
            EventSlot::Reaction => Some("connly_on_reaction"),
            EventSlot::ReadReceipt => Some("connly_on_read_receipt"),
            EventSlot::DeliveryReceipt => Some("connly_on_delivery_receipt"),
            EventSlot::TypingStatus => Some("connly_on_type_status"),
            EventSlot::CallAction => Some("connly_on_call_status"),
            EventSlot::Presence => Some("connly_users_status"),
            EventSlot::Change => Some("connly_user_channel_changes"),
        }
    }

    /// Slot for a server event name, if it is part of the catalog
    pub fn from_inbound_event(name: &str) -> Option<Self> {
        EventSlot::ALL
            .into_iter()
            .find(|slot| slot.inbound_event() == Some(name))
    }

    /// Registration name, as in `on_read_receipt`
    pub fn as_str(self) -> &'static str {
        match self {
            EventSlot::Connect => "on_connect",
            EventSlot::Disconnect => "on_disconnect",
            EventSlot::Error => "on_error",
            EventSlot::Status => "on_status",
            EventSlot::Message => "on_message",
            EventSlot::Reaction => "on_reaction",
            EventSlot::ReadReceipt => "on_read_receipt",
            EventSlot::DeliveryReceipt => "on_delivery_receipt",
            EventSlot::TypingStatus => "on_typing_status",
            EventSlot::CallAction => "on_call_action",
            EventSlot::Presence => "on_presence",
            EventSlot::Change => "on_change",
        }
    }
}

impl fmt::Display for EventSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted towards the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundEvent {
    Status,
    Message,
    Reaction,
    ReadReceipt,
    TypingStatus,
    /// Keepalive, emitted by the manager itself
    Ping,
}

impl OutboundEvent {
    /// Wire event name
    pub fn name(self) -> &'static str {
        match self {
            OutboundEvent::Status => "connly_status",
            OutboundEvent::Message => "connly_message",
            OutboundEvent::Reaction => "connly_reaction",
            OutboundEvent::ReadReceipt => "connly_read_receipt",
            OutboundEvent::TypingStatus => "connly_type_status",
            OutboundEvent::Ping => "connly_ping",
        }
    }

    /// Whether the server answers this event with an acknowledgement
    pub fn supports_ack(self) -> bool {
        matches!(self, OutboundEvent::Message | OutboundEvent::Reaction)
    }
}

impl fmt::Display for OutboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload of the connect and disconnect callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub is_connected: bool,
}

impl ConnectionStatus {
    pub fn connected() -> Self {
        Self { is_connected: true }
    }

    pub fn disconnected() -> Self {
        Self {
            is_connected: false,
        }
    }

    /// JSON form, `{"isConnected": bool}`
    pub fn to_payload(self) -> Value {
        json!({ "isConnected": self.is_connected })
    }
}

/// Body of the keepalive emission
pub fn ping_payload() -> Value {
    json!({ "status": "ping" })
}
