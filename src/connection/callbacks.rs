//! Callback table
//!
//! One callback per [`EventSlot`]; registering again replaces the previous one.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::events::EventSlot;

/// A registered event callback
pub type Callback = Arc<dyn Fn(Value) + Send + Sync>;

/// Outcome of a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The slot was empty
    Installed,
    /// A previous callback was replaced
    Replaced,
}

impl Registration {
    pub fn is_replaced(self) -> bool {
        self == Registration::Replaced
    }
}

/// Maps slots to callbacks
#[derive(Default)]
pub struct CallbackTable {
    slots: DashMap<EventSlot, Callback>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self {
            slots: DashMap::with_capacity(EventSlot::ALL.len()),
        }
    }

    /// Store `callback` under `slot`, overwriting any previous registration
    pub fn register(&self, slot: EventSlot, callback: Callback) -> Registration {
        match self.slots.insert(slot, callback) {
            Some(_) => Registration::Replaced,
            None => Registration::Installed,
        }
    }

    /// Remove the callback for `slot`. Returns whether one was registered.
    pub fn remove(&self, slot: EventSlot) -> bool {
        self.slots.remove(&slot).is_some()
    }

    pub fn is_registered(&self, slot: EventSlot) -> bool {
        self.slots.contains_key(&slot)
    }

    /// Call the callback for `slot`, if any. Returns whether one ran.
    pub fn invoke(&self, slot: EventSlot, payload: Value) -> bool {
        // clone out so the shard lock is released before user code runs
        let callback = self.slots.get(&slot).map(|entry| entry.value().clone());
        match callback {
            Some(callback) => {
                callback(payload);
                true
            }
            None => false,
        }
    }
}
