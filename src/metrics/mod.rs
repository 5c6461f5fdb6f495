//! Metrics
//!
//! Atomic counters describing connection activity.

mod counters;

pub use counters::*;
