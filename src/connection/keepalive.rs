//! Keepalive timer
//!
//! A recurring task that runs a tick closure once per period. The first tick
//! happens one full period after start. Dropping the timer cancels it.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Default period between keepalive pings
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(300);

/// Handle to a running keepalive task
#[derive(Debug)]
pub struct KeepaliveTimer {
    task: JoinHandle<()>,
}

impl KeepaliveTimer {
    /// Spawn the timer on the current runtime.
    ///
    /// `tick` returns `false` to stop the timer for good.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime or with a zero `period`.
    pub fn start<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !tick() {
                    break;
                }
            }
        });

        Self { task }
    }

    /// Whether the task has stopped, either by cancellation or by its tick
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for KeepaliveTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
