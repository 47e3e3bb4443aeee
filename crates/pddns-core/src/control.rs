//! Reload and shutdown delivery for the engine's sleep phase
//!
//! OS signal handlers (or tests) hold a [`ControlHandle`] and do the minimum:
//! set the reload flag and wake the sleeper. All provider work triggered by
//! a reload happens on the engine's own task after it wakes.
//!
//! Shutdown has its own flag and wins over a pending reload, so a reload
//! that arrives in the same window can never swallow it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Why a [`LoopControl::sleep`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The full duration elapsed
    Elapsed,
    /// Woken with the reload flag set; the flag has been cleared
    Reload,
    /// Shutdown was requested
    Shutdown,
}

#[derive(Debug, Default)]
struct Shared {
    reload: AtomicBool,
    shutdown: AtomicBool,
    wake: Notify,
}

/// Sender side, cheap to clone and safe to use from any task
#[derive(Debug, Clone)]
pub struct ControlHandle {
    shared: Arc<Shared>,
}

impl ControlHandle {
    /// Ask the engine to invalidate caches and poll again
    ///
    /// Only this method sets the reload flag.
    pub fn request_reload(&self) {
        self.shared.reload.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }

    /// Ask the engine to release resources and stop
    ///
    /// Sticky: once set, every later sleep returns [`Wake::Shutdown`].
    pub fn request_shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }
}

/// Receiver side, owned by the engine
#[derive(Debug)]
pub struct LoopControl {
    shared: Arc<Shared>,
}

impl LoopControl {
    /// Create a new control pair
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
        }
    }

    /// Get a handle for signal tasks
    pub fn handle(&self) -> ControlHandle {
        ControlHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Whether a reload is pending
    pub fn reload_pending(&self) -> bool {
        self.shared.reload.load(Ordering::SeqCst)
    }

    /// Whether a shutdown has been requested
    pub fn shutdown_pending(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless woken by a handle
    ///
    /// A request made while the engine was busy ends the next sleep
    /// immediately. Shutdown is checked before reload. Only this method
    /// clears the reload flag.
    pub async fn sleep(&self, duration: Duration) -> Wake {
        let deadline = Instant::now() + duration;
        loop {
            if let Some(wake) = self.take_request() {
                return wake;
            }

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return Wake::Elapsed,
                // A stale permit from an already handled request lands here
                // with no flag set; keep sleeping towards the same deadline.
                _ = self.shared.wake.notified() => {}
            }
        }
    }

    fn take_request(&self) -> Option<Wake> {
        if self.shared.shutdown.load(Ordering::SeqCst) {
            Some(Wake::Shutdown)
        } else if self.shared.reload.swap(false, Ordering::SeqCst) {
            Some(Wake::Reload)
        } else {
            None
        }
    }
}

impl Default for LoopControl {
    fn default() -> Self {
        Self::new()
    }
}
