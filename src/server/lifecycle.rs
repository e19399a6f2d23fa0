// src/server/lifecycle.rs

//! Defines `LifecycleState`, the lock-guarded "serving" flag of a server.

use parking_lot::Mutex;

/// A boolean serving/stopped flag that can be shared across threads.
///
/// Every access takes the same lock, and nothing blocking ever happens while it
/// is held, so readers always see the value of the most recent write.
#[derive(Debug, Default)]
pub struct LifecycleState {
    serving: Mutex<bool>,
}

impl LifecycleState {
    /// Creates a new state in the stopped position.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while the owning server is accepting connections.
    pub fn is_serving(&self) -> bool {
        *self.serving.lock()
    }

    /// Returns true when the owning server is not accepting connections.
    pub fn is_stopped(&self) -> bool {
        !self.is_serving()
    }

    /// Overwrites the flag.
    pub fn set_serving(&self, serving: bool) {
        *self.serving.lock() = serving;
    }

    /// Runs `f` with exclusive access to the flag, so a check and a change
    /// happen as one step.
    pub(crate) fn transition<R>(&self, f: impl FnOnce(&mut bool) -> R) -> R {
        let mut serving = self.serving.lock();
        f(&mut serving)
    }
}
