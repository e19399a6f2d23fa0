// src/server/drain.rs

//! Drain bookkeeping: the per-cycle shutdown report and the "drain complete"
//! notification handed out to callers.

use std::time::Duration;
use tokio::sync::watch;

/// Summary of how a serve cycle wound down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Connections that finished on their own within the grace timeout.
    pub drained: usize,
    /// Connections still open when the grace timeout ran out, aborted.
    pub force_closed: usize,
    /// Time spent between closing the listener and the last connection ending.
    pub elapsed: Duration,
}

/// Latest published state: how many cycles finished and how the last one went.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DrainProgress {
    pub completed: u64,
    pub last: ShutdownReport,
}

/// Resolves once the serve cycle that is running (or the next one to start)
/// has closed its listener and drained its connections.
///
/// Obtained from [`GracefulServer::stop_signal`](super::GracefulServer::stop_signal).
/// It is independent of the start call returning, so a task other than the
/// one running the accept loop can wait for the drain.
pub struct StopSignal {
    rx: watch::Receiver<DrainProgress>,
    after: u64,
}

impl StopSignal {
    pub(crate) fn new(rx: watch::Receiver<DrainProgress>) -> Self {
        let after = rx.borrow().completed;
        Self { rx, after }
    }

    /// Waits for the drain. Returns `None` if the server was dropped first.
    pub async fn wait(mut self) -> Option<ShutdownReport> {
        let after = self.after;
        self.rx
            .wait_for(|progress| progress.completed > after)
            .await
            .ok()
            .map(|progress| progress.last)
    }
}
