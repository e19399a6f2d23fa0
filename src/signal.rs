// src/signal.rs

//! Waiting for the signals that ask a process to exit.

use std::fmt;
use std::io;
use tracing::info;

/// A termination request delivered to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitSignal {
    Hangup,
    Interrupt,
    Terminate,
    Quit,
}

impl fmt::Display for ExitSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitSignal::Hangup => "SIGHUP",
            ExitSignal::Interrupt => "SIGINT",
            ExitSignal::Terminate => "SIGTERM",
            ExitSignal::Quit => "SIGQUIT",
        };
        f.write_str(name)
    }
}

/// Waits for the first of SIGHUP, SIGINT, SIGTERM or SIGQUIT.
///
/// The handlers are installed when the future is first polled, so poll it
/// before the signal can arrive. Fails only if a handler cannot be registered.
#[cfg(unix)]
pub async fn wait_for_exit_signal() -> io::Result<ExitSignal> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let received = tokio::select! {
        _ = hangup.recv() => ExitSignal::Hangup,
        _ = interrupt.recv() => ExitSignal::Interrupt,
        _ = terminate.recv() => ExitSignal::Terminate,
        _ = quit.recv() => ExitSignal::Quit,
    };
    info!("{received} received.");
    Ok(received)
}

/// Waits for Ctrl-C, the only exit request available on this platform.
#[cfg(not(unix))]
pub async fn wait_for_exit_signal() -> io::Result<ExitSignal> {
    tokio::signal::ctrl_c().await?;
    info!("{} received.", ExitSignal::Interrupt);
    Ok(ExitSignal::Interrupt)
}

/// Waits for an exit signal and then calls `f` with it, once.
pub async fn before_exit<F>(f: F) -> io::Result<()>
where
    F: FnOnce(ExitSignal),
{
    let received = wait_for_exit_signal().await?;
    f(received);
    Ok(())
}
