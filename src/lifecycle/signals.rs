//! OS signal handling.
//!
//! # Responsibilities
//! - Register SIGINT and SIGTERM handlers
//! - Translate signals into `ExternalInterrupt` on the orchestrator fan-in
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Every signal is forwarded; the orchestrator reads only the first
//! - Non-unix targets only get Ctrl-C

use std::fmt;

use tokio::task::JoinHandle;

use crate::lifecycle::orchestrator::InterruptHandle;

/// Which external interrupt was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptKind {
    /// SIGINT / Ctrl-C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl fmt::Display for InterruptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterruptKind::Interrupt => write!(f, "SIGINT"),
            InterruptKind::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Install the handlers and forward every signal to `handle`.
///
/// Handler installation happens before this returns, so a failure here is a
/// startup error rather than a silent loss of shutdown handling.
#[cfg(unix)]
pub fn listen(handle: InterruptHandle) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        loop {
            let kind = tokio::select! {
                received = interrupt.recv() => match received {
                    Some(()) => InterruptKind::Interrupt,
                    None => break,
                },
                received = terminate.recv() => match received {
                    Some(()) => InterruptKind::Terminate,
                    None => break,
                },
            };

            tracing::info!(signal = %kind, "Signal received");
            if !handle.interrupt(kind) {
                tracing::debug!(signal = %kind, "Signal dropped, shutdown already underway");
            }
        }
    }))
}

#[cfg(not(unix))]
pub fn listen(handle: InterruptHandle) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(signal = %InterruptKind::Interrupt, "Signal received");
            handle.interrupt(InterruptKind::Interrupt);
        }
    }))
}
