//! OS signal handling.
//!
//! # Responsibilities
//! - Register SIGINT and SIGTERM handlers (Ctrl-C on non-Unix)
//! - Turn the first signal into exactly one shutdown trigger
//! - Stop listening afterwards
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Once Tokio owns a signal, later deliveries are swallowed, so a second
//!   Ctrl-C neither re-enters shutdown nor kills the process mid-drain

use std::future::Future;
use std::io;

use tokio::task::JoinHandle;

use crate::lifecycle::orchestrator::ShutdownHandle;

/// Waits for a termination signal and returns its name.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    };
    Ok(name)
}

/// Waits for a termination signal and returns its name.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

/// Background task forwarding the first termination signal to the orchestrator.
///
/// The task is aborted when the bridge is dropped.
pub struct SignalBridge {
    task: JoinHandle<()>,
}

impl SignalBridge {
    /// Listen for OS termination signals.
    pub fn spawn(handle: ShutdownHandle) -> Self {
        Self::spawn_with(handle, wait_for_shutdown_signal())
    }

    /// Forward the completion of an arbitrary signal source.
    pub fn spawn_with<F>(handle: ShutdownHandle, signal: F) -> Self
    where
        F: Future<Output = io::Result<&'static str>> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            match signal.await {
                Ok(name) => {
                    tracing::info!(signal = name, "Shutdown signal received");
                    if !handle.trigger_shutdown() {
                        tracing::debug!("Shutdown already in progress");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install signal handlers");
                }
            }
        });
        Self { task }
    }

    /// Whether the bridge has stopped listening.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SignalBridge {
    fn drop(&mut self) {
        self.task.abort();
    }
}
