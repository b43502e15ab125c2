//! Service abstraction.
//!
//! A [`Service`] is any unit of long-running work the orchestrator can start
//! and stop: the tunnel listener, the profiling endpoint, the block-list
//! updater.

use std::io;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;

/// Errors reported by a service's `start` or `stop`.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// A listener could not be bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// Address that was requested.
        address: String,
        #[source]
        source: io::Error,
    },

    /// I/O failure while serving.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Any other fatal condition.
    #[error("{0}")]
    Failed(String),
}

impl ServiceError {
    /// Build a [`ServiceError::Failed`] from a message.
    pub fn failed(message: impl Into<String>) -> Self {
        ServiceError::Failed(message.into())
    }

    /// Short stable label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::Bind { .. } => "service_bind",
            ServiceError::Io(_) => "service_io",
            ServiceError::Failed(_) => "service_failed",
        }
    }
}

/// An independently startable and stoppable unit of work.
///
/// # Contract
/// - `start` is called at most once per run and resolves only when the
///   service terminates: `Ok(())` after a requested stop, `Err` on a fatal
///   condition.
/// - `stop` may be called before, during or after `start`, any number of
///   times, from any task. It must make a pending `start` resolve in bounded
///   time.
///
/// Futures are boxed so services can be stored as `Arc<dyn Service>`.
pub trait Service: Send + Sync + 'static {
    /// Stable, human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Run the service until it is stopped or fails.
    fn start(&self) -> BoxFuture<'_, Result<(), ServiceError>>;

    /// Request the service to stop. Idempotent.
    fn stop(&self) -> BoxFuture<'_, Result<(), ServiceError>>;
}

/// Shared handle to a registered service.
pub type ServiceRef = Arc<dyn Service>;
