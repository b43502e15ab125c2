//! Multi-service orchestrator.
//!
//! # Responsibilities
//! - Start every registered service concurrently
//! - Turn the first trigger (signal, start failure, all starts returned) into one shutdown
//! - Fan out `stop()` to every service and join all start and stop tasks
//! - Aggregate outcomes: the first error observed wins
//!
//! # State Machine
//! ```text
//! Idle ──run()──▶ Running ──trigger / start failure / all starts returned──▶ ShuttingDown ──all joined──▶ Done
//! ```
//!
//! # Design Decisions
//! - The run state is one atomic; the trigger is a CAS, so the first caller wins
//! - Wake-ups go through a watch channel, so a trigger is never missed
//! - Panics inside a service are caught and reported as that service's error
//! - Optional shutdown deadline; without one, stop() is trusted to return

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time;

use crate::lifecycle::registry::Registry;
use crate::lifecycle::service::{ServiceError, ServiceRef};

/// Orchestrator run state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle = 0,
    Running = 1,
    ShuttingDown = 2,
    Done = 3,
}

impl From<u8> for RunState {
    fn from(val: u8) -> Self {
        match val {
            1 => RunState::Running,
            2 => RunState::ShuttingDown,
            3 => RunState::Done,
            _ => RunState::Idle,
        }
    }
}

/// Which half of a service an outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Stop,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Start => write!(f, "start"),
            Phase::Stop => write!(f, "stop"),
        }
    }
}

/// Aggregate outcome of a run.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RunError {
    /// A service's `start` returned an error.
    #[error("service `{service}` failed: {source}")]
    Start {
        service: String,
        #[source]
        source: ServiceError,
    },

    /// A service's `stop` returned an error.
    #[error("service `{service}` failed to stop: {source}")]
    Stop {
        service: String,
        #[source]
        source: ServiceError,
    },

    /// A service panicked inside `start` or `stop`.
    #[error("service `{service}` panicked during {phase}")]
    Panicked { service: String, phase: Phase },

    /// The configured shutdown deadline passed with tasks still running.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded { grace: Duration, stuck: Vec<String> },

    /// `run` was called a second time.
    #[error("orchestrator has already run")]
    AlreadyRan,
}

impl RunError {
    /// Short stable label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RunError::Start { .. } => "run_start_failed",
            RunError::Stop { .. } => "run_stop_failed",
            RunError::Panicked { .. } => "run_panicked",
            RunError::GraceExceeded { .. } => "run_grace_exceeded",
            RunError::AlreadyRan => "run_already_ran",
        }
    }

    /// The underlying service error, if there is one.
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            RunError::Start { source, .. } | RunError::Stop { source, .. } => Some(source),
            _ => None,
        }
    }
}

struct Inner {
    state: AtomicU8,
    started: AtomicBool,
    trigger: watch::Sender<bool>,
}

impl Inner {
    fn state(&self) -> RunState {
        RunState::from(self.state.load(Ordering::Acquire))
    }

    fn trigger_shutdown(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            match RunState::from(current) {
                RunState::Idle | RunState::Running => {
                    match self.state.compare_exchange_weak(
                        current,
                        RunState::ShuttingDown as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            self.trigger.send_replace(true);
                            return true;
                        }
                        Err(actual) => current = actual,
                    }
                }
                RunState::ShuttingDown | RunState::Done => return false,
            }
        }
    }

    fn finish(&self) {
        self.state.store(RunState::Done as u8, Ordering::Release);
    }
}

/// Cloneable handle for requesting shutdown from any task.
#[derive(Clone)]
pub struct ShutdownHandle {
    inner: Arc<Inner>,
}

impl ShutdownHandle {
    /// Request shutdown. Returns `true` only for the call that initiated it;
    /// every later call is a no-op.
    pub fn trigger_shutdown(&self) -> bool {
        self.inner.trigger_shutdown()
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.inner.state()
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("state", &self.state())
            .finish()
    }
}

/// Runs a [`Registry`] of services and coordinates their shutdown.
pub struct Orchestrator {
    inner: Arc<Inner>,
    shutdown_timeout: Option<Duration>,
}

impl Orchestrator {
    /// Create an idle orchestrator with no shutdown deadline.
    pub fn new() -> Self {
        let (trigger, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(RunState::Idle as u8),
                started: AtomicBool::new(false),
                trigger,
            }),
            shutdown_timeout: None,
        }
    }

    /// Bound the time between the stop fan-out and `run` returning.
    /// Tasks still running at the deadline are aborted.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Handle for triggering shutdown from other tasks.
    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.inner.state()
    }

    /// See [`ShutdownHandle::trigger_shutdown`].
    pub fn trigger_shutdown(&self) -> bool {
        self.inner.trigger_shutdown()
    }

    /// Run every registered service until shutdown.
    ///
    /// Returns once every `start` and every `stop` has returned, with the
    /// first error observed among them.
    pub async fn run(&self, registry: Registry) -> Result<(), RunError> {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(RunError::AlreadyRan);
        }

        let services = registry.into_services();
        if services.is_empty() {
            tracing::debug!("No services registered");
            self.inner.finish();
            return Ok(());
        }

        if self
            .inner
            .state
            .compare_exchange(
                RunState::Idle as u8,
                RunState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            tracing::info!("Shutdown requested before services started");
            self.inner.finish();
            return Ok(());
        }

        let mut trigger_rx = self.inner.trigger.subscribe();
        let mut tally = Tally::new(&services);

        tracing::info!(services = ?tally.names, "Starting services");
        let mut starts = JoinSet::new();
        for (id, service) in services.iter().enumerate() {
            starts.spawn(drive(id, Phase::Start, Arc::clone(service)));
        }

        loop {
            tokio::select! {
                biased;
                _ = triggered(&mut trigger_rx) => break,
                joined = starts.join_next() => match joined {
                    Some(joined) => {
                        if tally.record(joined) && self.inner.trigger_shutdown() {
                            tracing::warn!("Service failure triggered shutdown");
                        }
                    }
                    None => {
                        if self.inner.trigger_shutdown() {
                            tracing::info!("All services returned on their own");
                        }
                        break;
                    }
                },
            }
        }

        tracing::info!(services = services.len(), "Stopping services");
        let mut stops = JoinSet::new();
        for (id, service) in services.iter().enumerate() {
            tally.pending_stops.insert(id);
            stops.spawn(drive(id, Phase::Stop, Arc::clone(service)));
        }

        match self.shutdown_timeout {
            Some(grace) => {
                if time::timeout(grace, tally.drain(&mut starts, &mut stops))
                    .await
                    .is_err()
                {
                    let stuck = tally.stuck();
                    tracing::error!(grace = ?grace, stuck = ?stuck, "Shutdown deadline exceeded, aborting");
                    starts.abort_all();
                    stops.abort_all();
                    tally.push(RunError::GraceExceeded { grace, stuck });
                }
            }
            None => tally.drain(&mut starts, &mut stops).await,
        }

        self.inner.finish();
        tally.into_result()
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

async fn triggered(rx: &mut watch::Receiver<bool>) {
    // The sender is owned by the orchestrator, so this only resolves on a trigger.
    let _ = rx.wait_for(|fired| *fired).await;
}

struct Outcome {
    id: usize,
    phase: Phase,
    result: Result<Result<(), ServiceError>, ()>,
}

async fn drive(id: usize, phase: Phase, service: ServiceRef) -> Outcome {
    let call = async {
        match phase {
            Phase::Start => service.start().await,
            Phase::Stop => service.stop().await,
        }
    };
    let result = AssertUnwindSafe(call).catch_unwind().await.map_err(|_| ());
    Outcome { id, phase, result }
}

/// Bookkeeping for one run: which tasks are pending and the first error.
struct Tally {
    names: Vec<String>,
    pending_starts: BTreeSet<usize>,
    pending_stops: BTreeSet<usize>,
    first_error: Option<RunError>,
}

impl Tally {
    fn new(services: &[ServiceRef]) -> Self {
        Self {
            names: services.iter().map(|s| s.name().to_string()).collect(),
            pending_starts: (0..services.len()).collect(),
            pending_stops: BTreeSet::new(),
            first_error: None,
        }
    }

    /// Record one joined task. Returns `true` if it carried an error.
    fn record(&mut self, joined: Result<Outcome, JoinError>) -> bool {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "Service task ended abnormally");
                return false;
            }
        };

        match outcome.phase {
            Phase::Start => self.pending_starts.remove(&outcome.id),
            Phase::Stop => self.pending_stops.remove(&outcome.id),
        };
        let service = self.names[outcome.id].clone();

        let error = match outcome.result {
            Ok(Ok(())) => {
                tracing::debug!(service = %service, phase = %outcome.phase, "Service returned");
                return false;
            }
            Ok(Err(source)) => {
                tracing::error!(service = %service, phase = %outcome.phase, error = %source, "Service error");
                match outcome.phase {
                    Phase::Start => RunError::Start { service, source },
                    Phase::Stop => RunError::Stop { service, source },
                }
            }
            Err(()) => {
                tracing::error!(service = %service, phase = %outcome.phase, "Service panicked");
                RunError::Panicked {
                    service,
                    phase: outcome.phase,
                }
            }
        };
        self.push(error);
        true
    }

    fn push(&mut self, error: RunError) {
        if self.first_error.is_none() {
            self.first_error = Some(error);
        }
    }

    async fn drain(
        &mut self,
        starts: &mut JoinSet<Outcome>,
        stops: &mut JoinSet<Outcome>,
    ) {
        loop {
            tokio::select! {
                Some(joined) = starts.join_next() => {
                    self.record(joined);
                }
                Some(joined) = stops.join_next() => {
                    self.record(joined);
                }
                else => break,
            }
        }
    }

    fn stuck(&self) -> Vec<String> {
        self.pending_starts
            .union(&self.pending_stops)
            .map(|id| self.names[*id].clone())
            .collect()
    }

    fn into_result(self) -> Result<(), RunError> {
        match self.first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_state_from_u8() {
        assert_eq!(RunState::from(0), RunState::Idle);
        assert_eq!(RunState::from(1), RunState::Running);
        assert_eq!(RunState::from(2), RunState::ShuttingDown);
        assert_eq!(RunState::from(3), RunState::Done);
        assert_eq!(RunState::from(42), RunState::Idle);
    }

    #[test]
    fn first_trigger_wins() {
        let orchestrator = Orchestrator::new();
        let handle = orchestrator.handle();
        assert_eq!(handle.state(), RunState::Idle);

        assert!(handle.trigger_shutdown());
        assert!(!handle.trigger_shutdown());
        assert!(!orchestrator.trigger_shutdown());
        assert_eq!(orchestrator.state(), RunState::ShuttingDown);
    }

    #[test]
    fn first_error_is_kept() {
        let mut tally = Tally {
            names: vec!["a".into()],
            pending_starts: BTreeSet::new(),
            pending_stops: BTreeSet::new(),
            first_error: None,
        };
        tally.push(RunError::Start {
            service: "a".into(),
            source: ServiceError::failed("bind refused"),
        });
        tally.push(RunError::Stop {
            service: "a".into(),
            source: ServiceError::failed("late"),
        });

        let err = tally.into_result().unwrap_err();
        assert_eq!(err.as_label(), "run_start_failed");
        assert_eq!(err.service_error().unwrap().to_string(), "bind refused");
    }

    #[test]
    fn error_messages() {
        let err = RunError::Panicked {
            service: "tunnel".into(),
            phase: Phase::Stop,
        };
        assert_eq!(err.to_string(), "service `tunnel` panicked during stop");

        let err = RunError::Start {
            service: "tunnel".into(),
            source: ServiceError::failed("bind refused"),
        };
        assert_eq!(err.to_string(), "service `tunnel` failed: bind refused");
    }
}
