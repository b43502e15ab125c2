//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → build services → Registry
//!
//! Run (orchestrator.rs):
//!     Registry → start() every service concurrently
//!         → trigger (signal, start failure, all starts returned)
//!         → stop() every service concurrently
//!         → join everything → first error wins
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → ShutdownHandle::trigger_shutdown (once)
//! ```
//!
//! # Design Decisions
//! - Services are peers: no start or stop ordering between them
//! - Every registered service is stopped exactly once per run, even after a failure
//! - Shutdown deadline is opt-in; by default stop() is trusted to return

pub mod orchestrator;
pub mod registry;
pub mod service;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use orchestrator::{Orchestrator, Phase, RunError, RunState, ShutdownHandle};
pub use registry::Registry;
pub use service::{Service, ServiceError, ServiceRef};
pub use shutdown::StopLatch;
pub use signals::SignalBridge;
