//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → profiling.rs (/debug/status, /debug/metrics scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics recorder installed only when the profiling endpoint is enabled
//! - Every tunnel runs inside a span carrying its tunnel ID and peer

pub mod logging;
pub mod metrics;
pub mod profiling;

pub use profiling::{ProfilingService, StatusReport};
