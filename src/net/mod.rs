//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured address
//!     → listener.rs (bind, bind errors become start failures)
//!     → [tunnel / profiling HTTP servers]
//!     → connection.rs (tunnel IDs, active counts, drain on shutdown)
//!
//! Client-supplied "host:port"
//!     → target.rs (parse, validate)
//!     → [blocklist check, upstream dial]
//! ```

pub mod connection;
pub mod listener;
pub mod target;

pub use connection::{TunnelGuard, TunnelId, TunnelTracker};
pub use target::{Target, TargetError};
