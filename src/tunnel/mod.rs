//! WebSocket tunnels.
//!
//! # Data Flow
//! ```text
//! HTTP upgrade on the configured path
//!     → server.rs (bearer auth, capacity permit, upgrade)
//!     → session.rs (text frame "host:port" → block check → dial → "ok")
//!     → relay.rs (binary frames ⇄ TCP bytes until either side ends)
//! ```
//!
//! # Design Decisions
//! - Listener and every session watch the same stop latch
//! - `start` returns only after all sessions have closed
//! - Rejections after the upgrade are reported as WebSocket close codes:
//!   1008 for bad or blocked targets, 1011 for dial failures, 1001 on shutdown

pub mod relay;
pub mod server;
pub mod session;

pub use relay::{RelayEnd, RelaySummary};
pub use server::TunnelServer;
pub use session::{SessionError, TunnelContext, READY};
