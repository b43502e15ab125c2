//! WebSocket tunnel proxy library.

// Core subsystems
pub mod config;
pub mod net;
pub mod tunnel;
pub mod upstream;

// Traffic policy
pub mod blocklist;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ServerConfig;
pub use lifecycle::{Orchestrator, Registry, RunError, Service, ServiceError, ShutdownHandle};
pub use tunnel::TunnelServer;
