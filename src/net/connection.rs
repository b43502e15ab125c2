//! Tunnel lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique tunnel IDs for tracing
//! - Count active and total tunnels
//! - Let the listener wait for tunnels to drain on shutdown

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::observability::metrics;

/// Global atomic counter for tunnel IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static TUNNEL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TunnelId(u64);

impl TunnelId {
    /// Generate a new unique tunnel ID.
    pub fn new() -> Self {
        Self(TUNNEL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TunnelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TunnelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tunnel-{}", self.0)
    }
}

/// Tracks active tunnels for graceful shutdown and status reporting.
///
/// Cheap to clone; all clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct TunnelTracker {
    active: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
}

impl TunnelTracker {
    /// Create a new tunnel tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active tunnel. Returns a guard that decrements on drop.
    pub fn track(&self) -> TunnelGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::Relaxed);
        metrics::record_tunnel_opened();
        TunnelGuard {
            active: Arc::clone(&self.active),
            id: TunnelId::new(),
        }
    }

    /// Current active tunnel count.
    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Tunnels accepted since start.
    pub fn total_count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Wait until all tunnels are closed.
    pub async fn wait_for_drain(&self) {
        while self.active.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// Guard that tracks a tunnel's lifetime.
/// Decrements the active count when dropped.
#[derive(Debug)]
pub struct TunnelGuard {
    active: Arc<AtomicU64>,
    id: TunnelId,
}

impl TunnelGuard {
    /// Get this tunnel's ID.
    pub fn id(&self) -> TunnelId {
        self.id
    }
}

impl Drop for TunnelGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        metrics::record_tunnel_closed();
        tracing::trace!(tunnel_id = %self.id, "Tunnel closed");
    }
}
