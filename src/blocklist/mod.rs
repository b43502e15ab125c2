//! Destination blocking.
//!
//! # Data Flow
//! ```text
//! --block-* sources (http(s) URL or absolute path)
//!     → source.rs (fetch text)
//!     → rules.rs (DomainSet, CidrSet)
//!     → BlockList, published through ArcSwap
//!     → read lock-free by every tunnel before dialing
//!
//! With --update-list-interval:
//!     updater.rs reloads on a timer; a failed reload keeps the old list
//! ```
//!
//! # Design Decisions
//! - Initial load happens at startup and is fatal on failure
//! - GeoIP codes are carried but need a GeoIP database to take effect

pub mod rules;
pub mod source;
pub mod updater;

pub use rules::{BlockList, BlockReason, Cidr, CidrSet, DomainSet, IpFamily};
pub use source::{ListError, ListSource};
pub use updater::{BlockListLoader, BlockListUpdater, SharedBlockList};
