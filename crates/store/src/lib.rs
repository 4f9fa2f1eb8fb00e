//! # ROLESYNC Store
//!
//! The data store the sync layer wraps.
//!
//! `DataStore` is the port: what the sync layer needs from whatever owns
//! the business data. `InMemoryStore` is the in-process adapter.

mod in_memory;
mod op;

pub use in_memory::InMemoryStore;
pub use op::StoreOp;

use chrono::{DateTime, Utc};
use shared::{DataDomain, DomainData, StoreError};

/// Data Store Trait
///
/// Every successful `apply` must bump `version` for the domain it touched;
/// the sync layer uses versions as cache fingerprints.
pub trait DataStore: Send + Sync {
    /// Full, unfiltered collection for a stored domain.
    /// Derived domains (reports) yield an empty collection.
    fn snapshot(&self, domain: DataDomain) -> Result<DomainData, StoreError>;

    /// Monotonic change counter for a domain
    fn version(&self, domain: DataDomain) -> u64;

    /// Apply a primitive mutation
    fn apply(&self, op: StoreOp) -> Result<(), StoreError>;

    /// Delete notifications created before `older_than`; returns how many
    fn purge_notifications(&self, older_than: DateTime<Utc>) -> Result<usize, StoreError>;
}
