//! # ROLESYNC Facade
//!
//! Per-role entry point. A `SyncContext` holds the state shared by all
//! roles; each `SyncFacade` is a cheap handle binding that context to one
//! role.

mod context;
mod facade;

pub use context::SyncContext;
pub use facade::{MutationOutcome, NotificationFeed, NotifyOutcome, SyncFacade};

// Re-exported for callers that only depend on this crate
pub use cache::PerformanceSnapshot;
pub use scheduler::Heartbeat;
