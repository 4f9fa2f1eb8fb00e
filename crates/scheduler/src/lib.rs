//! # ROLESYNC Scheduler
//!
//! Bounds the staleness of cached views: every role's watched domains are
//! invalidated once its configured interval elapses, checked on a fixed
//! heartbeat finer than the fastest interval.

mod heartbeat;
mod sync_scheduler;

pub use heartbeat::{Heartbeat, TickListener};
pub use sync_scheduler::{SyncPhase, SyncScheduler, SyncState, TickReport};
