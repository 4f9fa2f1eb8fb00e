//! # ROLESYNC Cache
//!
//! Memoization of filtered per-role views.
//!
//! Entries expire on whichever comes first: their TTL, or an invalidation
//! of any tag they carry.

mod memo_cache;
mod stats;

pub use memo_cache::{CacheKey, CacheTag, MemoizationCache, TagInvalidator};
pub use stats::PerformanceSnapshot;
