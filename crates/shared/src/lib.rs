//! # ROLESYNC Shared
//!
//! Common types used across all ROLESYNC crates: roles and domains, the
//! per-domain record schemas, layered configuration, errors and the time
//! source port.

pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod role;

// Re-exports
pub use clock::*;
pub use config::*;
pub use error::*;
pub use model::*;
pub use role::*;
