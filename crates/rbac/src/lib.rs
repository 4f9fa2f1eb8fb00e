//! # ROLESYNC RBAC
//!
//! Role-Based Access Control for ROLESYNC.
//!
//! ## Components
//!
//! - `PermissionRegistry` - Static role → capability table
//! - `FilterEngine` - Per-domain view predicates driven by the registry

pub mod filter_engine;
pub mod permission_registry;

pub use filter_engine::{FilterEngine, FilterSettings};
pub use permission_registry::{PermissionRegistry, PermissionSet};
