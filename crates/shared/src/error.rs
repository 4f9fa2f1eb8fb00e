//! Error types for ROLESYNC

use crate::role::{DataDomain, Role};
use thiserror::Error;

/// A role touched a domain or category outside its profile.
///
/// Never surfaced to callers as a failure; used for debug logging.
#[derive(Debug, Clone, Error)]
#[error("Role '{role}' may not {action} '{target}'")]
pub struct PermissionDenied {
    pub role: Role,
    pub action: &'static str,
    pub target: String,
}

/// Configuration rejected at load or update time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid configuration at '{field}': {reason}")]
pub struct ConfigValidationError {
    pub field: String,
    pub reason: String,
}

impl ConfigValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by the backing data store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{domain} record '{id}' not found")]
    NotFound { domain: DataDomain, id: String },

    #[error("{domain} record '{id}' already exists")]
    Duplicate { domain: DataDomain, id: String },

    #[error("Store unavailable: {message}")]
    Unavailable { message: String },
}

/// General ROLESYNC error type
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    PermissionDenied(#[from] PermissionDenied),

    #[error(transparent)]
    Config(#[from] ConfigValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Operation targets '{actual}' but was submitted for '{expected}'")]
    DomainMismatch {
        expected: DataDomain,
        actual: DataDomain,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
