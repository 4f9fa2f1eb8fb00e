//! Configuration types for ROLESYNC
//!
//! Configuration is layered: environment defaults, then an optional YAML
//! file, then an optional JSON preference blob. Each layer only needs to
//! name the fields it overrides.

use crate::error::ConfigValidationError;
use crate::role::{DataDomain, Role};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Lowest accepted per-role sync interval
pub const MIN_SYNC_INTERVAL_MS: u64 = 100;

/// Lowest accepted heartbeat period
pub const MIN_HEARTBEAT_MS: u64 = 10;

/// Environment variable selecting the default layer
pub const ENV_VAR: &str = "ROLESYNC_ENV";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    /// Read from `ROLESYNC_ENV`, falling back to development
    pub fn from_env() -> Self {
        std::env::var(ENV_VAR)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(format!("Unknown environment '{}'", other)),
        }
    }
}

/// Per-role sync behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSyncConfig {
    /// How often the scheduler forces this role's views to resync
    pub sync_interval_ms: u64,

    /// Apply a batch of mutations before invalidating once
    #[serde(default)]
    pub batch_mutations: bool,

    /// Push accepted notifications to live subscribers
    #[serde(default = "default_true")]
    pub realtime_notifications: bool,
}

fn default_true() -> bool {
    true
}

impl RoleSyncConfig {
    pub fn new(sync_interval_ms: u64) -> Self {
        Self {
            sync_interval_ms,
            batch_mutations: false,
            realtime_notifications: true,
        }
    }

    pub fn batched(mut self) -> Self {
        self.batch_mutations = true;
        self
    }

    pub fn without_realtime(mut self) -> Self {
        self.realtime_notifications = false;
        self
    }
}

/// Per-domain view limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainConfig {
    /// Lifetime of a cached view
    pub ttl_ms: u64,

    /// Upper bound on records in a filtered view
    pub max_items: usize,

    /// How long records are retained before garbage collection
    pub retention_secs: u64,

    /// Inventory only: quantity at or below which an item is flagged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_stock_threshold: Option<u32>,
}

impl DomainConfig {
    pub fn new(ttl_ms: u64, max_items: usize, retention_secs: u64) -> Self {
        Self {
            ttl_ms,
            max_items,
            retention_secs,
            low_stock_threshold: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Soft cap on cached views
    pub max_entries: usize,
}

/// Complete runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    pub environment: Environment,

    /// Scheduler wake-up period; must be finer than every role interval
    pub heartbeat_ms: u64,

    pub roles: BTreeMap<Role, RoleSyncConfig>,

    pub domains: BTreeMap<DataDomain, DomainConfig>,

    pub cache: CacheConfig,

    /// Log permission denials at debug level
    #[serde(default)]
    pub debug_permissions: bool,
}

impl SyncConfig {
    /// Built-in defaults for an environment
    pub fn defaults(environment: Environment) -> Self {
        // Test intervals are a tenth of the live ones so timing tests stay fast.
        let scale = match environment {
            Environment::Test => 10,
            _ => 1,
        };

        let roles = BTreeMap::from([
            (Role::Owner, RoleSyncConfig::new(1_000 / scale)),
            (Role::Admin, RoleSyncConfig::new(2_000 / scale).batched()),
            (Role::Baker, RoleSyncConfig::new(3_000 / scale).batched()),
            (Role::Waiter, RoleSyncConfig::new(5_000 / scale)),
            (Role::Employee, RoleSyncConfig::new(5_000 / scale)),
            (Role::Customer, RoleSyncConfig::new(10_000 / scale).without_realtime()),
        ]);

        let day = 24 * 60 * 60;
        let mut inventory = DomainConfig::new(60_000, 200, 30 * day);
        inventory.low_stock_threshold = Some(5);

        let domains = BTreeMap::from([
            (DataDomain::Orders, DomainConfig::new(30_000, 50, day)),
            (DataDomain::Inventory, inventory),
            (DataDomain::Tables, DomainConfig::new(30_000, 100, day)),
            (DataDomain::Notifications, DomainConfig::new(15_000, 100, day)),
            (DataDomain::Financial, DomainConfig::new(60_000, 500, 365 * day)),
            (DataDomain::Production, DomainConfig::new(30_000, 100, 7 * day)),
            (DataDomain::Reports, DomainConfig::new(60_000, 20, day)),
        ]);

        Self {
            environment,
            heartbeat_ms: 500 / scale,
            roles,
            domains,
            cache: CacheConfig {
                max_entries: match environment {
                    Environment::Production => 1_024,
                    _ => 256,
                },
            },
            debug_permissions: environment == Environment::Development,
        }
    }

    /// Settings for a role. Roles missing from the table get the slowest profile.
    pub fn role(&self, role: Role) -> RoleSyncConfig {
        self.roles
            .get(&role)
            .cloned()
            .unwrap_or_else(|| RoleSyncConfig::new(self.slowest_interval_ms()).without_realtime())
    }

    /// Settings for a domain, falling back to the environment default
    pub fn domain(&self, domain: DataDomain) -> DomainConfig {
        self.domains
            .get(&domain)
            .cloned()
            .or_else(|| Self::defaults(self.environment).domains.remove(&domain))
            .unwrap_or_else(|| DomainConfig::new(30_000, 50, 24 * 60 * 60))
    }

    pub fn fastest_interval_ms(&self) -> Option<u64> {
        self.roles.values().map(|r| r.sync_interval_ms).min()
    }

    fn slowest_interval_ms(&self) -> u64 {
        self.roles
            .values()
            .map(|r| r.sync_interval_ms)
            .max()
            .unwrap_or(10_000)
    }

    /// Check every invariant; the first violation is reported
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.heartbeat_ms < MIN_HEARTBEAT_MS {
            return Err(ConfigValidationError::new(
                "heartbeatMs",
                format!("{}ms is below the {}ms floor", self.heartbeat_ms, MIN_HEARTBEAT_MS),
            ));
        }

        for role in Role::all() {
            let cfg = self.roles.get(role).ok_or_else(|| {
                ConfigValidationError::new(format!("roles.{}", role), "missing role settings")
            })?;
            if cfg.sync_interval_ms < MIN_SYNC_INTERVAL_MS {
                return Err(ConfigValidationError::new(
                    format!("roles.{}.syncIntervalMs", role),
                    format!(
                        "{}ms is below the {}ms floor",
                        cfg.sync_interval_ms, MIN_SYNC_INTERVAL_MS
                    ),
                ));
            }
            if self.heartbeat_ms >= cfg.sync_interval_ms {
                return Err(ConfigValidationError::new(
                    "heartbeatMs",
                    format!(
                        "{}ms heartbeat is not finer than the {}ms interval of '{}'",
                        self.heartbeat_ms, cfg.sync_interval_ms, role
                    ),
                ));
            }
        }

        for domain in DataDomain::all() {
            let cfg = self.domains.get(domain).ok_or_else(|| {
                ConfigValidationError::new(format!("domains.{}", domain), "missing domain settings")
            })?;
            if cfg.ttl_ms == 0 {
                return Err(ConfigValidationError::new(
                    format!("domains.{}.ttlMs", domain),
                    "TTL must be positive",
                ));
            }
            if cfg.max_items == 0 {
                return Err(ConfigValidationError::new(
                    format!("domains.{}.maxItems", domain),
                    "must allow at least one item",
                ));
            }
        }

        if self.cache.max_entries == 0 {
            return Err(ConfigValidationError::new(
                "cache.maxEntries",
                "must allow at least one entry",
            ));
        }

        Ok(())
    }

    /// Overlay a partial document onto this configuration
    pub fn merged_with(&self, overlay: serde_json::Value) -> Result<Self, ConfigValidationError> {
        let mut base = serde_json::to_value(self)
            .map_err(|e| ConfigValidationError::new("<root>", e.to_string()))?;
        merge_values(&mut base, overlay);
        serde_json::from_value(base).map_err(|e| ConfigValidationError::new("<overlay>", e.to_string()))
    }

    /// Overlay a YAML document
    pub fn merged_with_yaml(&self, yaml: &str) -> Result<Self, ConfigValidationError> {
        if yaml.trim().is_empty() {
            return Ok(self.clone());
        }
        let overlay: serde_json::Value = serde_yaml::from_str(yaml)
            .map_err(|e| ConfigValidationError::new("<yaml>", e.to_string()))?;
        if overlay.is_null() {
            return Ok(self.clone());
        }
        self.merged_with(overlay)
    }

    /// Overlay a persisted JSON preference blob
    pub fn merged_with_preferences(&self, json: &str) -> Result<Self, ConfigValidationError> {
        let overlay: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| ConfigValidationError::new("<preferences>", e.to_string()))?;
        self.merged_with(overlay)
    }

    pub fn to_yaml(&self) -> crate::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::defaults(Environment::default())
    }
}

/// Recursive object merge; non-object values in `overlay` replace `base`
fn merge_values(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Builds a `SyncConfig` from its layers
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    environment: Environment,
    file: Option<PathBuf>,
    preferences: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            file: None,
            preferences: None,
        }
    }

    /// Builder: YAML overrides file
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Builder: JSON preference blob; a missing file is skipped
    pub fn with_preferences(mut self, path: impl Into<PathBuf>) -> Self {
        self.preferences = Some(path.into());
        self
    }

    /// Resolve all layers and validate the result
    pub fn load(&self) -> crate::Result<SyncConfig> {
        let mut config = SyncConfig::defaults(self.environment);

        if let Some(path) = &self.file {
            let content = std::fs::read_to_string(path)?;
            config = config.merged_with_yaml(&content)?;
        }

        if let Some(path) = &self.preferences {
            if let Some(content) = read_optional(path)? {
                config = config.merged_with_preferences(&content)?;
            }
        }

        config.validate()?;
        Ok(config)
    }
}

fn read_optional(path: &Path) -> std::io::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Holds the active configuration.
///
/// Updates are validated first; a rejected update leaves the last
/// known-good configuration in place.
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<SyncConfig>,
    revision: RwLock<u64>,
}

impl ConfigStore {
    pub fn new(config: SyncConfig) -> Result<Self, ConfigValidationError> {
        config.validate()?;
        Ok(Self {
            current: RwLock::new(config),
            revision: RwLock::new(0),
        })
    }

    /// Snapshot of the active configuration
    pub fn current(&self) -> SyncConfig {
        self.current
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Number of accepted updates since construction
    pub fn revision(&self) -> u64 {
        self.revision.read().map(|r| *r).unwrap_or_else(|p| *p.into_inner())
    }

    pub fn update(&self, config: SyncConfig) -> Result<(), ConfigValidationError> {
        config.validate()?;
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = config;
        let mut revision = self
            .revision
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *revision += 1;
        Ok(())
    }
}
