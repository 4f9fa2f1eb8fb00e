//! SyncContext - shared state behind every role facade
//!
//! One context per running system. It owns the permission registry, the
//! memoization cache, the scheduler and the data store handle, and it is
//! passed explicitly into each `SyncFacade`.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use cache::{CacheKey, CacheTag, MemoizationCache, PerformanceSnapshot};
use chrono::{DateTime, TimeDelta, Utc};
use rbac::{FilterEngine, FilterSettings, PermissionRegistry};
use scheduler::{Heartbeat, SyncScheduler, TickListener, TickReport};
use shared::{
    ConfigStore, DataDomain, DomainData, Notification, PermissionDenied, ReportEntry, Result,
    Role, RoleSyncConfig, SyncConfig, SystemTimeSource, TimeSource,
};
use store::DataStore;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::facade::SyncFacade;

const NOTIFICATION_CHANNEL_CAPACITY: usize = 256;

/// Settings derived from the current configuration, swapped as a unit
struct ActiveSettings {
    filter: FilterEngine,
    ttls: BTreeMap<DataDomain, Duration>,
    roles: BTreeMap<Role, RoleSyncConfig>,
    notification_retention_secs: u64,
    debug_permissions: bool,
}

impl ActiveSettings {
    fn from_config(config: &SyncConfig, registry: Arc<PermissionRegistry>) -> Self {
        Self {
            filter: FilterEngine::new(registry, FilterSettings::from_config(config)),
            ttls: DataDomain::all()
                .iter()
                .map(|&d| (d, Duration::from_millis(config.domain(d).ttl_ms)))
                .collect(),
            roles: Role::all().iter().map(|&r| (r, config.role(r))).collect(),
            notification_retention_secs: config.domain(DataDomain::Notifications).retention_secs,
            debug_permissions: config.debug_permissions,
        }
    }
}

/// Shared state for all facades of one system
pub struct SyncContext {
    config: ConfigStore,
    registry: Arc<PermissionRegistry>,
    settings: RwLock<Arc<ActiveSettings>>,
    cache: Arc<MemoizationCache<DomainData>>,
    scheduler: Arc<SyncScheduler>,
    store: Arc<dyn DataStore>,
    time: Arc<dyn TimeSource>,
    notifications: broadcast::Sender<Notification>,
    heartbeat_period: watch::Sender<Duration>,
}

impl SyncContext {
    /// Create a context reading wall-clock time
    pub fn new(config: SyncConfig, store: Arc<dyn DataStore>) -> Result<Arc<Self>> {
        Self::with_time_source(config, store, Arc::new(SystemTimeSource))
    }

    /// Create a context with an explicit time source
    pub fn with_time_source(
        config: SyncConfig,
        store: Arc<dyn DataStore>,
        time: Arc<dyn TimeSource>,
    ) -> Result<Arc<Self>> {
        Self::with_registry(config, store, time, Arc::new(PermissionRegistry::new()))
    }

    /// Create a context with a custom permission table
    pub fn with_registry(
        config: SyncConfig,
        store: Arc<dyn DataStore>,
        time: Arc<dyn TimeSource>,
        registry: Arc<PermissionRegistry>,
    ) -> Result<Arc<Self>> {
        let config_store = ConfigStore::new(config.clone())?;
        let settings = ActiveSettings::from_config(&config, registry.clone());
        let (notifications, _) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        let (heartbeat_period, _) = watch::channel(Duration::from_millis(config.heartbeat_ms));

        info!(
            environment = ?config.environment,
            heartbeat_ms = config.heartbeat_ms,
            "sync context created"
        );

        Ok(Arc::new(Self {
            config: config_store,
            registry,
            settings: RwLock::new(Arc::new(settings)),
            cache: Arc::new(MemoizationCache::new(config.cache.max_entries, time.clone())),
            scheduler: Arc::new(SyncScheduler::from_config(&config, time.clone())),
            store,
            time,
            notifications,
            heartbeat_period,
        }))
    }

    /// Facade bound to `role`
    pub fn facade(self: &Arc<Self>, role: Role) -> SyncFacade {
        SyncFacade::new(role, self.clone())
    }

    pub fn config(&self) -> SyncConfig {
        self.config.current()
    }

    pub fn config_revision(&self) -> u64 {
        self.config.revision()
    }

    pub fn registry(&self) -> &PermissionRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &MemoizationCache<DomainData> {
        &self.cache
    }

    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }

    pub fn store(&self) -> &dyn DataStore {
        self.store.as_ref()
    }

    pub fn performance(&self) -> PerformanceSnapshot {
        self.cache.performance()
    }

    /// Validate and apply a new configuration.
    ///
    /// On rejection the previous configuration stays in effect. On success
    /// intervals apply from the next tick, running heartbeats switch to the
    /// new period and every cached view is dropped, since limits and TTLs
    /// may have changed.
    pub fn update_config(&self, config: SyncConfig) -> Result<()> {
        if let Err(e) = self.config.update(config.clone()) {
            warn!(field = %e.field, reason = %e.reason, "configuration update rejected");
            return Err(e.into());
        }

        let settings = Arc::new(ActiveSettings::from_config(&config, self.registry.clone()));
        match self.settings.write() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
        self.scheduler.update_intervals(&config);
        self.heartbeat_period
            .send_replace(Duration::from_millis(config.heartbeat_ms));
        self.cache.set_max_entries(config.cache.max_entries);
        self.cache.clear();

        info!(revision = self.config.revision(), "configuration updated");
        Ok(())
    }

    /// Run one scheduler pass without a heartbeat
    pub fn tick(&self) -> TickReport {
        self.scheduler.tick(self.cache.as_ref())
    }

    /// Start the heartbeat at the configured period. Later configuration
    /// updates change the period of the running heartbeat.
    ///
    /// Post-tick work (notification retention and view warm-up) runs
    /// through this context. Must be called from within a tokio runtime.
    pub fn start_heartbeat(self: &Arc<Self>) -> Heartbeat {
        Heartbeat::spawn_tracking(
            self.scheduler.clone(),
            self.cache.clone(),
            self.heartbeat_period.subscribe(),
            Some(self.clone() as Arc<dyn TickListener>),
        )
    }

    /// Remove notifications older than the retention window, measured
    /// against the context's time source
    pub fn collect_garbage(&self) -> Result<usize> {
        let retention = self.active().notification_retention_secs;
        let now = i64::try_from(self.time.now_millis())
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis);
        let window = i64::try_from(retention).ok().and_then(TimeDelta::try_seconds);
        let cutoff = now
            .zip(window)
            .and_then(|(now, window)| now.checked_sub_signed(window));

        let Some(cutoff) = cutoff else {
            return Ok(0);
        };

        let removed = self.store.purge_notifications(cutoff)?;
        if removed > 0 {
            self.cache.invalidate(DataDomain::Notifications);
            debug!(removed, "expired notifications purged");
        }
        Ok(removed)
    }

    pub(crate) fn role_config(&self, role: Role) -> RoleSyncConfig {
        self.active()
            .roles
            .get(&role)
            .cloned()
            .unwrap_or_else(|| self.config.current().role(role))
    }

    pub(crate) fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub(crate) fn publish(&self, notification: Notification) {
        // No subscribers is not an error
        let _ = self.notifications.send(notification);
    }

    /// Log a permission denial when debug logging is enabled
    pub(crate) fn denied(&self, role: Role, action: &'static str, target: impl ToString) {
        if self.active().debug_permissions {
            let denial = PermissionDenied {
                role,
                action,
                target: target.to_string(),
            };
            debug!(%denial, "permission denied");
        }
    }

    /// The role's filtered view of `domain`, served from the cache when fresh
    pub(crate) fn view(&self, role: Role, domain: DataDomain) -> Result<DomainData> {
        if !self.registry.allows(role, domain) {
            self.denied(role, "read", domain);
            return Ok(DomainData::empty(domain));
        }

        let active = self.active();
        // Read the version before the data so a concurrent write can only
        // make the cached value older than its key, never newer.
        let key = CacheKey::new(role, domain, self.fingerprint(domain));
        let tags = view_tags(role, domain);
        let ttl = active.ttls.get(&domain).copied().unwrap_or_default();

        self.cache.try_get_or_compute(
            key,
            || {
                let collection = self.collection(domain)?;
                Ok(active.filter.filter(&collection, role, domain))
            },
            &tags,
            ttl,
        )
    }

    fn active(&self) -> Arc<ActiveSettings> {
        match self.settings.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn fingerprint(&self, domain: DataDomain) -> u64 {
        match domain {
            DataDomain::Reports => DataDomain::stored()
                .iter()
                .fold(0u64, |acc, &d| acc.wrapping_add(self.store.version(d))),
            _ => self.store.version(domain),
        }
    }

    fn collection(&self, domain: DataDomain) -> Result<DomainData> {
        match domain {
            DataDomain::Reports => {
                let entries = DataDomain::stored()
                    .iter()
                    .map(|&d| self.store.snapshot(d).map(|data| ReportEntry::summarize(&data)))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(DomainData::Reports(entries))
            }
            _ => Ok(self.store.snapshot(domain)?),
        }
    }
}

/// Tags carried by a cached view
fn view_tags(role: Role, domain: DataDomain) -> Vec<CacheTag> {
    let mut tags = vec![CacheTag::Domain(domain), CacheTag::RoleDomain(role, domain)];
    if domain == DataDomain::Reports {
        tags.extend(DataDomain::stored().iter().map(|&d| CacheTag::Domain(d)));
    }
    tags
}

impl TickListener for SyncContext {
    /// Purge expired notifications, then refetch every view the tick
    /// invalidated. A failure for one view does not stop the others.
    fn on_tick(&self, report: &TickReport) -> Result<()> {
        if let Err(e) = self.collect_garbage() {
            warn!(error = %e, "notification retention pass failed");
        }

        for &(role, domain) in &report.synced {
            if let Err(e) = self.view(role, domain) {
                warn!(%role, %domain, error = %e, "view refresh failed");
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("config_revision", &self.config.revision())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use shared::{
        ConfigValidationError, Environment, ManualTimeSource, NotificationCategory, Order,
        Priority, SyncError,
    };
    use store::{InMemoryStore, StoreOp};

    fn context_with(store: InMemoryStore) -> (Arc<SyncContext>, Arc<ManualTimeSource>) {
        let time = Arc::new(ManualTimeSource::new(0));
        let ctx = SyncContext::with_time_source(
            SyncConfig::defaults(Environment::Test),
            Arc::new(store),
            time.clone(),
        )
        .unwrap();
        (ctx, time)
    }

    // ============== Construction Tests ==============

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let mut config = SyncConfig::defaults(Environment::Test);
        config.heartbeat_ms = 5;

        let err = SyncContext::new(config, Arc::new(InMemoryStore::new())).unwrap_err();
        assert!(matches!(err, SyncError::Config(ConfigValidationError { .. })));
    }

    #[test]
    fn test_contexts_are_independent() {
        let (first, _) = context_with(InMemoryStore::new());
        let (second, _) = context_with(InMemoryStore::new());

        first.view(Role::Owner, DataDomain::Orders).unwrap();

        assert_eq!(first.cache().len(), 1);
        assert!(second.cache().is_empty());
    }

    // ============== Config Update Tests ==============

    #[test]
    fn test_rejected_update_keeps_last_known_good() {
        let (ctx, _) = context_with(InMemoryStore::new());
        let mut bad = ctx.config();
        bad.domains.get_mut(&DataDomain::Orders).unwrap().ttl_ms = 0;

        assert!(ctx.update_config(bad).is_err());
        assert_eq!(ctx.config_revision(), 0);
        assert_eq!(ctx.config().domain(DataDomain::Orders).ttl_ms, 30_000);
    }

    #[test]
    fn test_update_applies_intervals_and_clears_cache() {
        let (ctx, _) = context_with(InMemoryStore::new());
        ctx.view(Role::Owner, DataDomain::Orders).unwrap();
        assert_eq!(ctx.cache().len(), 1);

        let mut config = ctx.config();
        config.roles.get_mut(&Role::Owner).unwrap().sync_interval_ms = 400;
        ctx.update_config(config).unwrap();

        assert!(ctx.cache().is_empty());
        assert_eq!(ctx.scheduler().interval_ms(Role::Owner), Some(400));
        assert_eq!(ctx.config_revision(), 1);
    }

    #[test]
    fn test_update_changes_filter_limits() {
        let orders: Vec<Order> = (0..5)
            .map(|i| Order::new(format!("o-{i}"), vec![]))
            .collect();
        let (ctx, _) = context_with(InMemoryStore::new().with_records(DomainData::Orders(orders)));
        assert_eq!(ctx.view(Role::Owner, DataDomain::Orders).unwrap().len(), 5);

        let mut config = ctx.config();
        config.domains.get_mut(&DataDomain::Orders).unwrap().max_items = 2;
        ctx.update_config(config).unwrap();

        assert_eq!(ctx.view(Role::Owner, DataDomain::Orders).unwrap().len(), 2);
    }

    // ============== Reports Tests ==============

    #[test]
    fn test_reports_follow_store_changes() {
        let (ctx, _) = context_with(InMemoryStore::new());
        let before = ctx.view(Role::Owner, DataDomain::Reports).unwrap();
        let orders_before = before
            .as_reports()
            .unwrap()
            .iter()
            .find(|e| e.domain == DataDomain::Orders)
            .unwrap()
            .record_count;
        assert_eq!(orders_before, 0);

        ctx.store()
            .apply(StoreOp::AddOrder(Order::new("o-1", vec![])))
            .unwrap();

        let after = ctx.view(Role::Owner, DataDomain::Reports).unwrap();
        let entry = after
            .as_reports()
            .unwrap()
            .iter()
            .find(|e| e.domain == DataDomain::Orders)
            .unwrap()
            .clone();
        assert_eq!(entry.record_count, 1);
        assert_eq!(entry.open_count, 1);
    }

    #[test]
    fn test_reports_scoped_to_role() {
        let (ctx, _) = context_with(InMemoryStore::new());
        let baker = ctx.view(Role::Baker, DataDomain::Reports).unwrap();
        let domains: Vec<DataDomain> = baker.as_reports().unwrap().iter().map(|e| e.domain).collect();

        assert_eq!(domains, vec![DataDomain::Inventory, DataDomain::Production]);
        assert!(ctx.view(Role::Waiter, DataDomain::Reports).unwrap().is_empty());
    }

    // ============== Retention Tests ==============

    #[test]
    fn test_collect_garbage_purges_expired_notifications() {
        let now = Utc::now();
        let store = InMemoryStore::new().with_records(DomainData::Notifications(vec![
            Notification::new(NotificationCategory::Orders, Priority::Low, "stale")
                .created_at(now - ChronoDuration::days(2)),
            Notification::new(NotificationCategory::Orders, Priority::Low, "fresh")
                .created_at(now),
        ]));
        let (ctx, time) = context_with(store);
        time.set(now.timestamp_millis() as u64);
        assert_eq!(ctx.view(Role::Owner, DataDomain::Notifications).unwrap().len(), 2);

        assert_eq!(ctx.collect_garbage().unwrap(), 1);

        let remaining = ctx.view(Role::Owner, DataDomain::Notifications).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining.as_notifications().unwrap()[0].message, "fresh");
    }

    #[test]
    fn test_retention_follows_time_source() {
        let now = Utc::now();
        let store = InMemoryStore::new().with_records(DomainData::Notifications(vec![
            Notification::new(NotificationCategory::System, Priority::Low, "today").created_at(now),
        ]));
        let (ctx, time) = context_with(store);
        time.set(now.timestamp_millis() as u64);
        assert_eq!(ctx.collect_garbage().unwrap(), 0);

        // Default notification retention is one day
        time.advance(25 * 60 * 60 * 1000);
        assert_eq!(ctx.collect_garbage().unwrap(), 1);
        assert!(ctx.view(Role::Owner, DataDomain::Notifications).unwrap().is_empty());
    }

    // ============== Tick Listener Tests ==============

    #[test]
    fn test_tick_refreshes_invalidated_views() {
        let (ctx, time) = context_with(InMemoryStore::new());
        ctx.view(Role::Owner, DataDomain::Orders).unwrap();
        let misses = ctx.performance().misses;

        time.advance(100);
        let report = ctx.tick();
        assert!(report.synced.contains(&(Role::Owner, DataDomain::Orders)));

        ctx.on_tick(&report).unwrap();
        assert!(ctx.performance().misses > misses);

        // The warmed view is served without another compute
        let recomputes = ctx.performance().recompute_count;
        ctx.view(Role::Owner, DataDomain::Orders).unwrap();
        assert_eq!(ctx.performance().recompute_count, recomputes);
    }

    #[test]
    fn test_tick_skips_denied_views() {
        let (ctx, time) = context_with(InMemoryStore::new());
        time.advance(1000);
        let report = ctx.tick();
        assert!(report.synced.contains(&(Role::Customer, DataDomain::Inventory)));

        ctx.on_tick(&report).unwrap();

        // Only permitted views are warmed; customers have no inventory view
        let permitted = report
            .synced
            .iter()
            .filter(|(role, domain)| ctx.registry().allows(*role, *domain))
            .count();
        assert!(permitted < report.synced.len());
        assert_eq!(ctx.cache().len(), permitted);
    }

    // ============== Heartbeat Tests ==============

    #[tokio::test]
    async fn test_heartbeat_uses_configured_period() {
        let ctx = SyncContext::new(
            SyncConfig::defaults(Environment::Test),
            Arc::new(InMemoryStore::new()),
        )
        .unwrap();

        let mut heartbeat = ctx.start_heartbeat();
        assert_eq!(heartbeat.period(), Duration::from_millis(50));
        assert!(heartbeat.is_running());

        heartbeat.stop().await;
        assert!(!heartbeat.is_running());
    }

    #[tokio::test]
    async fn test_config_update_retunes_running_heartbeat() {
        let ctx = SyncContext::new(
            SyncConfig::defaults(Environment::Development),
            Arc::new(InMemoryStore::new()),
        )
        .unwrap();
        let mut heartbeat = ctx.start_heartbeat();
        assert_eq!(heartbeat.period(), Duration::from_millis(500));

        let mut config = ctx.config();
        config.heartbeat_ms = 20;
        for role in config.roles.values_mut() {
            role.sync_interval_ms = 100;
        }
        ctx.update_config(config).unwrap();

        tokio::time::sleep(Duration::from_millis(1_200)).await;
        heartbeat.stop().await;

        assert_eq!(heartbeat.period(), Duration::from_millis(20));
        // Forced syncs are at most one interval plus one heartbeat apart
        let owner = ctx.scheduler().state(Role::Owner).unwrap();
        assert!(owner.forced_syncs >= 6, "forced_syncs = {}", owner.forced_syncs);
    }

    #[tokio::test]
    async fn test_rejected_update_keeps_heartbeat_period() {
        let ctx = SyncContext::new(
            SyncConfig::defaults(Environment::Test),
            Arc::new(InMemoryStore::new()),
        )
        .unwrap();
        let mut heartbeat = ctx.start_heartbeat();

        let mut config = ctx.config();
        config.heartbeat_ms = 5_000;
        assert!(ctx.update_config(config).is_err());

        assert_eq!(heartbeat.period(), Duration::from_millis(50));
        heartbeat.stop().await;
    }
}
