//! SyncFacade - the per-role entry point
//!
//! Every read goes through the permission registry and the memoization
//! cache; every write goes to the store and then invalidates the touched
//! domain, so a role always reads its own writes.

use std::sync::Arc;

use cache::PerformanceSnapshot;
use shared::{DataDomain, DomainData, Notification, Result, Role, SyncError};
use store::StoreOp;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::SyncContext;

/// Result of a permitted or refused write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Operations reached the store
    Applied { count: usize },
    /// The role may not write this domain; nothing was forwarded
    Denied,
}

impl MutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Delivered,
    /// Category outside the role's profile; not stored
    Dropped,
}

/// Data access for one role
#[derive(Debug, Clone)]
pub struct SyncFacade {
    role: Role,
    context: Arc<SyncContext>,
}

impl SyncFacade {
    pub fn new(role: Role, context: Arc<SyncContext>) -> Self {
        Self { role, context }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.context
    }

    /// The role's view of `domain`.
    ///
    /// Domains outside the role's profile yield an empty collection rather
    /// than an error.
    pub fn get_data(&self, domain: DataDomain) -> Result<DomainData> {
        self.context.view(self.role, domain)
    }

    /// Forward one operation to the store, then invalidate `domain`
    pub fn mutate(&self, domain: DataDomain, op: StoreOp) -> Result<MutationOutcome> {
        if !self.may_write(domain) {
            return Ok(MutationOutcome::Denied);
        }
        check_domain(domain, &op)?;

        self.context.store().apply(op)?;
        self.context.cache().invalidate(domain);
        Ok(MutationOutcome::Applied { count: 1 })
    }

    /// Forward several operations on one domain.
    ///
    /// Roles configured for batched mutations invalidate once after the
    /// whole batch; others invalidate after every operation. Operations
    /// are checked against `domain` before any is applied. If one fails,
    /// the ones before it stay applied and are still invalidated.
    pub fn mutate_batch(&self, domain: DataDomain, ops: Vec<StoreOp>) -> Result<MutationOutcome> {
        if !self.may_write(domain) {
            return Ok(MutationOutcome::Denied);
        }
        for op in &ops {
            check_domain(domain, op)?;
        }

        let batched = self.context.role_config(self.role).batch_mutations;
        let store = self.context.store();
        let cache = self.context.cache();
        let mut applied = 0;

        for op in ops {
            if let Err(e) = store.apply(op) {
                if batched && applied > 0 {
                    cache.invalidate(domain);
                }
                return Err(e.into());
            }
            applied += 1;
            if !batched {
                cache.invalidate(domain);
            }
        }

        if batched && applied > 0 {
            cache.invalidate(domain);
        }
        debug!(role = %self.role, %domain, applied, batched, "batch applied");
        Ok(MutationOutcome::Applied { count: applied })
    }

    /// Enqueue a notification for this role.
    ///
    /// Categories the role may not receive are dropped without being
    /// stored. Delivered notifications are also published to real-time
    /// subscribers.
    pub fn notify(&self, notification: Notification) -> Result<NotifyOutcome> {
        if !self
            .context
            .registry()
            .can_receive(self.role, notification.category)
        {
            self.context
                .denied(self.role, "receive", notification.category);
            return Ok(NotifyOutcome::Dropped);
        }

        self.context
            .store()
            .apply(StoreOp::AddNotification(notification.clone()))?;
        self.context.cache().invalidate(DataDomain::Notifications);
        self.context.publish(notification);
        Ok(NotifyOutcome::Delivered)
    }

    /// Mark a notification read. Only notifications in the role's own
    /// view can be marked.
    pub fn mark_notification_read(&self, id: Uuid) -> Result<MutationOutcome> {
        let visible = self
            .get_data(DataDomain::Notifications)?
            .as_notifications()
            .is_some_and(|list| list.iter().any(|n| n.id == id));
        if !visible {
            self.context.denied(self.role, "mark read", id);
            return Ok(MutationOutcome::Denied);
        }

        self.mutate(DataDomain::Notifications, StoreOp::MarkNotificationRead { id })
    }

    /// Live notification feed, or `None` when the role has real-time
    /// notifications turned off
    pub fn subscribe(&self) -> Option<NotificationFeed> {
        if !self.context.role_config(self.role).realtime_notifications {
            return None;
        }
        Some(NotificationFeed {
            role: self.role,
            receiver: self.context.subscribe_notifications(),
            context: self.context.clone(),
        })
    }

    pub fn performance(&self) -> PerformanceSnapshot {
        self.context.performance()
    }

    fn may_write(&self, domain: DataDomain) -> bool {
        // Reports are derived and never written directly
        let allowed = domain != DataDomain::Reports && self.context.registry().allows(self.role, domain);
        if !allowed {
            self.context.denied(self.role, "write", domain);
        }
        allowed
    }
}

fn check_domain(expected: DataDomain, op: &StoreOp) -> Result<()> {
    let actual = op.domain();
    if actual != expected {
        return Err(SyncError::DomainMismatch { expected, actual });
    }
    Ok(())
}

/// Notifications published after subscribing, limited to the categories
/// the subscriber's role may receive
pub struct NotificationFeed {
    role: Role,
    receiver: broadcast::Receiver<Notification>,
    context: Arc<SyncContext>,
}

impl NotificationFeed {
    pub fn role(&self) -> Role {
        self.role
    }

    /// Wait for the next receivable notification.
    ///
    /// Returns `None` once the context is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(n) if self.accepts(&n) => return Some(n),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(role = %self.role, skipped, "notification feed lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next receivable notification already queued, if any
    pub fn try_recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.try_recv() {
                Ok(n) if self.accepts(&n) => return Some(n),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(role = %self.role, skipped, "notification feed lagged");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    fn accepts(&self, notification: &Notification) -> bool {
        self.context
            .registry()
            .can_receive(self.role, notification.category)
    }
}

impl std::fmt::Debug for NotificationFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationFeed")
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache::CacheTag;
    use shared::{
        Environment, FinancialRecord, InventoryItem, ManualTimeSource, NotificationCategory,
        Order, OrderItem, OrderStatus, Priority, StoreError, SyncConfig, Table, TableStatus,
    };
    use std::time::Duration;
    use store::InMemoryStore;

    fn context() -> (Arc<SyncContext>, Arc<ManualTimeSource>) {
        let time = Arc::new(ManualTimeSource::new(0));
        let store = InMemoryStore::new()
            .with_records(DomainData::Financial(vec![FinancialRecord {
                id: "f-1".to_string(),
                description: "Flour delivery".to_string(),
                amount_cents: -12_500,
                recorded_at: chrono::Utc::now(),
            }]))
            .with_records(DomainData::Tables(vec![Table {
                number: 4,
                seats: 2,
                status: TableStatus::Free,
            }]));
        let ctx = SyncContext::with_time_source(
            SyncConfig::defaults(Environment::Test),
            Arc::new(store),
            time.clone(),
        )
        .unwrap();
        (ctx, time)
    }

    fn croissant_order(id: &str) -> Order {
        Order::new(
            id,
            vec![OrderItem {
                name: "croissant".to_string(),
                quantity: 2,
                unit_price_cents: Some(350),
            }],
        )
    }

    fn notice(category: NotificationCategory) -> Notification {
        Notification::new(category, Priority::Normal, format!("{category} update"))
    }

    // ============== Scenario Tests ==============

    #[test]
    fn test_customer_reads_own_order_immediately() {
        let (ctx, _) = context();
        let customer = ctx.facade(Role::Customer);
        assert!(customer.get_data(DataDomain::Orders).unwrap().is_empty());

        let outcome = customer
            .mutate(DataDomain::Orders, StoreOp::AddOrder(croissant_order("o-1")))
            .unwrap();
        assert_eq!(outcome, MutationOutcome::Applied { count: 1 });

        let orders = customer.get_data(DataDomain::Orders).unwrap();
        assert_eq!(orders.record_ids(), vec!["o-1".to_string()]);
    }

    #[test]
    fn test_customer_financial_view_is_empty() {
        let (ctx, _) = context();
        let customer = ctx.facade(Role::Customer);

        let data = customer.get_data(DataDomain::Financial).unwrap();
        assert_eq!(data, DomainData::Financial(vec![]));

        assert_eq!(ctx.facade(Role::Owner).get_data(DataDomain::Financial).unwrap().len(), 1);
    }

    #[test]
    fn test_repeated_reads_compute_once() {
        let (ctx, _) = context();
        let owner = ctx.facade(Role::Owner);

        let first = owner.get_data(DataDomain::Tables).unwrap();
        let second = owner.get_data(DataDomain::Tables).unwrap();

        assert_eq!(first, second);
        let perf = owner.performance();
        assert_eq!(perf.recompute_count, 1);
        assert_eq!(perf.hits, 1);
    }

    // ============== Read-After-Write Tests ==============

    #[test]
    fn test_read_after_write_for_every_writer() {
        let (ctx, _) = context();
        for &role in Role::all() {
            let facade = ctx.facade(role);
            let before = facade.get_data(DataDomain::Orders).unwrap().len();

            let id = format!("o-{}", role.as_str());
            facade
                .mutate(DataDomain::Orders, StoreOp::AddOrder(Order::new(id.clone(), vec![])))
                .unwrap();

            let after = facade.get_data(DataDomain::Orders).unwrap();
            assert_eq!(after.len(), before + 1, "role {role}");
            assert!(after.record_ids().contains(&id), "role {role}");
        }
    }

    #[test]
    fn test_write_invalidates_other_roles_views() {
        let (ctx, _) = context();
        let waiter = ctx.facade(Role::Waiter);
        let owner = ctx.facade(Role::Owner);
        assert_eq!(
            waiter.get_data(DataDomain::Tables).unwrap(),
            owner.get_data(DataDomain::Tables).unwrap()
        );

        waiter
            .mutate(
                DataDomain::Tables,
                StoreOp::UpdateTableStatus { number: 4, status: TableStatus::Occupied },
            )
            .unwrap();

        match owner.get_data(DataDomain::Tables).unwrap() {
            DomainData::Tables(tables) => assert_eq!(tables[0].status, TableStatus::Occupied),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_ttl_expiry_forces_recompute() {
        let (ctx, time) = context();
        let owner = ctx.facade(Role::Owner);
        owner.get_data(DataDomain::Tables).unwrap();

        time.advance(30_000);
        owner.get_data(DataDomain::Tables).unwrap();

        assert_eq!(owner.performance().recompute_count, 2);
    }

    // ============== Mutation Permission Tests ==============

    #[test]
    fn test_denied_mutation_not_forwarded() {
        let (ctx, _) = context();
        let customer = ctx.facade(Role::Customer);
        let version = ctx.store().version(DataDomain::Inventory);

        let outcome = customer
            .mutate(
                DataDomain::Inventory,
                StoreOp::AddInventoryEntry(InventoryItem::new("i-1", "butter", 4, "kg")),
            )
            .unwrap();

        assert_eq!(outcome, MutationOutcome::Denied);
        assert_eq!(ctx.store().version(DataDomain::Inventory), version);
    }

    #[test]
    fn test_reports_never_written() {
        let (ctx, _) = context();
        let outcome = ctx
            .facade(Role::Owner)
            .mutate(DataDomain::Reports, StoreOp::AddOrder(Order::new("o-1", vec![])))
            .unwrap();
        assert_eq!(outcome, MutationOutcome::Denied);
    }

    #[test]
    fn test_domain_mismatch_is_error() {
        let (ctx, _) = context();
        let err = ctx
            .facade(Role::Owner)
            .mutate(DataDomain::Inventory, StoreOp::AddOrder(Order::new("o-1", vec![])))
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::DomainMismatch { expected: DataDomain::Inventory, actual: DataDomain::Orders }
        ));
        assert_eq!(ctx.store().version(DataDomain::Orders), 0);
    }

    #[test]
    fn test_store_error_propagates() {
        let (ctx, _) = context();
        let err = ctx
            .facade(Role::Waiter)
            .mutate(
                DataDomain::Orders,
                StoreOp::UpdateOrderStatus { id: "missing".to_string(), status: OrderStatus::Served },
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::Store(StoreError::NotFound { .. })));
    }

    // ============== Batch Tests ==============

    fn order_batch(prefix: &str) -> Vec<StoreOp> {
        (0..3)
            .map(|i| StoreOp::AddOrder(Order::new(format!("{prefix}-{i}"), vec![])))
            .collect()
    }

    #[test]
    fn test_batched_role_invalidates_once() {
        let (ctx, _) = context();
        let admin = ctx.facade(Role::Admin);
        let before = ctx.cache().generation(CacheTag::Domain(DataDomain::Orders));

        let outcome = admin.mutate_batch(DataDomain::Orders, order_batch("a")).unwrap();

        assert_eq!(outcome, MutationOutcome::Applied { count: 3 });
        assert_eq!(ctx.cache().generation(CacheTag::Domain(DataDomain::Orders)), before + 1);
        assert_eq!(admin.get_data(DataDomain::Orders).unwrap().len(), 3);
    }

    #[test]
    fn test_unbatched_role_invalidates_per_op() {
        let (ctx, _) = context();
        let waiter = ctx.facade(Role::Waiter);
        let before = ctx.cache().generation(CacheTag::Domain(DataDomain::Orders));

        waiter.mutate_batch(DataDomain::Orders, order_batch("w")).unwrap();

        assert_eq!(ctx.cache().generation(CacheTag::Domain(DataDomain::Orders)), before + 3);
    }

    #[test]
    fn test_batch_checks_domains_before_applying() {
        let (ctx, _) = context();
        let mut ops = order_batch("b");
        ops.push(StoreOp::UpdateTableStatus { number: 4, status: TableStatus::Cleaning });

        assert!(ctx.facade(Role::Owner).mutate_batch(DataDomain::Orders, ops).is_err());
        assert_eq!(ctx.store().version(DataDomain::Orders), 0);
    }

    #[test]
    fn test_batch_failure_keeps_earlier_writes_visible() {
        let (ctx, _) = context();
        let admin = ctx.facade(Role::Admin);
        admin.get_data(DataDomain::Orders).unwrap();

        let ops = vec![
            StoreOp::AddOrder(Order::new("o-1", vec![])),
            StoreOp::AddOrder(Order::new("o-1", vec![])),
        ];
        assert!(admin.mutate_batch(DataDomain::Orders, ops).is_err());

        assert_eq!(admin.get_data(DataDomain::Orders).unwrap().record_ids(), vec!["o-1"]);
    }

    // ============== Notification Tests ==============

    #[test]
    fn test_notify_drops_unreceivable_category() {
        let (ctx, _) = context();
        let customer = ctx.facade(Role::Customer);
        let version = ctx.store().version(DataDomain::Notifications);

        let outcome = customer.notify(notice(NotificationCategory::Financial)).unwrap();

        assert_eq!(outcome, NotifyOutcome::Dropped);
        assert_eq!(ctx.store().version(DataDomain::Notifications), version);
    }

    #[test]
    fn test_notify_delivers_and_invalidates() {
        let (ctx, _) = context();
        let waiter = ctx.facade(Role::Waiter);
        assert!(waiter.get_data(DataDomain::Notifications).unwrap().is_empty());

        let outcome = waiter.notify(notice(NotificationCategory::Tables)).unwrap();

        assert_eq!(outcome, NotifyOutcome::Delivered);
        assert_eq!(waiter.get_data(DataDomain::Notifications).unwrap().len(), 1);
    }

    #[test]
    fn test_notification_views_filtered_by_category() {
        let (ctx, _) = context();
        let owner = ctx.facade(Role::Owner);
        for category in NotificationCategory::all() {
            owner.notify(notice(*category)).unwrap();
        }

        let baker = ctx.facade(Role::Baker).get_data(DataDomain::Notifications).unwrap();
        let categories: Vec<NotificationCategory> = baker
            .as_notifications()
            .unwrap()
            .iter()
            .map(|n| n.category)
            .collect();

        assert_eq!(categories.len(), 3);
        assert!(categories.iter().all(|c| ctx.registry().can_receive(Role::Baker, *c)));
    }

    #[test]
    fn test_mark_read_limited_to_visible_notifications() {
        let (ctx, _) = context();
        let owner = ctx.facade(Role::Owner);
        let system = notice(NotificationCategory::System);
        let orders = notice(NotificationCategory::Orders);
        let (system_id, orders_id) = (system.id, orders.id);
        owner.notify(system).unwrap();
        owner.notify(orders).unwrap();

        let customer = ctx.facade(Role::Customer);
        assert_eq!(customer.mark_notification_read(system_id).unwrap(), MutationOutcome::Denied);
        assert!(customer.mark_notification_read(orders_id).unwrap().is_applied());

        let view = customer.get_data(DataDomain::Notifications).unwrap();
        assert!(view.as_notifications().unwrap()[0].read);
    }

    // ============== Subscription Tests ==============

    #[test]
    fn test_subscribe_respects_realtime_setting() {
        let (ctx, _) = context();
        assert!(ctx.facade(Role::Customer).subscribe().is_none());
        assert!(ctx.facade(Role::Waiter).subscribe().is_some());
    }

    #[test]
    fn test_feed_filters_by_category() {
        let (ctx, _) = context();
        let mut feed = ctx.facade(Role::Waiter).subscribe().unwrap();
        let owner = ctx.facade(Role::Owner);

        owner.notify(notice(NotificationCategory::Financial)).unwrap();
        owner.notify(notice(NotificationCategory::Tables)).unwrap();

        let received = feed.try_recv().unwrap();
        assert_eq!(received.category, NotificationCategory::Tables);
        assert!(feed.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_feed_receives_async() {
        let (ctx, _) = context();
        let mut feed = ctx.facade(Role::Employee).subscribe().unwrap();
        let employee = ctx.facade(Role::Employee);

        let publisher = tokio::spawn(async move {
            employee.notify(notice(NotificationCategory::Inventory)).unwrap();
        });

        let received = tokio::time::timeout(Duration::from_secs(1), feed.recv())
            .await
            .unwrap()
            .unwrap();
        publisher.await.unwrap();
        assert_eq!(received.category, NotificationCategory::Inventory);
    }

    // ============== Heartbeat Integration Tests ==============

    #[tokio::test]
    async fn test_heartbeat_keeps_views_fresh() {
        let ctx = SyncContext::new(
            SyncConfig::defaults(Environment::Test),
            Arc::new(InMemoryStore::new()),
        )
        .unwrap();
        let owner = ctx.facade(Role::Owner);
        owner.get_data(DataDomain::Orders).unwrap();

        let mut heartbeat = ctx.start_heartbeat();
        tokio::time::sleep(Duration::from_millis(350)).await;
        heartbeat.stop().await;

        // Owner views were invalidated and warmed at least twice
        assert!(ctx.cache().generation(CacheTag::RoleDomain(Role::Owner, DataDomain::Orders)) >= 2);
        assert!(ctx.performance().recompute_count >= 3);

        let after_stop = ctx.performance();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(ctx.performance().recompute_count, after_stop.recompute_count);
    }
}
