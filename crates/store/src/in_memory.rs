//! In-Memory Data Store
//!
//! Thread-safe implementation using RwLock. Collections and their version
//! counters live under the same lock so a reader never sees a version that
//! disagrees with the data.

use crate::{DataStore, StoreOp};
use chrono::{DateTime, Utc};
use shared::{
    DataDomain, DomainData, FinancialRecord, InventoryItem, Notification, Order, ProductionBatch,
    StoreError, Table,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct Collections {
    orders: Vec<Order>,
    inventory: Vec<InventoryItem>,
    tables: Vec<Table>,
    notifications: Vec<Notification>,
    financial: Vec<FinancialRecord>,
    production: Vec<ProductionBatch>,
    versions: HashMap<DataDomain, u64>,
}

impl Collections {
    fn bump(&mut self, domain: DataDomain) {
        *self.versions.entry(domain).or_insert(0) += 1;
    }
}

/// In-memory store shared by every facade in the process
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<Collections>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: replace a stored collection wholesale
    pub fn with_records(self, data: DomainData) -> Self {
        let domain = data.domain();
        if domain == DataDomain::Reports {
            return self;
        }
        if let Ok(mut state) = self.state.write() {
            match data {
                DomainData::Orders(v) => state.orders = v,
                DomainData::Inventory(v) => state.inventory = v,
                DomainData::Tables(v) => state.tables = v,
                DomainData::Notifications(v) => state.notifications = v,
                DomainData::Financial(v) => state.financial = v,
                DomainData::Production(v) => state.production = v,
                DomainData::Reports(_) => {}
            }
            state.bump(domain);
        }
        self
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>, StoreError> {
        self.state.read().map_err(|_| StoreError::Unavailable {
            message: "Failed to acquire read lock".to_string(),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>, StoreError> {
        self.state.write().map_err(|_| StoreError::Unavailable {
            message: "Failed to acquire write lock".to_string(),
        })
    }
}

fn not_found(domain: DataDomain, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        domain,
        id: id.to_string(),
    }
}

fn duplicate(domain: DataDomain, id: impl ToString) -> StoreError {
    StoreError::Duplicate {
        domain,
        id: id.to_string(),
    }
}

impl DataStore for InMemoryStore {
    fn snapshot(&self, domain: DataDomain) -> Result<DomainData, StoreError> {
        let state = self.read()?;
        Ok(match domain {
            DataDomain::Orders => DomainData::Orders(state.orders.clone()),
            DataDomain::Inventory => DomainData::Inventory(state.inventory.clone()),
            DataDomain::Tables => DomainData::Tables(state.tables.clone()),
            DataDomain::Notifications => DomainData::Notifications(state.notifications.clone()),
            DataDomain::Financial => DomainData::Financial(state.financial.clone()),
            DataDomain::Production => DomainData::Production(state.production.clone()),
            DataDomain::Reports => DomainData::empty(DataDomain::Reports),
        })
    }

    fn version(&self, domain: DataDomain) -> u64 {
        self.read()
            .map(|s| s.versions.get(&domain).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn apply(&self, op: StoreOp) -> Result<(), StoreError> {
        let domain = op.domain();
        let name = op.name();
        let mut state = self.write()?;

        match op {
            StoreOp::AddOrder(order) => {
                if state.orders.iter().any(|o| o.id == order.id) {
                    return Err(duplicate(domain, &order.id));
                }
                state.orders.push(order);
            }
            StoreOp::UpdateOrderStatus { id, status } => {
                let order = state
                    .orders
                    .iter_mut()
                    .find(|o| o.id == id)
                    .ok_or_else(|| not_found(domain, &id))?;
                order.status = status;
            }
            StoreOp::AddInventoryEntry(item) => {
                if state.inventory.iter().any(|i| i.id == item.id) {
                    return Err(duplicate(domain, &item.id));
                }
                state.inventory.push(item);
            }
            StoreOp::AdjustInventory { id, delta } => {
                let item = state
                    .inventory
                    .iter_mut()
                    .find(|i| i.id == id)
                    .ok_or_else(|| not_found(domain, &id))?;
                let adjusted = i64::from(item.quantity).saturating_add(delta);
                item.quantity = adjusted.clamp(0, i64::from(u32::MAX)) as u32;
            }
            StoreOp::UpdateTableStatus { number, status } => {
                let table = state
                    .tables
                    .iter_mut()
                    .find(|t| t.number == number)
                    .ok_or_else(|| not_found(domain, number))?;
                table.status = status;
            }
            StoreOp::AddNotification(notification) => {
                state.notifications.push(notification);
            }
            StoreOp::MarkNotificationRead { id } => {
                let notification = state
                    .notifications
                    .iter_mut()
                    .find(|n| n.id == id)
                    .ok_or_else(|| not_found(domain, id))?;
                notification.mark_read();
            }
            StoreOp::RecordFinancial(record) => {
                if state.financial.iter().any(|r| r.id == record.id) {
                    return Err(duplicate(domain, &record.id));
                }
                state.financial.push(record);
            }
            StoreOp::AddProductionBatch(batch) => {
                if state.production.iter().any(|b| b.id == batch.id) {
                    return Err(duplicate(domain, &batch.id));
                }
                state.production.push(batch);
            }
            StoreOp::UpdateProductionStatus { id, status } => {
                let batch = state
                    .production
                    .iter_mut()
                    .find(|b| b.id == id)
                    .ok_or_else(|| not_found(domain, &id))?;
                batch.status = status;
            }
        }

        state.bump(domain);
        debug!(op = name, %domain, "store mutation applied");
        Ok(())
    }

    fn purge_notifications(&self, older_than: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut state = self.write()?;
        let before = state.notifications.len();
        state.notifications.retain(|n| n.created_at >= older_than);
        let removed = before - state.notifications.len();
        if removed > 0 {
            state.bump(DataDomain::Notifications);
        }
        Ok(removed)
    }
}
