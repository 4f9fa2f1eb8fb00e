//! FilterEngine - Narrow a domain collection to a role's view
//!
//! One predicate per `DomainData` variant. Output depends only on the
//! input collection, the role, the registry and the settings snapshot.

use crate::permission_registry::PermissionRegistry;
use shared::{DataDomain, DomainData, Role, SyncConfig};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-domain limits taken from configuration at construction time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSettings {
    max_items: BTreeMap<DataDomain, usize>,
    low_stock_threshold: Option<u32>,
}

impl FilterSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_items: DataDomain::all()
                .iter()
                .map(|d| (*d, config.domain(*d).max_items))
                .collect(),
            low_stock_threshold: config.domain(DataDomain::Inventory).low_stock_threshold,
        }
    }

    /// Builder: cap a domain's view
    pub fn with_max_items(mut self, domain: DataDomain, max: usize) -> Self {
        self.max_items.insert(domain, max);
        self
    }

    /// Builder: inventory low-stock threshold
    pub fn with_low_stock_threshold(mut self, threshold: u32) -> Self {
        self.low_stock_threshold = Some(threshold);
        self
    }

    pub fn max_items(&self, domain: DataDomain) -> usize {
        self.max_items.get(&domain).copied().unwrap_or(usize::MAX)
    }
}

/// Applies role-specific predicates to domain collections
#[derive(Debug, Clone)]
pub struct FilterEngine {
    registry: Arc<PermissionRegistry>,
    settings: FilterSettings,
}

impl FilterEngine {
    pub fn new(registry: Arc<PermissionRegistry>, settings: FilterSettings) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &PermissionRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    /// Filter `collection` for `role` as a view of `domain`.
    ///
    /// Returns the empty collection of `domain` when the role may not read it
    /// or when `collection` belongs to another domain.
    pub fn filter(&self, collection: &DomainData, role: Role, domain: DataDomain) -> DomainData {
        if collection.domain() != domain || !self.registry.allows(role, domain) {
            return DomainData::empty(domain);
        }

        let max = self.settings.max_items(domain);
        let financial = self.registry.allows(role, DataDomain::Financial);

        match collection {
            DomainData::Orders(orders) => {
                let mut view = orders.clone();
                view.sort_by(|a, b| {
                    b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
                });
                view.truncate(max);
                if !financial {
                    view.iter_mut().for_each(|o| o.strip_financials());
                }
                DomainData::Orders(view)
            }
            DomainData::Inventory(items) => {
                let mut view = items.clone();
                view.truncate(max);
                for item in &mut view {
                    item.low_stock = self
                        .settings
                        .low_stock_threshold
                        .is_some_and(|t| item.quantity <= t);
                    if !financial {
                        item.unit_cost_cents = None;
                    }
                }
                DomainData::Inventory(view)
            }
            DomainData::Tables(tables) => {
                let mut view = tables.clone();
                view.sort_by_key(|t| t.number);
                view.truncate(max);
                DomainData::Tables(view)
            }
            DomainData::Notifications(notifications) => {
                let allowed = self.registry.allowed_notification_categories(role);
                let mut view: Vec<_> = notifications
                    .iter()
                    .filter(|n| allowed.contains(&n.category))
                    .cloned()
                    .collect();
                view.sort_by(|a, b| {
                    b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
                });
                view.truncate(max);
                DomainData::Notifications(view)
            }
            DomainData::Financial(records) => {
                let mut view = records.clone();
                view.sort_by_key(|r| (Reverse(r.recorded_at), r.id.clone()));
                view.truncate(max);
                DomainData::Financial(view)
            }
            DomainData::Production(batches) => {
                let mut view = batches.clone();
                view.sort_by_key(|b| (Reverse(b.started_at), b.id.clone()));
                view.truncate(max);
                DomainData::Production(view)
            }
            DomainData::Reports(entries) => {
                let allowed = self.registry.allowed_report_domains(role);
                let mut view: Vec<_> = entries
                    .iter()
                    .filter(|e| allowed.contains(&e.domain))
                    .cloned()
                    .collect();
                view.truncate(max);
                DomainData::Reports(view)
            }
        }
    }
}
