//! Domain records and the per-domain tagged collection

use crate::role::{DataDomain, NotificationCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Orders
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    InProgress,
    Ready,
    Served,
    Paid,
    Cancelled,
}

impl OrderStatus {
    /// Whether the order still needs attention from staff
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::InProgress | OrderStatus::Ready)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub name: String,
    pub quantity: u32,
    /// Price per unit in cents. Stripped for roles without financial access.
    pub unit_price_cents: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub table: Option<u32>,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub total_cents: Option<u64>,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Create a pending order; the total is derived from item prices
    pub fn new(id: impl Into<String>, items: Vec<OrderItem>) -> Self {
        let total = items
            .iter()
            .map(|i| i.unit_price_cents.map(|p| p * u64::from(i.quantity)))
            .sum::<Option<u64>>();
        Self {
            id: id.into(),
            table: None,
            items,
            status: OrderStatus::Pending,
            total_cents: total,
            payment_reference: None,
            created_at: Utc::now(),
        }
    }

    /// Builder: assign a table
    pub fn at_table(mut self, table: u32) -> Self {
        self.table = Some(table);
        self
    }

    /// Builder: override creation time
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// Remove every monetary field
    pub fn strip_financials(&mut self) {
        self.total_cents = None;
        self.payment_reference = None;
        for item in &mut self.items {
            item.unit_price_cents = None;
        }
    }
}

// ============================================================================
// Inventory
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: String,
    pub name: String,
    pub quantity: u32,
    pub unit: String,
    pub unit_cost_cents: Option<u64>,
    /// Set by the inventory view, never by the store
    #[serde(default)]
    pub low_stock: bool,
}

impl InventoryItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, quantity: u32, unit: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            quantity,
            unit: unit.into(),
            unit_cost_cents: None,
            low_stock: false,
        }
    }

    pub fn with_unit_cost(mut self, cents: u64) -> Self {
        self.unit_cost_cents = Some(cents);
        self
    }
}

// ============================================================================
// Tables
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Free,
    Occupied,
    Reserved,
    Cleaning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub number: u32,
    pub seats: u32,
    pub status: TableStatus,
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub category: NotificationCategory,
    pub priority: Priority,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(category: NotificationCategory, priority: Priority, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            category,
            priority,
            message: message.into(),
            read: false,
            created_at: Utc::now(),
        }
    }

    /// Builder: override creation time
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// The only permitted state transition
    pub fn mark_read(&mut self) {
        self.read = true;
    }
}

// ============================================================================
// Financial / Production / Reports
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialRecord {
    pub id: String,
    pub description: String,
    /// Signed amount in cents (negative for expenses)
    pub amount_cents: i64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionStatus {
    Planned,
    Baking,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionBatch {
    pub id: String,
    pub product: String,
    pub quantity: u32,
    pub status: ProductionStatus,
    pub started_at: DateTime<Utc>,
}

/// Per-domain summary row in the reports view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub domain: DataDomain,
    pub record_count: usize,
    /// Records still needing attention (open orders, occupied tables, unread notifications...)
    pub open_count: usize,
}

impl ReportEntry {
    /// Summarize a stored collection
    pub fn summarize(data: &DomainData) -> Self {
        let open_count = match data {
            DomainData::Orders(v) => v.iter().filter(|o| o.status.is_open()).count(),
            DomainData::Inventory(v) => v.iter().filter(|i| i.quantity == 0).count(),
            DomainData::Tables(v) => v.iter().filter(|t| t.status != TableStatus::Free).count(),
            DomainData::Notifications(v) => v.iter().filter(|n| !n.read).count(),
            DomainData::Financial(_) => 0,
            DomainData::Production(v) => v.iter().filter(|b| b.status != ProductionStatus::Done).count(),
            DomainData::Reports(_) => 0,
        };
        Self {
            domain: data.domain(),
            record_count: data.len(),
            open_count,
        }
    }
}

// ============================================================================
// Tagged collection
// ============================================================================

/// A collection of one domain's records with a fixed schema per domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "domain", content = "records", rename_all = "lowercase")]
pub enum DomainData {
    Orders(Vec<Order>),
    Inventory(Vec<InventoryItem>),
    Tables(Vec<Table>),
    Notifications(Vec<Notification>),
    Financial(Vec<FinancialRecord>),
    Production(Vec<ProductionBatch>),
    Reports(Vec<ReportEntry>),
}

impl DomainData {
    /// Empty collection for a domain
    pub fn empty(domain: DataDomain) -> Self {
        match domain {
            DataDomain::Orders => DomainData::Orders(Vec::new()),
            DataDomain::Inventory => DomainData::Inventory(Vec::new()),
            DataDomain::Tables => DomainData::Tables(Vec::new()),
            DataDomain::Notifications => DomainData::Notifications(Vec::new()),
            DataDomain::Financial => DomainData::Financial(Vec::new()),
            DataDomain::Production => DomainData::Production(Vec::new()),
            DataDomain::Reports => DomainData::Reports(Vec::new()),
        }
    }

    pub fn domain(&self) -> DataDomain {
        match self {
            DomainData::Orders(_) => DataDomain::Orders,
            DomainData::Inventory(_) => DataDomain::Inventory,
            DomainData::Tables(_) => DataDomain::Tables,
            DomainData::Notifications(_) => DataDomain::Notifications,
            DomainData::Financial(_) => DataDomain::Financial,
            DomainData::Production(_) => DataDomain::Production,
            DomainData::Reports(_) => DataDomain::Reports,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DomainData::Orders(v) => v.len(),
            DomainData::Inventory(v) => v.len(),
            DomainData::Tables(v) => v.len(),
            DomainData::Notifications(v) => v.len(),
            DomainData::Financial(v) => v.len(),
            DomainData::Production(v) => v.len(),
            DomainData::Reports(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stable identity of each record, in collection order
    pub fn record_ids(&self) -> Vec<String> {
        match self {
            DomainData::Orders(v) => v.iter().map(|o| o.id.clone()).collect(),
            DomainData::Inventory(v) => v.iter().map(|i| i.id.clone()).collect(),
            DomainData::Tables(v) => v.iter().map(|t| t.number.to_string()).collect(),
            DomainData::Notifications(v) => v.iter().map(|n| n.id.to_string()).collect(),
            DomainData::Financial(v) => v.iter().map(|f| f.id.clone()).collect(),
            DomainData::Production(v) => v.iter().map(|b| b.id.clone()).collect(),
            DomainData::Reports(v) => v.iter().map(|r| r.domain.to_string()).collect(),
        }
    }

    pub fn as_orders(&self) -> Option<&[Order]> {
        match self {
            DomainData::Orders(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_inventory(&self) -> Option<&[InventoryItem]> {
        match self {
            DomainData::Inventory(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_notifications(&self) -> Option<&[Notification]> {
        match self {
            DomainData::Notifications(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_reports(&self) -> Option<&[ReportEntry]> {
        match self {
            DomainData::Reports(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, qty: u32, price: Option<u64>) -> OrderItem {
        OrderItem {
            name: name.to_string(),
            quantity: qty,
            unit_price_cents: price,
        }
    }

    // ============== Order Tests ==============

    #[test]
    fn test_order_total_from_items() {
        let order = Order::new("o-1", vec![item("croissant", 2, Some(250)), item("latte", 1, Some(400))]);
        assert_eq!(order.total_cents, Some(900));
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_order_total_unknown_when_price_missing() {
        let order = Order::new("o-1", vec![item("croissant", 2, Some(250)), item("water", 1, None)]);
        assert_eq!(order.total_cents, None);
    }

    #[test]
    fn test_strip_financials() {
        let mut order = Order::new("o-1", vec![item("baguette", 1, Some(300))]);
        order.payment_reference = Some("card-1234".to_string());

        order.strip_financials();

        assert!(order.total_cents.is_none());
        assert!(order.payment_reference.is_none());
        assert!(order.items.iter().all(|i| i.unit_price_cents.is_none()));
        assert_eq!(order.items[0].quantity, 1);
    }

    #[test]
    fn test_order_status_open() {
        assert!(OrderStatus::Pending.is_open());
        assert!(OrderStatus::Ready.is_open());
        assert!(!OrderStatus::Paid.is_open());
        assert!(!OrderStatus::Cancelled.is_open());
    }

    // ============== Notification Tests ==============

    #[test]
    fn test_notification_mark_read() {
        let mut n = Notification::new(NotificationCategory::Orders, Priority::High, "Order ready");
        assert!(!n.read);
        n.mark_read();
        assert!(n.read);
    }

    // ============== DomainData Tests ==============

    #[test]
    fn test_empty_matches_domain() {
        for domain in DataDomain::all() {
            let data = DomainData::empty(*domain);
            assert_eq!(data.domain(), *domain);
            assert!(data.is_empty());
        }
    }

    #[test]
    fn test_report_summarize_orders() {
        let mut paid = Order::new("o-2", vec![]);
        paid.status = OrderStatus::Paid;
        let data = DomainData::Orders(vec![Order::new("o-1", vec![]), paid]);

        let entry = ReportEntry::summarize(&data);

        assert_eq!(entry.domain, DataDomain::Orders);
        assert_eq!(entry.record_count, 2);
        assert_eq!(entry.open_count, 1);
    }

    #[test]
    fn test_domain_data_serde_tagged() {
        let data = DomainData::Tables(vec![Table {
            number: 4,
            seats: 2,
            status: TableStatus::Free,
        }]);
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["domain"], "tables");
        assert_eq!(json["records"][0]["number"], 4);
    }
}
