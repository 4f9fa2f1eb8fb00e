//! Primitive store mutations

use shared::{
    DataDomain, FinancialRecord, InventoryItem, Notification, Order, OrderStatus, ProductionBatch,
    ProductionStatus, TableStatus,
};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    AddOrder(Order),
    UpdateOrderStatus { id: String, status: OrderStatus },
    AddInventoryEntry(InventoryItem),
    /// Change stock by `delta`, clamping at zero
    AdjustInventory { id: String, delta: i64 },
    UpdateTableStatus { number: u32, status: TableStatus },
    AddNotification(Notification),
    MarkNotificationRead { id: Uuid },
    RecordFinancial(FinancialRecord),
    AddProductionBatch(ProductionBatch),
    UpdateProductionStatus { id: String, status: ProductionStatus },
}

impl StoreOp {
    /// The domain this operation mutates
    pub fn domain(&self) -> DataDomain {
        match self {
            StoreOp::AddOrder(_) | StoreOp::UpdateOrderStatus { .. } => DataDomain::Orders,
            StoreOp::AddInventoryEntry(_) | StoreOp::AdjustInventory { .. } => DataDomain::Inventory,
            StoreOp::UpdateTableStatus { .. } => DataDomain::Tables,
            StoreOp::AddNotification(_) | StoreOp::MarkNotificationRead { .. } => DataDomain::Notifications,
            StoreOp::RecordFinancial(_) => DataDomain::Financial,
            StoreOp::AddProductionBatch(_) | StoreOp::UpdateProductionStatus { .. } => DataDomain::Production,
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            StoreOp::AddOrder(_) => "add_order",
            StoreOp::UpdateOrderStatus { .. } => "update_order_status",
            StoreOp::AddInventoryEntry(_) => "add_inventory_entry",
            StoreOp::AdjustInventory { .. } => "adjust_inventory",
            StoreOp::UpdateTableStatus { .. } => "update_table_status",
            StoreOp::AddNotification(_) => "add_notification",
            StoreOp::MarkNotificationRead { .. } => "mark_notification_read",
            StoreOp::RecordFinancial(_) => "record_financial",
            StoreOp::AddProductionBatch(_) => "add_production_batch",
            StoreOp::UpdateProductionStatus { .. } => "update_production_status",
        }
    }
}
