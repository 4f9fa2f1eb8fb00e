//! rolesync simulate command
//!
//! Seeds an in-memory store, runs every role's facade against it with the
//! heartbeat active, then prints what each role sees.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Args;
use console::style;
use facade::{NotificationFeed, SyncContext, SyncFacade};
use shared::{
    DataDomain, DomainData, FinancialRecord, InventoryItem, Notification, NotificationCategory,
    Order, OrderItem, OrderStatus, Priority, ProductionBatch, ProductionStatus, Role, SyncConfig,
    Table, TableStatus,
};
use store::{InMemoryStore, StoreOp};
use tracing::warn;

use super::config::ConfigSource;

#[derive(Debug, Args)]
pub struct SimulateCommand {
    /// How long to run the heartbeat
    #[arg(short, long, default_value_t = 3)]
    pub seconds: u64,

    #[command(flatten)]
    pub source: ConfigSource,
}

impl SimulateCommand {
    pub fn run(&self) -> anyhow::Result<()> {
        let config = self.source.load()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let summary = runtime.block_on(simulate(config, self.seconds))?;
        print!("{}", summary);
        Ok(())
    }
}

/// Sample bakery data for a fresh store
pub fn seed_store() -> InMemoryStore {
    let now = Utc::now();
    InMemoryStore::new()
        .with_records(DomainData::Tables(
            (1..=6)
                .map(|number| Table {
                    number,
                    seats: if number % 2 == 0 { 4 } else { 2 },
                    status: TableStatus::Free,
                })
                .collect(),
        ))
        .with_records(DomainData::Inventory(vec![
            InventoryItem::new("inv-flour", "Flour", 40, "kg").with_unit_cost(90),
            InventoryItem::new("inv-butter", "Butter", 4, "kg").with_unit_cost(850),
            InventoryItem::new("inv-sugar", "Sugar", 12, "kg").with_unit_cost(120),
        ]))
        .with_records(DomainData::Financial(vec![FinancialRecord {
            id: "fin-opening".to_string(),
            description: "Opening float".to_string(),
            amount_cents: 20_000,
            recorded_at: now,
        }]))
        .with_records(DomainData::Production(vec![ProductionBatch {
            id: "batch-1".to_string(),
            product: "Croissant".to_string(),
            quantity: 48,
            status: ProductionStatus::Baking,
            started_at: now,
        }]))
}

/// Run the simulation and return the printable summary
pub async fn simulate(config: SyncConfig, seconds: u64) -> anyhow::Result<String> {
    let context = SyncContext::new(config, Arc::new(seed_store()))?;
    let facades: BTreeMap<Role, SyncFacade> = Role::all()
        .iter()
        .map(|&role| (role, context.facade(role)))
        .collect();
    let mut feeds: BTreeMap<Role, NotificationFeed> = facades
        .iter()
        .filter_map(|(&role, facade)| facade.subscribe().map(|feed| (role, feed)))
        .collect();

    let mut heartbeat = context.start_heartbeat();

    for round in 0..seconds.max(1) {
        if let Err(e) = run_round(&facades, round) {
            warn!(round, error = %e, "simulation round failed");
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    heartbeat.stop().await;

    let mut out = String::new();
    out.push_str(&format!("{}\n", style("Per-role views").bold()));
    out.push_str(&format!("  {:<10}", "role"));
    for domain in DataDomain::all() {
        out.push_str(&format!(" {:>13}", domain.as_str()));
    }
    out.push_str(&format!(" {:>9}\n", "live"));

    for (role, facade) in &facades {
        out.push_str(&format!("  {:<10}", role.as_str()));
        for &domain in DataDomain::all() {
            let count = facade.get_data(domain)?.len();
            out.push_str(&format!(" {:>13}", count));
        }
        let live = match feeds.get_mut(role) {
            Some(feed) => std::iter::from_fn(|| feed.try_recv()).count().to_string(),
            None => "off".to_string(),
        };
        out.push_str(&format!(" {:>9}\n", live));
    }

    let perf = context.performance();
    out.push_str(&format!("\n{}\n", style("Cache performance").bold()));
    out.push_str(&format!("  hits:            {}\n", perf.hits));
    out.push_str(&format!("  misses:          {}\n", perf.misses));
    out.push_str(&format!("  hit rate:        {:.1}%\n", perf.hit_rate() * 100.0));
    out.push_str(&format!("  recomputes:      {}\n", perf.recompute_count));
    out.push_str(&format!("  avg recompute:   {:?}\n", perf.average_recompute_latency));
    out.push_str(&format!("  invalidations:   {}\n", perf.invalidations));
    out.push_str(&format!("  evictions:       {}\n", perf.evictions));
    out.push_str(&format!("  entries:         {}\n", perf.entries));
    Ok(out)
}

/// One second of bakery activity
fn run_round(facades: &BTreeMap<Role, SyncFacade>, round: u64) -> anyhow::Result<()> {
    let facade = |role: Role| facades.get(&role).ok_or_else(|| anyhow::anyhow!("no facade for {role}"));

    let order_id = format!("order-{round}");
    let table = (round % 6) as u32 + 1;
    facade(Role::Customer)?.mutate(
        DataDomain::Orders,
        StoreOp::AddOrder(
            Order::new(
                order_id.clone(),
                vec![OrderItem {
                    name: "Croissant".to_string(),
                    quantity: 2,
                    unit_price_cents: Some(350),
                }],
            )
            .at_table(table),
        ),
    )?;

    let waiter = facade(Role::Waiter)?;
    waiter.mutate(
        DataDomain::Tables,
        StoreOp::UpdateTableStatus { number: table, status: TableStatus::Occupied },
    )?;
    waiter.mutate(
        DataDomain::Orders,
        StoreOp::UpdateOrderStatus { id: order_id, status: OrderStatus::InProgress },
    )?;
    waiter.notify(Notification::new(
        NotificationCategory::Tables,
        Priority::Normal,
        format!("Table {table} seated"),
    ))?;

    let baker = facade(Role::Baker)?;
    baker.mutate_batch(
        DataDomain::Inventory,
        vec![
            StoreOp::AdjustInventory { id: "inv-flour".to_string(), delta: -2 },
            StoreOp::AdjustInventory { id: "inv-butter".to_string(), delta: -1 },
        ],
    )?;
    baker.notify(Notification::new(
        NotificationCategory::Inventory,
        Priority::High,
        "Butter running low",
    ))?;

    facade(Role::Owner)?.mutate(
        DataDomain::Financial,
        StoreOp::RecordFinancial(FinancialRecord {
            id: format!("fin-{round}"),
            description: "Counter sales".to_string(),
            amount_cents: 700,
            recorded_at: Utc::now(),
        }),
    )?;

    for facade in facades.values() {
        for &domain in DataDomain::watched() {
            facade.get_data(domain)?;
        }
    }
    Ok(())
}
