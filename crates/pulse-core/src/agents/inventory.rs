//! Inventory agent: stock levels and value

use super::Agent;
use crate::context::OrgContext;
use crate::db::Database;
use crate::error::Result;
use crate::models::{Area, AreaMetrics, InsightDraft, InsightType, InventoryMetrics};

#[derive(Default)]
pub struct InventoryAgent;

impl InventoryAgent {
    pub fn new() -> Self {
        Self
    }

    pub fn gather_inventory(&self, db: &Database, ctx: &OrgContext) -> Result<InventoryMetrics> {
        let items = db.list_stock_items(ctx.organization_id)?;
        let mut m = InventoryMetrics {
            total_items: items.len() as i64,
            ..Default::default()
        };

        for item in &items {
            if item.quantity <= 0.0 {
                m.out_of_stock += 1;
                m.out_of_stock_items.push(item.name.clone());
            } else if item.quantity <= item.reorder_level {
                m.low_stock += 1;
                m.low_stock_items.push(item.name.clone());
            }
            m.stock_value += item.quantity.max(0.0) * item.unit_cost;
        }

        Ok(m)
    }

    fn analyze_inventory(&self, m: &InventoryMetrics) -> Vec<InsightDraft> {
        let mut drafts = Vec::new();

        if m.out_of_stock > 0 {
            drafts.push(
                InsightDraft::new(
                    InsightType::Warning,
                    "inventory",
                    "Items out of stock",
                    format!(
                        "{} item(s) are out of stock: {}.",
                        m.out_of_stock,
                        m.out_of_stock_items.join(", ")
                    ),
                    0.8,
                )
                .with_actions(["reorder_stock"])
                .with_url("/inventory"),
            );
        }

        if m.low_stock > 0 {
            drafts.push(
                InsightDraft::new(
                    InsightType::Warning,
                    "inventory",
                    "Low stock",
                    format!(
                        "{} item(s) are at or below their reorder level: {}.",
                        m.low_stock,
                        m.low_stock_items.join(", ")
                    ),
                    0.6,
                )
                .with_actions(["reorder_stock"])
                .with_url("/inventory"),
            );
        }

        drafts
    }
}

impl Agent for InventoryAgent {
    fn area(&self) -> Area {
        Area::Inventory
    }

    fn gather(&self, db: &Database, ctx: &OrgContext) -> Result<AreaMetrics> {
        self.gather_inventory(db, ctx).map(AreaMetrics::Inventory)
    }

    fn analyze(&self, metrics: &AreaMetrics, _ctx: &OrgContext) -> Vec<InsightDraft> {
        match metrics {
            AreaMetrics::Inventory(m) => self.analyze_inventory(m),
            _ => Vec::new(),
        }
    }
}
