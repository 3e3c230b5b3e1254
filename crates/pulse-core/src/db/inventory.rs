//! Stock items

use rusqlite::params;

use super::Database;
use crate::error::Result;
use crate::models::StockItem;

impl Database {
    pub fn create_stock_item(
        &self,
        organization_id: i64,
        name: &str,
        sku: Option<&str>,
        quantity: f64,
        reorder_level: f64,
        unit_cost: f64,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO stock_items (organization_id, name, sku, quantity, reorder_level, unit_cost)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![organization_id, name, sku, quantity, reorder_level, unit_cost],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_stock_items(&self, organization_id: i64) -> Result<Vec<StockItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, organization_id, name, sku, quantity, reorder_level, unit_cost
            FROM stock_items
            WHERE organization_id = ?
            ORDER BY name, id
            "#,
        )?;
        let items = stmt
            .query_map(params![organization_id], |row| {
                Ok(StockItem {
                    id: row.get(0)?,
                    organization_id: row.get(1)?,
                    name: row.get(2)?,
                    sku: row.get(3)?,
                    quantity: row.get(4)?,
                    reorder_level: row.get(5)?,
                    unit_cost: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn set_stock_quantity(&self, organization_id: i64, id: i64, quantity: f64) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE stock_items SET quantity = ? WHERE organization_id = ? AND id = ?",
            params![quantity, organization_id, id],
        )?;
        Ok(updated > 0)
    }
}
