//! Accounts, movements and budget lines

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Transaction};
use sha2::{Digest, Sha256};

use super::{fmt_datetime, parse_date, parse_datetime, parse_text, Database};
use crate::error::{Error, Result};
use crate::models::{Account, BudgetLine, Direction, Movement, NewMovement};

/// Result of inserting a movement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementInsert {
    Inserted(i64),
    /// Same import hash already recorded for the organization
    Duplicate(i64),
}

impl MovementInsert {
    pub fn id(&self) -> i64 {
        match self {
            Self::Inserted(id) | Self::Duplicate(id) => *id,
        }
    }
}

/// Income and expense sums over a date range
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeriodTotals {
    pub income: f64,
    pub expenses: f64,
}

impl PeriodTotals {
    pub fn net(&self) -> f64 {
        self.income - self.expenses
    }
}

/// Optional filters for listing movements
#[derive(Debug, Clone, Default)]
pub struct MovementFilter {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub category: Option<String>,
    pub direction: Option<Direction>,
    pub limit: Option<i64>,
}

/// Deduplication hash for a movement
pub fn movement_hash(
    date: NaiveDate,
    description: &str,
    amount: f64,
    direction: Direction,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(date.to_string().as_bytes());
    hasher.update(description.trim().to_lowercase().as_bytes());
    hasher.update(amount.to_be_bytes());
    hasher.update(direction.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

const MOVEMENT_COLUMNS: &str = "id, organization_id, account_id, date, description, amount, \
     direction, category, import_hash, created_at";

fn row_to_movement(row: &rusqlite::Row) -> rusqlite::Result<Movement> {
    let date: String = row.get(3)?;
    let direction: String = row.get(6)?;
    let created_at: String = row.get(9)?;
    Ok(Movement {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        account_id: row.get(2)?,
        date: parse_date(&date)?,
        description: row.get(4)?,
        amount: row.get(5)?,
        direction: parse_text(6, &direction)?,
        category: row.get(7)?,
        import_hash: row.get(8)?,
        created_at: parse_datetime(&created_at),
    })
}

impl Database {
    // ========== Accounts ==========

    pub fn create_account(&self, organization_id: i64, name: &str, balance: f64) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO accounts (organization_id, name, balance) VALUES (?, ?, ?)",
            params![organization_id, name, balance],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_accounts(&self, organization_id: i64) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, organization_id, name, balance FROM accounts WHERE organization_id = ? ORDER BY id",
        )?;
        let accounts = stmt
            .query_map(params![organization_id], |row| {
                Ok(Account {
                    id: row.get(0)?,
                    organization_id: row.get(1)?,
                    name: row.get(2)?,
                    balance: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    /// Sum of all account balances
    pub fn cash_balance(&self, organization_id: i64) -> Result<f64> {
        let conn = self.conn()?;
        let total: f64 = conn.query_row(
            "SELECT COALESCE(SUM(balance), 0) FROM accounts WHERE organization_id = ?",
            params![organization_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// First account of the organization, used when a movement names none
    pub fn default_account_id(&self, organization_id: i64) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM accounts WHERE organization_id = ? ORDER BY id LIMIT 1",
                params![organization_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    // ========== Movements ==========

    /// Insert a movement and apply it to its account balance, skipping duplicates
    pub fn insert_movement(
        &self,
        organization_id: i64,
        movement: &NewMovement,
        now: DateTime<Utc>,
    ) -> Result<MovementInsert> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let inserted = insert_movement_tx(&tx, organization_id, movement, now)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Whether a movement with the same dedup hash is already recorded
    pub fn movement_exists(&self, organization_id: i64, movement: &NewMovement) -> Result<bool> {
        let hash = movement_hash(
            movement.date,
            &movement.description,
            movement.amount,
            movement.direction,
        );
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM movements WHERE organization_id = ? AND import_hash = ?",
                params![organization_id, hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get_movement(&self, organization_id: i64, id: i64) -> Result<Option<Movement>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM movements WHERE organization_id = ? AND id = ?",
            MOVEMENT_COLUMNS
        );
        let movement = conn
            .query_row(&sql, params![organization_id, id], row_to_movement)
            .optional()?;
        Ok(movement)
    }

    /// List movements, newest first
    pub fn list_movements(
        &self,
        organization_id: i64,
        filter: &MovementFilter,
    ) -> Result<Vec<Movement>> {
        let conn = self.conn()?;

        let mut sql = format!(
            "SELECT {} FROM movements WHERE organization_id = ?",
            MOVEMENT_COLUMNS
        );
        let mut values: Vec<Value> = vec![Value::Integer(organization_id)];

        if let Some(start) = filter.start {
            sql.push_str(" AND date >= ?");
            values.push(Value::Text(start.to_string()));
        }
        if let Some(end) = filter.end {
            sql.push_str(" AND date <= ?");
            values.push(Value::Text(end.to_string()));
        }
        if let Some(category) = &filter.category {
            sql.push_str(" AND lower(category) = lower(?)");
            values.push(Value::Text(category.clone()));
        }
        if let Some(direction) = filter.direction {
            sql.push_str(" AND direction = ?");
            values.push(Value::Text(direction.as_str().to_string()));
        }
        sql.push_str(" ORDER BY date DESC, id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit));
        }

        let mut stmt = conn.prepare(&sql)?;
        let movements = stmt
            .query_map(params_from_iter(values), row_to_movement)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(movements)
    }

    /// Income and expense totals for an inclusive date range
    pub fn movement_totals(
        &self,
        organization_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PeriodTotals> {
        let conn = self.conn()?;
        let totals = conn.query_row(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN direction = 'income' THEN amount ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN direction = 'expense' THEN amount ELSE 0 END), 0)
            FROM movements
            WHERE organization_id = ? AND date >= ? AND date <= ?
            "#,
            params![organization_id, start.to_string(), end.to_string()],
            |row| {
                Ok(PeriodTotals {
                    income: row.get(0)?,
                    expenses: row.get(1)?,
                })
            },
        )?;
        Ok(totals)
    }

    /// Expense totals grouped by category (uncategorized grouped as "uncategorized")
    pub fn expenses_by_category(
        &self,
        organization_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(String, f64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT COALESCE(category, 'uncategorized') AS cat, SUM(amount) AS total
            FROM movements
            WHERE organization_id = ? AND direction = 'expense' AND date >= ? AND date <= ?
            GROUP BY cat
            ORDER BY total DESC
            "#,
        )?;
        let rows = stmt
            .query_map(
                params![organization_id, start.to_string(), end.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_uncategorized_movements(&self, organization_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM movements WHERE organization_id = ? AND category IS NULL",
            params![organization_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Uncategorized movements, oldest first
    pub fn list_uncategorized_movements(
        &self,
        organization_id: i64,
        limit: i64,
    ) -> Result<Vec<Movement>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM movements WHERE organization_id = ? AND category IS NULL \
             ORDER BY date, id LIMIT ?",
            MOVEMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let movements = stmt
            .query_map(params![organization_id, limit], row_to_movement)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(movements)
    }

    /// Set a movement's category. Returns false when the movement is not in the organization.
    pub fn set_movement_category(
        &self,
        organization_id: i64,
        id: i64,
        category: &str,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE movements SET category = ? WHERE organization_id = ? AND id = ?",
            params![category, organization_id, id],
        )?;
        Ok(updated > 0)
    }

    // ========== Budget lines ==========

    pub fn create_budget_line(
        &self,
        organization_id: i64,
        name: &str,
        category: &str,
        amount: f64,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<i64> {
        if period_end < period_start {
            return Err(Error::InvalidData(
                "Budget period ends before it starts".to_string(),
            ));
        }
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO budget_lines (organization_id, name, category, amount, period_start, period_end)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                organization_id,
                name,
                category,
                amount,
                period_start.to_string(),
                period_end.to_string()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Budget lines whose period covers `on`, with spent aggregated from expense
    /// movements of the line's category inside the period
    pub fn list_budget_lines(&self, organization_id: i64, on: NaiveDate) -> Result<Vec<BudgetLine>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT b.id, b.organization_id, b.name, b.category, b.amount,
                   COALESCE((
                       SELECT SUM(m.amount) FROM movements m
                       WHERE m.organization_id = b.organization_id
                         AND m.direction = 'expense'
                         AND lower(m.category) = lower(b.category)
                         AND m.date >= b.period_start AND m.date <= b.period_end
                   ), 0) AS spent,
                   b.period_start, b.period_end
            FROM budget_lines b
            WHERE b.organization_id = ? AND b.period_start <= ? AND b.period_end >= ?
            ORDER BY b.id
            "#,
        )?;
        let on = on.to_string();
        let lines = stmt
            .query_map(params![organization_id, on, on], |row| {
                let start: String = row.get(6)?;
                let end: String = row.get(7)?;
                Ok(BudgetLine {
                    id: row.get(0)?,
                    organization_id: row.get(1)?,
                    name: row.get(2)?,
                    category: row.get(3)?,
                    amount: row.get(4)?,
                    spent: row.get(5)?,
                    period_start: parse_date(&start)?,
                    period_end: parse_date(&end)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(lines)
    }
}

/// Movement insert inside a caller-owned transaction
pub(super) fn insert_movement_tx(
    tx: &Transaction<'_>,
    organization_id: i64,
    movement: &NewMovement,
    now: DateTime<Utc>,
) -> Result<MovementInsert> {
    if movement.amount <= 0.0 || !movement.amount.is_finite() {
        return Err(Error::InvalidData(format!(
            "Movement amount must be positive, got {}",
            movement.amount
        )));
    }

    let hash = movement_hash(
        movement.date,
        &movement.description,
        movement.amount,
        movement.direction,
    );

    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM movements WHERE organization_id = ? AND import_hash = ?",
            params![organization_id, hash],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        return Ok(MovementInsert::Duplicate(id));
    }

    if let Some(account_id) = movement.account_id {
        let updated = tx.execute(
            "UPDATE accounts SET balance = balance + ? WHERE id = ? AND organization_id = ?",
            params![movement.amount * movement.direction.sign(), account_id, organization_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Account {}", account_id)));
        }
    }

    tx.execute(
        r#"
        INSERT INTO movements (organization_id, account_id, date, description, amount,
                               direction, category, import_hash, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            organization_id,
            movement.account_id,
            movement.date.to_string(),
            movement.description.trim(),
            movement.amount,
            movement.direction.as_str(),
            movement.category,
            hash,
            fmt_datetime(now),
        ],
    )?;
    Ok(MovementInsert::Inserted(tx.last_insert_rowid()))
}
