//! Customers, invoices and quotes

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::money::insert_movement_tx;
use super::{fmt_datetime, parse_date, parse_datetime, parse_text, Database, MovementInsert};
use crate::error::{Error, Result};
use crate::models::{Customer, Invoice, InvoiceStatus, NewMovement, Quote};

/// Invoice to create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub customer_id: i64,
    pub description: Option<String>,
    pub amount: f64,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// Aggregates over sent, unpaid invoices
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InvoiceSummary {
    pub overdue_count: i64,
    pub overdue_amount: f64,
    pub outstanding_count: i64,
    pub outstanding_amount: f64,
}

const INVOICE_SELECT: &str = r#"
    SELECT i.id, i.organization_id, i.customer_id, c.name, i.number, i.description, i.amount,
           i.status, i.issue_date, i.due_date, i.paid_date, i.reminders_sent, i.last_reminder_at
    FROM invoices i
    JOIN customers c ON c.id = i.customer_id
"#;

fn row_to_invoice(row: &rusqlite::Row) -> rusqlite::Result<Invoice> {
    let status: String = row.get(7)?;
    let issue_date: String = row.get(8)?;
    let due_date: String = row.get(9)?;
    let paid_date: Option<String> = row.get(10)?;
    let last_reminder_at: Option<String> = row.get(12)?;
    Ok(Invoice {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        customer_id: row.get(2)?,
        customer_name: row.get(3)?,
        number: row.get(4)?,
        description: row.get(5)?,
        amount: row.get(6)?,
        status: parse_text(7, &status)?,
        issue_date: parse_date(&issue_date)?,
        due_date: parse_date(&due_date)?,
        paid_date: paid_date.as_deref().map(parse_date).transpose()?,
        reminders_sent: row.get(11)?,
        last_reminder_at: last_reminder_at.map(|s| parse_datetime(&s)),
    })
}

const QUOTE_SELECT: &str = r#"
    SELECT q.id, q.organization_id, q.customer_id, c.name, q.amount, q.status, q.issued_date,
           q.follow_ups, q.last_follow_up_at
    FROM quotes q
    JOIN customers c ON c.id = q.customer_id
"#;

fn row_to_quote(row: &rusqlite::Row) -> rusqlite::Result<Quote> {
    let status: String = row.get(5)?;
    let issued: String = row.get(6)?;
    let last: Option<String> = row.get(8)?;
    Ok(Quote {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        customer_id: row.get(2)?,
        customer_name: row.get(3)?,
        amount: row.get(4)?,
        status: parse_text(5, &status)?,
        issued_date: parse_date(&issued)?,
        follow_ups: row.get(7)?,
        last_follow_up_at: last.map(|s| parse_datetime(&s)),
    })
}

impl Database {
    // ========== Customers ==========

    pub fn create_customer(
        &self,
        organization_id: i64,
        name: &str,
        email: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO customers (organization_id, name, email) VALUES (?, ?, ?)",
            params![organization_id, name.trim(), email],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Case-insensitive lookup by name
    pub fn find_customer(&self, organization_id: i64, name: &str) -> Result<Option<Customer>> {
        let conn = self.conn()?;
        let customer = conn
            .query_row(
                "SELECT id, organization_id, name, email FROM customers WHERE organization_id = ? AND name = ?",
                params![organization_id, name.trim()],
                |row| {
                    Ok(Customer {
                        id: row.get(0)?,
                        organization_id: row.get(1)?,
                        name: row.get(2)?,
                        email: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(customer)
    }

    pub fn find_or_create_customer(&self, organization_id: i64, name: &str) -> Result<i64> {
        match self.find_customer(organization_id, name)? {
            Some(customer) => Ok(customer.id),
            None => self.create_customer(organization_id, name, None),
        }
    }

    pub fn count_customers(&self, organization_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM customers WHERE organization_id = ?",
            params![organization_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ========== Invoices ==========

    /// Create an invoice numbered `INV-0001`, `INV-0002`, ... per organization
    pub fn create_invoice(
        &self,
        organization_id: i64,
        invoice: &NewInvoice,
        now: DateTime<Utc>,
    ) -> Result<Invoice> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let owned: Option<i64> = tx
            .query_row(
                "SELECT id FROM customers WHERE organization_id = ? AND id = ?",
                params![organization_id, invoice.customer_id],
                |row| row.get(0),
            )
            .optional()?;
        if owned.is_none() {
            return Err(Error::NotFound(format!("Customer {}", invoice.customer_id)));
        }

        let seq: i64 = tx.query_row(
            "SELECT COUNT(*) + 1 FROM invoices WHERE organization_id = ?",
            params![organization_id],
            |row| row.get(0),
        )?;
        let number = format!("INV-{:04}", seq);

        tx.execute(
            r#"
            INSERT INTO invoices (organization_id, customer_id, number, description, amount,
                                  status, issue_date, due_date, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                organization_id,
                invoice.customer_id,
                number,
                invoice.description,
                invoice.amount,
                invoice.status.as_str(),
                invoice.issue_date.to_string(),
                invoice.due_date.to_string(),
                fmt_datetime(now),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        self.get_invoice(organization_id, id)?
            .ok_or_else(|| Error::NotFound(format!("Invoice {}", id)))
    }

    pub fn get_invoice(&self, organization_id: i64, id: i64) -> Result<Option<Invoice>> {
        let conn = self.conn()?;
        let sql = format!("{} WHERE i.organization_id = ? AND i.id = ?", INVOICE_SELECT);
        let invoice = conn
            .query_row(&sql, params![organization_id, id], row_to_invoice)
            .optional()?;
        Ok(invoice)
    }

    pub fn find_invoice_by_number(
        &self,
        organization_id: i64,
        number: &str,
    ) -> Result<Option<Invoice>> {
        let conn = self.conn()?;
        let sql = format!(
            "{} WHERE i.organization_id = ? AND upper(i.number) = upper(?)",
            INVOICE_SELECT
        );
        let invoice = conn
            .query_row(&sql, params![organization_id, number.trim()], row_to_invoice)
            .optional()?;
        Ok(invoice)
    }

    /// List invoices, newest first
    pub fn list_invoices(
        &self,
        organization_id: i64,
        status: Option<InvoiceStatus>,
        limit: i64,
    ) -> Result<Vec<Invoice>> {
        let conn = self.conn()?;
        let invoices = if let Some(status) = status {
            let sql = format!(
                "{} WHERE i.organization_id = ? AND i.status = ? ORDER BY i.issue_date DESC, i.id DESC LIMIT ?",
                INVOICE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![organization_id, status.as_str(), limit],
                row_to_invoice,
            )?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            let sql = format!(
                "{} WHERE i.organization_id = ? ORDER BY i.issue_date DESC, i.id DESC LIMIT ?",
                INVOICE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![organization_id, limit], row_to_invoice)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(invoices)
    }

    /// Sent invoices due before `today`, most overdue first
    pub fn list_overdue_invoices(
        &self,
        organization_id: i64,
        today: NaiveDate,
    ) -> Result<Vec<Invoice>> {
        let conn = self.conn()?;
        let sql = format!(
            "{} WHERE i.organization_id = ? AND i.status = 'sent' AND i.due_date < ? ORDER BY i.due_date, i.id",
            INVOICE_SELECT
        );
        let mut stmt = conn.prepare(&sql)?;
        let invoices = stmt
            .query_map(params![organization_id, today.to_string()], row_to_invoice)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(invoices)
    }

    /// Sent, unpaid invoices of one customer, oldest due first
    pub fn list_open_invoices_for_customer(
        &self,
        organization_id: i64,
        customer_name: &str,
    ) -> Result<Vec<Invoice>> {
        let conn = self.conn()?;
        let sql = format!(
            "{} WHERE i.organization_id = ? AND i.status = 'sent' AND c.name = ? ORDER BY i.due_date, i.id",
            INVOICE_SELECT
        );
        let mut stmt = conn.prepare(&sql)?;
        let invoices = stmt
            .query_map(params![organization_id, customer_name.trim()], row_to_invoice)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(invoices)
    }

    /// Mark a sent or draft invoice paid. Returns false if it was not payable.
    pub fn mark_invoice_paid(
        &self,
        organization_id: i64,
        id: i64,
        paid_date: NaiveDate,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE invoices SET status = 'paid', paid_date = ?
            WHERE organization_id = ? AND id = ? AND status IN ('sent', 'draft')
            "#,
            params![paid_date.to_string(), organization_id, id],
        )?;
        Ok(updated > 0)
    }

    /// Mark an open invoice paid and record its payment movement atomically
    ///
    /// Returns `None`, with nothing written, when the invoice is no longer open.
    pub fn settle_invoice(
        &self,
        organization_id: i64,
        id: i64,
        payment: &NewMovement,
        now: DateTime<Utc>,
    ) -> Result<Option<MovementInsert>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let updated = tx.execute(
            r#"
            UPDATE invoices SET status = 'paid', paid_date = ?
            WHERE organization_id = ? AND id = ? AND status IN ('sent', 'draft')
            "#,
            params![payment.date.to_string(), organization_id, id],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        let movement = insert_movement_tx(&tx, organization_id, payment, now)?;
        tx.commit()?;
        Ok(Some(movement))
    }

    pub fn record_invoice_reminder(
        &self,
        organization_id: i64,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE invoices SET reminders_sent = reminders_sent + 1, last_reminder_at = ?
            WHERE organization_id = ? AND id = ? AND status = 'sent'
            "#,
            params![fmt_datetime(now), organization_id, id],
        )?;
        Ok(updated > 0)
    }

    /// Value of sent or paid invoices issued inside an inclusive range
    pub fn invoiced_revenue(
        &self,
        organization_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<f64> {
        let conn = self.conn()?;
        let total: f64 = conn.query_row(
            r#"
            SELECT COALESCE(SUM(amount), 0) FROM invoices
            WHERE organization_id = ? AND status IN ('sent', 'paid')
              AND issue_date >= ? AND issue_date <= ?
            "#,
            params![organization_id, start.to_string(), end.to_string()],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Sent-unpaid invoice value falling due inside an inclusive range
    pub fn expected_invoice_income(
        &self,
        organization_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<f64> {
        let conn = self.conn()?;
        let total: f64 = conn.query_row(
            r#"
            SELECT COALESCE(SUM(amount), 0) FROM invoices
            WHERE organization_id = ? AND status = 'sent' AND due_date >= ? AND due_date <= ?
            "#,
            params![organization_id, start.to_string(), end.to_string()],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    pub fn invoice_summary(&self, organization_id: i64, today: NaiveDate) -> Result<InvoiceSummary> {
        let conn = self.conn()?;
        let summary = conn.query_row(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN due_date < ?2 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN due_date < ?2 THEN amount ELSE 0 END), 0),
                COUNT(*),
                COALESCE(SUM(amount), 0)
            FROM invoices
            WHERE organization_id = ?1 AND status = 'sent'
            "#,
            params![organization_id, today.to_string()],
            |row| {
                Ok(InvoiceSummary {
                    overdue_count: row.get(0)?,
                    overdue_amount: row.get(1)?,
                    outstanding_count: row.get(2)?,
                    outstanding_amount: row.get(3)?,
                })
            },
        )?;
        Ok(summary)
    }

    // ========== Quotes ==========

    pub fn create_quote(
        &self,
        organization_id: i64,
        customer_id: i64,
        amount: f64,
        issued_date: NaiveDate,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO quotes (organization_id, customer_id, amount, issued_date) VALUES (?, ?, ?, ?)",
            params![organization_id, customer_id, amount, issued_date.to_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Open quotes, optionally for one customer, oldest first
    pub fn list_open_quotes(
        &self,
        organization_id: i64,
        customer_name: Option<&str>,
    ) -> Result<Vec<Quote>> {
        let conn = self.conn()?;
        let quotes = match customer_name {
            Some(name) => {
                let sql = format!(
                    "{} WHERE q.organization_id = ? AND q.status = 'open' AND c.name = ? ORDER BY q.issued_date, q.id",
                    QUOTE_SELECT
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![organization_id, name.trim()], row_to_quote)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let sql = format!(
                    "{} WHERE q.organization_id = ? AND q.status = 'open' ORDER BY q.issued_date, q.id",
                    QUOTE_SELECT
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![organization_id], row_to_quote)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(quotes)
    }

    pub fn count_open_quotes(&self, organization_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM quotes WHERE organization_id = ? AND status = 'open'",
            params![organization_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn record_quote_follow_up(
        &self,
        organization_id: i64,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE quotes SET follow_ups = follow_ups + 1, last_follow_up_at = ?
            WHERE organization_id = ? AND id = ? AND status = 'open'
            "#,
            params![fmt_datetime(now), organization_id, id],
        )?;
        Ok(updated > 0)
    }
}
