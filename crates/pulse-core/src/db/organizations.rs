//! Organization and audit log operations

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{fmt_datetime, parse_datetime, parse_text, Database};
use crate::error::Result;
use crate::models::{AuditEntry, Organization};
use crate::personalization::Tone;

impl Database {
    /// Create an organization
    pub fn create_organization(
        &self,
        name: &str,
        currency: &str,
        tone: Tone,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO organizations (name, currency, tone, created_at) VALUES (?, ?, ?, ?)",
            params![name, currency.to_uppercase(), tone.as_str(), fmt_datetime(now)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_organization(&self, id: i64) -> Result<Option<Organization>> {
        let conn = self.conn()?;
        let org = conn
            .query_row(
                "SELECT id, name, currency, tone, created_at FROM organizations WHERE id = ?",
                params![id],
                |row| {
                    let tone: String = row.get(3)?;
                    let created_at: String = row.get(4)?;
                    Ok(Organization {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        currency: row.get(2)?,
                        tone: parse_text(3, &tone)?,
                        created_at: parse_datetime(&created_at),
                    })
                },
            )
            .optional()?;
        Ok(org)
    }

    /// Find an organization by case-insensitive name
    pub fn find_organization_by_name(&self, name: &str) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM organizations WHERE lower(name) = lower(?) LIMIT 1",
                params![name.trim()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Every organization the scheduler should cycle: registered ones plus any
    /// tenant that already has a state
    pub fn list_organization_ids(&self) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM organizations UNION SELECT organization_id FROM states ORDER BY 1",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Log an audit event
    pub fn log_audit(
        &self,
        organization_id: i64,
        user_id: Option<i64>,
        action: &str,
        entity_type: &str,
        entity_id: Option<i64>,
        details: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO audit_log (organization_id, user_id, action, entity_type, entity_id, details)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![organization_id, user_id, action, entity_type, entity_id, details],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// List audit log entries, newest first
    pub fn list_audit_log(&self, organization_id: i64, limit: i64) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, organization_id, user_id, action, entity_type, entity_id, details, created_at
            FROM audit_log
            WHERE organization_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )?;

        let entries = stmt
            .query_map(params![organization_id, limit], |row| {
                let created_at: String = row.get(7)?;
                Ok(AuditEntry {
                    id: row.get(0)?,
                    organization_id: row.get(1)?,
                    user_id: row.get(2)?,
                    action: row.get(3)?,
                    entity_type: row.get(4)?,
                    entity_id: row.get(5)?,
                    details: row.get(6)?,
                    created_at: parse_datetime(&created_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }
}
