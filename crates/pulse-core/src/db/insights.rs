//! Insight database operations

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{fmt_datetime, parse_datetime, parse_json, parse_text, Database};
use crate::error::{Error, Result};
use crate::models::{Insight, InsightStatus};

pub(super) const INSIGHT_COLUMNS: &str = "id, organization_id, source_state_id, insight_type, \
     category, title, description, priority, is_actionable, suggested_actions, action_url, \
     status, expires_at, created_at, updated_at";

pub(super) fn row_to_insight(row: &rusqlite::Row) -> rusqlite::Result<Insight> {
    let insight_type: String = row.get(3)?;
    let status: String = row.get(11)?;
    let expires_at: Option<String> = row.get(12)?;
    let created_at: String = row.get(13)?;
    let updated_at: String = row.get(14)?;

    Ok(Insight {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        source_state_id: row.get(2)?,
        insight_type: parse_text(3, &insight_type)?,
        category: row.get(4)?,
        title: row.get(5)?,
        description: row.get(6)?,
        priority: row.get(7)?,
        is_actionable: row.get::<_, i64>(8)? != 0,
        suggested_actions: parse_json(row.get(9)?),
        action_url: row.get(10)?,
        status: parse_text(11, &status)?,
        expires_at: expires_at.map(|s| parse_datetime(&s)),
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

impl Database {
    /// Active insights, highest priority first
    pub fn list_active_insights(&self, organization_id: i64) -> Result<Vec<Insight>> {
        self.list_insights(organization_id, Some(InsightStatus::Active), i64::MAX)
    }

    /// List insights with optional status filter, highest priority first
    pub fn list_insights(
        &self,
        organization_id: i64,
        status: Option<InsightStatus>,
        limit: i64,
    ) -> Result<Vec<Insight>> {
        let conn = self.conn()?;

        let insights = if let Some(s) = status {
            let sql = format!(
                "SELECT {} FROM insights WHERE organization_id = ? AND status = ? \
                 ORDER BY priority DESC, updated_at DESC, id LIMIT ?",
                INSIGHT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![organization_id, s.as_str(), limit], row_to_insight)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            let sql = format!(
                "SELECT {} FROM insights WHERE organization_id = ? \
                 ORDER BY priority DESC, updated_at DESC, id LIMIT ?",
                INSIGHT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![organization_id, limit], row_to_insight)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        Ok(insights)
    }

    pub fn get_insight(&self, organization_id: i64, id: i64) -> Result<Option<Insight>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM insights WHERE organization_id = ? AND id = ?",
            INSIGHT_COLUMNS
        );
        let insight = conn
            .query_row(&sql, params![organization_id, id], row_to_insight)
            .optional()?;
        Ok(insight)
    }

    /// Close an active insight as dismissed or completed
    pub fn close_insight(
        &self,
        organization_id: i64,
        id: i64,
        status: InsightStatus,
        now: DateTime<Utc>,
    ) -> Result<Insight> {
        if !matches!(status, InsightStatus::Dismissed | InsightStatus::Completed) {
            return Err(Error::InvalidState(format!(
                "Insights can only be dismissed or completed, not {}",
                status
            )));
        }

        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE insights SET status = ?, updated_at = ?
            WHERE organization_id = ? AND id = ? AND status = 'active'
            "#,
            params![status.as_str(), fmt_datetime(now), organization_id, id],
        )?;
        drop(conn);

        let insight = self
            .get_insight(organization_id, id)?
            .ok_or_else(|| Error::NotFound(format!("Insight {}", id)))?;

        if updated == 0 {
            return Err(Error::InvalidState(format!(
                "Insight {} is {}, not active",
                id, insight.status
            )));
        }
        Ok(insight)
    }

    pub fn count_active_insights(&self, organization_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM insights WHERE organization_id = ? AND status = 'active'",
            params![organization_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Retention sweep: hard-delete inactive insights last updated before `cutoff`
    pub fn purge_inactive_insights(
        &self,
        organization_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            r#"
            DELETE FROM insights
            WHERE organization_id = ? AND status != 'active' AND updated_at < ?
            "#,
            params![organization_id, fmt_datetime(cutoff)],
        )?;
        Ok(deleted)
    }
}
