//! Organization state and the transactional cycle commit

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};

use super::{fmt_datetime, parse_datetime, parse_json, parse_text, Database};
use crate::decision::ReconcilePlan;
use crate::error::{Error, Result};
use crate::models::{Decision, InsightDraft, PerceptionSnapshot, State};

const STATE_COLUMNS: &str = "id, organization_id, focus_area, urgency, context, mood, priorities, \
     perception_data, last_cycle_at, created_at, updated_at";

fn row_to_state(row: &rusqlite::Row) -> rusqlite::Result<State> {
    let mood: String = row.get(5)?;
    let perception: String = row.get(7)?;
    let last_cycle_at: Option<String> = row.get(8)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;
    Ok(State {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        focus_area: row.get(2)?,
        urgency: row.get(3)?,
        context: row.get(4)?,
        mood: parse_text(5, &mood)?,
        priorities: parse_json(row.get(6)?),
        perception_data: serde_json::from_str(&perception).unwrap_or(serde_json::Value::Null),
        last_cycle_at: last_cycle_at.map(|s| parse_datetime(&s)),
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

fn insert_insight(
    tx: &Transaction,
    organization_id: i64,
    state_id: i64,
    draft: &InsightDraft,
    now: &str,
) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO insights (organization_id, source_state_id, insight_type, category, title,
                              description, priority, is_actionable, suggested_actions, action_url,
                              status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?)
        "#,
        params![
            organization_id,
            state_id,
            draft.insight_type.as_str(),
            draft.category,
            draft.title,
            draft.description,
            draft.priority,
            draft.is_actionable as i64,
            serde_json::to_string(&draft.suggested_actions)?,
            draft.action_url,
            now,
            now,
        ],
    )?;
    Ok(())
}

impl Database {
    pub fn get_state(&self, organization_id: i64) -> Result<Option<State>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM states WHERE organization_id = ?",
            STATE_COLUMNS
        );
        let state = conn
            .query_row(&sql, params![organization_id], row_to_state)
            .optional()?;
        Ok(state)
    }

    /// Current state, created with neutral defaults on first access
    pub fn get_or_create_state(&self, organization_id: i64, now: DateTime<Utc>) -> Result<State> {
        {
            let conn = self.conn()?;
            let now = fmt_datetime(now);
            conn.execute(
                r#"
                INSERT OR IGNORE INTO states (organization_id, created_at, updated_at)
                VALUES (?, ?, ?)
                "#,
                params![organization_id, now, now],
            )?;
        }
        self.get_state(organization_id)?
            .ok_or_else(|| Error::NotFound(format!("State for organization {}", organization_id)))
    }

    /// Write the cycle's state and reconcile insights in one transaction
    ///
    /// Updates target only still-active rows; an identity closed by the user since
    /// the plan was computed is re-created instead.
    pub fn commit_cycle(
        &self,
        organization_id: i64,
        decision: &Decision,
        perception: &PerceptionSnapshot,
        plan: &ReconcilePlan,
        now: DateTime<Utc>,
    ) -> Result<State> {
        let now_str = fmt_datetime(now);
        let priorities = serde_json::to_string(&decision.priorities)?;
        let perception = serde_json::to_string(perception)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO states (organization_id, focus_area, urgency, context, mood, priorities,
                                perception_data, last_cycle_at, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?8)
            ON CONFLICT(organization_id) DO UPDATE SET
                focus_area = excluded.focus_area,
                urgency = excluded.urgency,
                context = excluded.context,
                mood = excluded.mood,
                priorities = excluded.priorities,
                perception_data = excluded.perception_data,
                last_cycle_at = excluded.last_cycle_at,
                updated_at = excluded.updated_at
            "#,
            params![
                organization_id,
                decision.focus_area,
                decision.urgency,
                decision.context,
                decision.mood.as_str(),
                priorities,
                perception,
                now_str,
            ],
        )?;

        let state_id: i64 = tx.query_row(
            "SELECT id FROM states WHERE organization_id = ?",
            params![organization_id],
            |row| row.get(0),
        )?;

        for id in &plan.expire {
            tx.execute(
                r#"
                UPDATE insights SET status = 'expired', updated_at = ?
                WHERE organization_id = ? AND id = ? AND status = 'active'
                "#,
                params![now_str, organization_id, id],
            )?;
        }

        for (id, draft) in &plan.update {
            let updated = tx.execute(
                r#"
                UPDATE insights SET
                    source_state_id = ?, insight_type = ?, description = ?, priority = ?,
                    is_actionable = ?, suggested_actions = ?, action_url = ?, updated_at = ?
                WHERE organization_id = ? AND id = ? AND status = 'active'
                "#,
                params![
                    state_id,
                    draft.insight_type.as_str(),
                    draft.description,
                    draft.priority,
                    draft.is_actionable as i64,
                    serde_json::to_string(&draft.suggested_actions)?,
                    draft.action_url,
                    now_str,
                    organization_id,
                    id,
                ],
            )?;
            if updated == 0 {
                insert_insight(&tx, organization_id, state_id, draft, &now_str)?;
            }
        }

        for draft in &plan.create {
            insert_insight(&tx, organization_id, state_id, draft, &now_str)?;
        }

        tx.commit()?;

        self.get_state(organization_id)?
            .ok_or_else(|| Error::NotFound(format!("State for organization {}", organization_id)))
    }
}
