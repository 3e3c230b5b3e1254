//! Action records and learned action patterns
//!
//! Status transitions are compare-and-set updates (`WHERE status = ?`), so two
//! concurrent requests can never both move an action out of the same status.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use super::{fmt_datetime, parse_datetime, parse_json, parse_text, Database};
use crate::actions::{ActionParams, Preview};
use crate::error::{Error, Result};
use crate::models::{Action, ActionPattern, ActionStatus, ActionType};

/// A lifecycle transition with the status it must start from
#[derive(Debug, Clone, PartialEq)]
pub enum ActionUpdate {
    /// pending -> confirmed
    Confirm,
    /// pending -> cancelled
    Cancel,
    /// confirmed -> executing
    Claim,
    /// executing -> executed
    Succeed(serde_json::Value),
    /// executing -> failed
    Fail(String),
}

impl ActionUpdate {
    pub fn from_status(&self) -> ActionStatus {
        match self {
            Self::Confirm | Self::Cancel => ActionStatus::Pending,
            Self::Claim => ActionStatus::Confirmed,
            Self::Succeed(_) | Self::Fail(_) => ActionStatus::Executing,
        }
    }

    pub fn to_status(&self) -> ActionStatus {
        match self {
            Self::Confirm => ActionStatus::Confirmed,
            Self::Cancel => ActionStatus::Cancelled,
            Self::Claim => ActionStatus::Executing,
            Self::Succeed(_) => ActionStatus::Executed,
            Self::Fail(_) => ActionStatus::Failed,
        }
    }
}

const ACTION_COLUMNS: &str = "id, organization_id, user_id, action_type, category, status, \
     parameters, preview, result, error_message, was_successful, rating, created_at, \
     confirmed_at, executed_at, cancelled_at";

fn json_column<T: serde::de::DeserializeOwned>(idx: usize, s: &str) -> rusqlite::Result<T> {
    serde_json::from_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_action(row: &rusqlite::Row) -> rusqlite::Result<Action> {
    let action_type: String = row.get(3)?;
    let status: String = row.get(5)?;
    let parameters: String = row.get(6)?;
    let preview: String = row.get(7)?;
    let result: Option<String> = row.get(8)?;
    let created_at: String = row.get(12)?;
    let confirmed_at: Option<String> = row.get(13)?;
    let executed_at: Option<String> = row.get(14)?;
    let cancelled_at: Option<String> = row.get(15)?;

    let action_type: ActionType = parse_text(3, &action_type)?;
    let status: ActionStatus = parse_text(5, &status)?;

    Ok(Action {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        user_id: row.get(2)?,
        action_type,
        category: row.get(4)?,
        status,
        parameters: json_column::<ActionParams>(6, &parameters)?,
        preview: json_column::<Preview>(7, &preview)?,
        result: result.and_then(|s| serde_json::from_str(&s).ok()),
        error_message: row.get(9)?,
        was_successful: row.get::<_, Option<i64>>(10)?.map(|v| v != 0),
        rating: row.get(11)?,
        created_at: parse_datetime(&created_at),
        confirmed_at: confirmed_at.map(|s| parse_datetime(&s)),
        executed_at: executed_at.map(|s| parse_datetime(&s)),
        cancelled_at: cancelled_at.map(|s| parse_datetime(&s)),
    })
}

const PATTERN_COLUMNS: &str = "id, organization_id, user_id, action_type, times_suggested, \
     times_confirmed, times_rejected, times_successful, successful_contexts, failed_contexts, \
     avg_rating, ratings_count, created_at, updated_at";

fn row_to_pattern(row: &rusqlite::Row) -> rusqlite::Result<ActionPattern> {
    let action_type: String = row.get(3)?;
    let created_at: String = row.get(12)?;
    let updated_at: String = row.get(13)?;
    let action_type: ActionType = parse_text(3, &action_type)?;
    Ok(ActionPattern {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        user_id: row.get(2)?,
        action_type,
        times_suggested: row.get(4)?,
        times_confirmed: row.get(5)?,
        times_rejected: row.get(6)?,
        times_successful: row.get(7)?,
        successful_contexts: parse_json(row.get(8)?),
        failed_contexts: parse_json(row.get(9)?),
        avg_rating: row.get(10)?,
        ratings_count: row.get(11)?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

impl Database {
    // ========== Actions ==========

    /// Persist a new pending action
    #[allow(clippy::too_many_arguments)]
    pub fn insert_action(
        &self,
        organization_id: i64,
        user_id: i64,
        action_type: ActionType,
        category: &str,
        parameters: &ActionParams,
        preview: &Preview,
        now: DateTime<Utc>,
    ) -> Result<Action> {
        let id = {
            let conn = self.conn()?;
            conn.execute(
                r#"
                INSERT INTO actions (organization_id, user_id, action_type, category, status,
                                     parameters, preview, created_at)
                VALUES (?, ?, ?, ?, 'pending', ?, ?, ?)
                "#,
                params![
                    organization_id,
                    user_id,
                    action_type.as_str(),
                    category,
                    serde_json::to_string(parameters)?,
                    serde_json::to_string(preview)?,
                    fmt_datetime(now),
                ],
            )?;
            conn.last_insert_rowid()
        };

        self.get_action(organization_id, id)?
            .ok_or_else(|| Error::NotFound(format!("Action {}", id)))
    }

    pub fn get_action(&self, organization_id: i64, id: i64) -> Result<Option<Action>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM actions WHERE organization_id = ? AND id = ?",
            ACTION_COLUMNS
        );
        let action = conn
            .query_row(&sql, params![organization_id, id], row_to_action)
            .optional()?;
        Ok(action)
    }

    /// List actions, newest first
    pub fn list_actions(
        &self,
        organization_id: i64,
        status: Option<ActionStatus>,
        limit: i64,
    ) -> Result<Vec<Action>> {
        let conn = self.conn()?;
        let actions = match status {
            Some(s) => {
                let sql = format!(
                    "SELECT {} FROM actions WHERE organization_id = ? AND status = ? \
                     ORDER BY created_at DESC, id DESC LIMIT ?",
                    ACTION_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![organization_id, s.as_str(), limit], row_to_action)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM actions WHERE organization_id = ? \
                     ORDER BY created_at DESC, id DESC LIMIT ?",
                    ACTION_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![organization_id, limit], row_to_action)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(actions)
    }

    /// Apply a transition if the action is still in the required status.
    /// Returns false when another status was found (nothing written).
    pub fn update_action_status(
        &self,
        organization_id: i64,
        id: i64,
        update: &ActionUpdate,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let now = fmt_datetime(now);
        let from = update.from_status().as_str();
        let to = update.to_status().as_str();

        let updated = match update {
            ActionUpdate::Confirm => conn.execute(
                "UPDATE actions SET status = ?, confirmed_at = ? WHERE organization_id = ? AND id = ? AND status = ?",
                params![to, now, organization_id, id, from],
            )?,
            ActionUpdate::Cancel => conn.execute(
                "UPDATE actions SET status = ?, cancelled_at = ? WHERE organization_id = ? AND id = ? AND status = ?",
                params![to, now, organization_id, id, from],
            )?,
            ActionUpdate::Claim => conn.execute(
                "UPDATE actions SET status = ? WHERE organization_id = ? AND id = ? AND status = ?",
                params![to, organization_id, id, from],
            )?,
            ActionUpdate::Succeed(result) => conn.execute(
                r#"
                UPDATE actions SET status = ?, result = ?, was_successful = 1, executed_at = ?
                WHERE organization_id = ? AND id = ? AND status = ?
                "#,
                params![
                    to,
                    serde_json::to_string(result)?,
                    now,
                    organization_id,
                    id,
                    from
                ],
            )?,
            ActionUpdate::Fail(message) => conn.execute(
                r#"
                UPDATE actions SET status = ?, error_message = ?, was_successful = 0, executed_at = ?
                WHERE organization_id = ? AND id = ? AND status = ?
                "#,
                params![to, message, now, organization_id, id, from],
            )?,
        };

        Ok(updated > 0)
    }

    /// Store a rating on an executed, not yet rated action
    pub fn set_action_rating(&self, organization_id: i64, id: i64, rating: i64) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE actions SET rating = ?
            WHERE organization_id = ? AND id = ? AND status = 'executed' AND rating IS NULL
            "#,
            params![rating, organization_id, id],
        )?;
        Ok(updated > 0)
    }

    // ========== Patterns ==========

    pub fn get_action_pattern(
        &self,
        organization_id: i64,
        user_id: i64,
        action_type: ActionType,
    ) -> Result<Option<ActionPattern>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM action_patterns WHERE organization_id = ? AND user_id = ? AND action_type = ?",
            PATTERN_COLUMNS
        );
        let pattern = conn
            .query_row(
                &sql,
                params![organization_id, user_id, action_type.as_str()],
                row_to_pattern,
            )
            .optional()?;
        Ok(pattern)
    }

    pub fn list_action_patterns(
        &self,
        organization_id: i64,
        user_id: i64,
    ) -> Result<Vec<ActionPattern>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM action_patterns WHERE organization_id = ? AND user_id = ? ORDER BY action_type",
            PATTERN_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let patterns = stmt
            .query_map(params![organization_id, user_id], row_to_pattern)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(patterns)
    }

    /// Read-modify-write one pattern under an immediate transaction,
    /// creating it with zero counts first if needed
    pub fn update_action_pattern<F>(
        &self,
        organization_id: i64,
        user_id: i64,
        action_type: ActionType,
        now: DateTime<Utc>,
        apply: F,
    ) -> Result<ActionPattern>
    where
        F: FnOnce(&mut ActionPattern),
    {
        let now_str = fmt_datetime(now);
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            r#"
            INSERT OR IGNORE INTO action_patterns (organization_id, user_id, action_type, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![organization_id, user_id, action_type.as_str(), now_str, now_str],
        )?;

        let sql = format!(
            "SELECT {} FROM action_patterns WHERE organization_id = ? AND user_id = ? AND action_type = ?",
            PATTERN_COLUMNS
        );
        let mut pattern = tx.query_row(
            &sql,
            params![organization_id, user_id, action_type.as_str()],
            row_to_pattern,
        )?;

        apply(&mut pattern);
        pattern.updated_at = now;

        tx.execute(
            r#"
            UPDATE action_patterns SET
                times_suggested = ?, times_confirmed = ?, times_rejected = ?, times_successful = ?,
                successful_contexts = ?, failed_contexts = ?, avg_rating = ?, ratings_count = ?,
                updated_at = ?
            WHERE id = ?
            "#,
            params![
                pattern.times_suggested,
                pattern.times_confirmed,
                pattern.times_rejected,
                pattern.times_successful,
                serde_json::to_string(&pattern.successful_contexts)?,
                serde_json::to_string(&pattern.failed_contexts)?,
                pattern.avg_rating,
                pattern.ratings_count,
                now_str,
                pattern.id,
            ],
        )?;
        tx.commit()?;

        Ok(pattern)
    }
}
