//! Team members, leave requests and payroll runs

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use super::{parse_date, Database};
use crate::error::Result;
use crate::models::{LeaveStatus, PayrollRun, TeamMember};

fn row_to_payroll(row: &rusqlite::Row) -> rusqlite::Result<PayrollRun> {
    let pay_date: String = row.get(2)?;
    Ok(PayrollRun {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        pay_date: parse_date(&pay_date)?,
        amount: row.get(3)?,
        status: row.get(4)?,
    })
}

impl Database {
    pub fn create_team_member(
        &self,
        organization_id: i64,
        name: &str,
        role: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO team_members (organization_id, name, role) VALUES (?, ?, ?)",
            params![organization_id, name, role],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_team_members(&self, organization_id: i64) -> Result<Vec<TeamMember>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, organization_id, name, role, active FROM team_members WHERE organization_id = ? ORDER BY name",
        )?;
        let members = stmt
            .query_map(params![organization_id], |row| {
                Ok(TeamMember {
                    id: row.get(0)?,
                    organization_id: row.get(1)?,
                    name: row.get(2)?,
                    role: row.get(3)?,
                    active: row.get::<_, i64>(4)? != 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(members)
    }

    pub fn count_active_team_members(&self, organization_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM team_members WHERE organization_id = ? AND active = 1",
            params![organization_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn create_leave_request(
        &self,
        organization_id: i64,
        member_id: i64,
        start: NaiveDate,
        end: NaiveDate,
        status: LeaveStatus,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO leave_requests (organization_id, member_id, start_date, end_date, status)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                organization_id,
                member_id,
                start.to_string(),
                end.to_string(),
                status.as_str()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn count_pending_leave(&self, organization_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM leave_requests WHERE organization_id = ? AND status = 'pending'",
            params![organization_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Approved leave starting inside `[from, until]`
    pub fn count_upcoming_leave(
        &self,
        organization_id: i64,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM leave_requests
            WHERE organization_id = ? AND status = 'approved' AND start_date >= ? AND start_date <= ?
            "#,
            params![organization_id, from.to_string(), until.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn create_payroll_run(
        &self,
        organization_id: i64,
        pay_date: NaiveDate,
        amount: f64,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO payroll_runs (organization_id, pay_date, amount) VALUES (?, ?, ?)",
            params![organization_id, pay_date.to_string(), amount],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Earliest scheduled payroll on or after `today`
    pub fn next_payroll_run(
        &self,
        organization_id: i64,
        today: NaiveDate,
    ) -> Result<Option<PayrollRun>> {
        let conn = self.conn()?;
        let run = conn
            .query_row(
                r#"
                SELECT id, organization_id, pay_date, amount, status FROM payroll_runs
                WHERE organization_id = ? AND status = 'scheduled' AND pay_date >= ?
                ORDER BY pay_date, id
                LIMIT 1
                "#,
                params![organization_id, today.to_string()],
                row_to_payroll,
            )
            .optional()?;
        Ok(run)
    }

    /// Scheduled payroll with pay date in `(after, until]`
    pub fn scheduled_payroll_between(
        &self,
        organization_id: i64,
        after: NaiveDate,
        until: NaiveDate,
    ) -> Result<f64> {
        let conn = self.conn()?;
        let total: f64 = conn.query_row(
            r#"
            SELECT COALESCE(SUM(amount), 0) FROM payroll_runs
            WHERE organization_id = ? AND status = 'scheduled' AND pay_date > ? AND pay_date <= ?
            "#,
            params![organization_id, after.to_string(), until.to_string()],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    pub fn list_payroll_runs(&self, organization_id: i64, limit: i64) -> Result<Vec<PayrollRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, organization_id, pay_date, amount, status FROM payroll_runs
            WHERE organization_id = ?
            ORDER BY pay_date DESC, id DESC
            LIMIT ?
            "#,
        )?;
        let runs = stmt
            .query_map(params![organization_id, limit], row_to_payroll)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(runs)
    }
}
