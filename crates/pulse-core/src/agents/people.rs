//! People agent: team, leave and payroll

use chrono::Duration;

use super::Agent;
use crate::config::Thresholds;
use crate::context::OrgContext;
use crate::db::Database;
use crate::error::Result;
use crate::models::{Area, AreaMetrics, InsightDraft, InsightType, PeopleMetrics};

pub struct PeopleAgent {
    thresholds: Thresholds,
}

impl PeopleAgent {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn gather_people(&self, db: &Database, ctx: &OrgContext) -> Result<PeopleMetrics> {
        let org = ctx.organization_id;
        let today = ctx.today();
        let window_end = today + Duration::days(self.thresholds.upcoming_leave_window_days);
        let next_payroll = db.next_payroll_run(org, today)?;

        Ok(PeopleMetrics {
            team_size: db.count_active_team_members(org)?,
            pending_leave_requests: db.count_pending_leave(org)?,
            upcoming_leave: db.count_upcoming_leave(org, today, window_end)?,
            next_payroll_date: next_payroll.as_ref().map(|p| p.pay_date),
            next_payroll_amount: next_payroll.as_ref().map(|p| p.amount).unwrap_or(0.0),
            days_until_payroll: next_payroll.map(|p| (p.pay_date - today).num_days()),
        })
    }

    fn analyze_people(&self, m: &PeopleMetrics) -> Vec<InsightDraft> {
        let mut drafts = Vec::new();

        if let (Some(days), Some(date)) = (m.days_until_payroll, m.next_payroll_date) {
            if days <= self.thresholds.payroll_due_days {
                drafts.push(
                    InsightDraft::new(
                        InsightType::Warning,
                        "people",
                        "Payroll due soon",
                        format!(
                            "Payroll of {:.2} is due on {} ({} day(s)).",
                            m.next_payroll_amount, date, days
                        ),
                        0.7,
                    )
                    .with_actions(["review_cash"]),
                );
            }
        }

        if m.pending_leave_requests > 0 {
            drafts.push(
                InsightDraft::new(
                    InsightType::Info,
                    "people",
                    "Pending leave requests",
                    format!(
                        "{} leave request(s) are waiting for approval.",
                        m.pending_leave_requests
                    ),
                    0.4,
                )
                .with_actions(["review_leave"])
                .with_url("/team/leave"),
            );
        }

        drafts
    }
}

impl Agent for PeopleAgent {
    fn area(&self) -> Area {
        Area::People
    }

    fn gather(&self, db: &Database, ctx: &OrgContext) -> Result<AreaMetrics> {
        self.gather_people(db, ctx).map(AreaMetrics::People)
    }

    fn analyze(&self, metrics: &AreaMetrics, _ctx: &OrgContext) -> Vec<InsightDraft> {
        match metrics {
            AreaMetrics::People(m) => self.analyze_people(m),
            _ => Vec::new(),
        }
    }
}
