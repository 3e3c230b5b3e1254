//! Money agent: cash, flow, spend trend and budgets

use chrono::Duration;

use super::Agent;
use crate::config::Thresholds;
use crate::context::OrgContext;
use crate::db::Database;
use crate::error::Result;
use crate::models::{
    percent_change, Area, AreaMetrics, InsightDraft, InsightType, MoneyMetrics, Trend,
};

pub struct MoneyAgent {
    thresholds: Thresholds,
}

impl MoneyAgent {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn gather_money(&self, db: &Database, ctx: &OrgContext) -> Result<MoneyMetrics> {
        let org = ctx.organization_id;
        let today = ctx.today();

        let current = db.movement_totals(org, today - Duration::days(29), today)?;
        let previous = db.movement_totals(
            org,
            today - Duration::days(59),
            today - Duration::days(30),
        )?;

        let lines = db.list_budget_lines(org, today)?;
        let budget_total: f64 = lines.iter().map(|l| l.amount).sum();
        let budget_spent: f64 = lines.iter().map(|l| l.spent).sum();
        let overrun: Vec<_> = lines
            .iter()
            .filter(|l| l.amount > 0.0 && l.spent >= l.amount)
            .collect();

        Ok(MoneyMetrics {
            cash_balance: db.cash_balance(org)?,
            income_30d: current.income,
            expenses_30d: current.expenses,
            net_cash_flow: current.net(),
            expenses_prev_30d: previous.expenses,
            spend_trend: Trend::from_change(
                percent_change(previous.expenses, current.expenses),
                self.thresholds.trend_band_pct,
            ),
            budget_total,
            budget_spent,
            budget_usage_pct: if budget_total > 0.0 {
                budget_spent / budget_total * 100.0
            } else {
                0.0
            },
            overrun_lines: overrun.iter().map(|l| l.name.clone()).collect(),
            inventory_budget_overrun: overrun
                .iter()
                .any(|l| l.category.eq_ignore_ascii_case("inventory")),
            uncategorized_movements: db.count_uncategorized_movements(org)?,
        })
    }

    fn analyze_money(&self, m: &MoneyMetrics) -> Vec<InsightDraft> {
        let mut drafts = Vec::new();

        for line in &m.overrun_lines {
            drafts.push(
                InsightDraft::new(
                    InsightType::Warning,
                    "money",
                    format!("Budget overrun: {}", line),
                    format!("The {} budget line has been fully spent.", line),
                    0.85,
                )
                .with_actions(["review_budget", "generate_report"])
                .with_url("/budgets"),
            );
        }

        if m.overrun_lines.is_empty()
            && m.budget_usage_pct >= self.thresholds.budget_pressure_pct
            && m.budget_usage_pct < 100.0
        {
            drafts.push(
                InsightDraft::new(
                    InsightType::Warning,
                    "money",
                    "Budget nearly used",
                    format!(
                        "{:.0}% of this period's budget is spent ({:.2} of {:.2}).",
                        m.budget_usage_pct, m.budget_spent, m.budget_total
                    ),
                    0.6,
                )
                .with_actions(["review_budget"]),
            );
        }

        if m.net_cash_flow < 0.0 {
            drafts.push(
                InsightDraft::new(
                    InsightType::Warning,
                    "money",
                    "Negative cash flow",
                    format!(
                        "Expenses ({:.2}) exceeded income ({:.2}) over the last 30 days.",
                        m.expenses_30d, m.income_30d
                    ),
                    0.8,
                )
                .with_actions(["review_expenses", "send_invoice_reminders"])
                .with_url("/cash-flow"),
            );
        }

        if m.uncategorized_movements > 0 {
            drafts.push(
                InsightDraft::new(
                    InsightType::Info,
                    "money",
                    "Uncategorized transactions",
                    format!(
                        "{} transaction(s) have no category yet.",
                        m.uncategorized_movements
                    ),
                    0.3,
                )
                .with_actions(["categorize_transactions"]),
            );
        }

        drafts
    }
}

impl Agent for MoneyAgent {
    fn area(&self) -> Area {
        Area::Money
    }

    fn gather(&self, db: &Database, ctx: &OrgContext) -> Result<AreaMetrics> {
        self.gather_money(db, ctx).map(AreaMetrics::Money)
    }

    fn analyze(&self, metrics: &AreaMetrics, _ctx: &OrgContext) -> Vec<InsightDraft> {
        match metrics {
            AreaMetrics::Money(m) => self.analyze_money(m),
            _ => Vec::new(),
        }
    }
}
