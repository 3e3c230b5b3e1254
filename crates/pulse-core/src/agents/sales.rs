//! Sales agent: revenue trend, receivables and quotes

use chrono::Duration;

use super::Agent;
use crate::config::Thresholds;
use crate::context::OrgContext;
use crate::db::Database;
use crate::error::Result;
use crate::models::{
    percent_change, Area, AreaMetrics, InsightDraft, InsightType, SalesMetrics, Trend,
};
use crate::period::{month_start, shift_months};

pub struct SalesAgent {
    thresholds: Thresholds,
}

impl SalesAgent {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn gather_sales(&self, db: &Database, ctx: &OrgContext) -> Result<SalesMetrics> {
        let org = ctx.organization_id;
        let today = ctx.today();

        let this_month_start = month_start(today);
        let last_month_start = shift_months(today, -1);

        let revenue_this_month = db.invoiced_revenue(org, this_month_start, today)?;
        let revenue_last_month = db.invoiced_revenue(
            org,
            last_month_start,
            this_month_start - Duration::days(1),
        )?;
        let growth_pct = percent_change(revenue_last_month, revenue_this_month);
        let invoices = db.invoice_summary(org, today)?;

        Ok(SalesMetrics {
            revenue_this_month,
            revenue_last_month,
            growth_pct,
            trend: Trend::from_change(growth_pct, self.thresholds.trend_band_pct),
            overdue_invoices: invoices.overdue_count,
            overdue_amount: invoices.overdue_amount,
            outstanding_invoices: invoices.outstanding_count,
            outstanding_amount: invoices.outstanding_amount,
            open_quotes: db.count_open_quotes(org)?,
            customers: db.count_customers(org)?,
        })
    }

    fn analyze_sales(&self, m: &SalesMetrics) -> Vec<InsightDraft> {
        let mut drafts = Vec::new();

        if m.overdue_invoices > 0 {
            drafts.push(
                InsightDraft::new(
                    InsightType::Warning,
                    "sales",
                    "Overdue invoices",
                    format!(
                        "{} invoice(s) worth {:.2} are past due.",
                        m.overdue_invoices, m.overdue_amount
                    ),
                    0.75,
                )
                .with_actions(["send_invoice_reminders"])
                .with_url("/invoices?status=overdue"),
            );
        }

        if m.growth_pct < -self.thresholds.sales_decline_pct {
            drafts.push(
                InsightDraft::new(
                    InsightType::Warning,
                    "sales",
                    "Sales declining",
                    format!(
                        "Revenue is down {:.0}% against last month ({:.2} vs {:.2}).",
                        -m.growth_pct, m.revenue_this_month, m.revenue_last_month
                    ),
                    0.7,
                )
                .with_actions(["follow_up_quote", "generate_report"]),
            );
        } else if m.growth_pct > self.thresholds.sales_growth_pct {
            drafts.push(
                InsightDraft::new(
                    InsightType::Opportunity,
                    "sales",
                    "Sales growing",
                    format!(
                        "Revenue is up {:.0}% against last month ({:.2} vs {:.2}).",
                        m.growth_pct, m.revenue_this_month, m.revenue_last_month
                    ),
                    0.5,
                )
                .with_actions(["generate_report"]),
            );
        }

        if m.open_quotes > 0 {
            drafts.push(
                InsightDraft::new(
                    InsightType::Info,
                    "sales",
                    "Open quotes awaiting follow-up",
                    format!("{} quote(s) are still open.", m.open_quotes),
                    0.35,
                )
                .with_actions(["follow_up_quote"]),
            );
        }

        drafts
    }
}

impl Agent for SalesAgent {
    fn area(&self) -> Area {
        Area::Sales
    }

    fn gather(&self, db: &Database, ctx: &OrgContext) -> Result<AreaMetrics> {
        self.gather_sales(db, ctx).map(AreaMetrics::Sales)
    }

    fn analyze(&self, metrics: &AreaMetrics, _ctx: &OrgContext) -> Vec<InsightDraft> {
        match metrics {
            AreaMetrics::Sales(m) => self.analyze_sales(m),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FixedClock;
    use crate::db::NewInvoice;
    use crate::models::InvoiceStatus;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn invoice(customer_id: i64, amount: f64, status: InvoiceStatus, issued: NaiveDate, due: NaiveDate) -> NewInvoice {
        NewInvoice {
            customer_id,
            description: None,
            amount,
            status,
            issue_date: issued,
            due_date: due,
        }
    }

    #[test]
    fn test_gather_sales_metrics() {
        let db = Database::in_memory().unwrap();
        let ctx = OrgContext::system(1, 1).with_clock(FixedClock::on(2025, 3, 14));
        let now = ctx.now();

        let acme = db.create_customer(1, "Acme", None).unwrap();
        let other = db.create_customer(2, "Elsewhere", None).unwrap();

        // Last month: 1000 paid
        db.create_invoice(1, &invoice(acme, 1000.0, InvoiceStatus::Paid, d(2025, 2, 3), d(2025, 3, 3)), now)
            .unwrap();
        // This month: 1500 sent, overdue
        db.create_invoice(1, &invoice(acme, 1500.0, InvoiceStatus::Sent, d(2025, 3, 1), d(2025, 3, 10)), now)
            .unwrap();
        // Drafts don't count as revenue
        db.create_invoice(1, &invoice(acme, 700.0, InvoiceStatus::Draft, d(2025, 3, 2), d(2025, 4, 2)), now)
            .unwrap();
        // Other tenant
        db.create_invoice(2, &invoice(other, 9000.0, InvoiceStatus::Sent, d(2025, 3, 1), d(2025, 3, 2)), now)
            .unwrap();
        db.create_quote(1, acme, 400.0, d(2025, 3, 5)).unwrap();

        let agent = SalesAgent::new(Thresholds::default());
        let m = agent.gather_sales(&db, &ctx).unwrap();

        assert_eq!(m.revenue_this_month, 1500.0);
        assert_eq!(m.revenue_last_month, 1000.0);
        assert_eq!(m.growth_pct, 50.0);
        assert_eq!(m.trend, Trend::Increasing);
        assert_eq!(m.overdue_invoices, 1);
        assert_eq!(m.overdue_amount, 1500.0);
        assert_eq!(m.outstanding_invoices, 1);
        assert_eq!(m.open_quotes, 1);
        assert_eq!(m.customers, 1);
    }

    #[test]
    fn test_analyze_sales_decline() {
        let agent = SalesAgent::new(Thresholds::default());
        let metrics = AreaMetrics::Sales(SalesMetrics {
            revenue_this_month: 800.0,
            revenue_last_month: 1000.0,
            growth_pct: -20.0,
            trend: Trend::Decreasing,
            ..Default::default()
        });

        let drafts = agent.analyze(&metrics, &OrgContext::system(1, 1));
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "Sales declining");
        assert!(drafts[0].is_actionable);
    }
}
