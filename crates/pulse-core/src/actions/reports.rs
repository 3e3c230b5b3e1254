//! Read-only report generation

use std::fmt::Write as _;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{mismatch, ActionHandler, ActionParams, Preview, ReportKind, ReportParams};
use crate::context::{OrgContext, Permission};
use crate::db::{Database, MovementFilter};
use crate::error::{Error, Result};
use crate::models::{ActionType, Direction, InvoiceStatus};
use crate::period::ReportPeriod;

const DEFAULT_ROW_LIMIT: i64 = 20;
const MAX_ROW_LIMIT: i64 = 500;

/// Invoices scanned for a sales report
const SALES_SCAN_LIMIT: i64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub label: String,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ReportRow {
    fn new(label: impl Into<String>, amount: f64) -> Self {
        Self {
            label: label.into(),
            amount,
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub kind: ReportKind,
    pub title: String,
    /// Human label of the window, e.g. "this month"
    pub period: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub rows: Vec<ReportRow>,
    pub totals: Vec<ReportRow>,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Plain-text rendering, one row per line
    pub fn to_text(&self, currency: &str) -> String {
        let mut out = format!("{} ({})\n", self.title, self.period);
        if self.rows.is_empty() {
            out.push_str("No data for this period.\n");
            return out;
        }
        for row in &self.rows {
            let _ = write!(out, "  {}: {} {:.2}", row.label, currency, row.amount);
            if let Some(detail) = &row.detail {
                let _ = write!(out, " ({})", detail);
            }
            out.push('\n');
        }
        for total in &self.totals {
            let _ = writeln!(out, "{}: {} {:.2}", total.label, currency, total.amount);
        }
        out
    }
}

pub struct GenerateReportHandler;

impl GenerateReportHandler {
    fn params<'a>(&self, params: &'a ActionParams) -> Result<&'a ReportParams> {
        match params {
            ActionParams::GenerateReport(p) => Ok(p),
            other => Err(mismatch(ActionType::GenerateReport, other)),
        }
    }

    /// Assemble a report without writing anything
    pub fn build(&self, db: &Database, ctx: &OrgContext, p: &ReportParams) -> Result<Report> {
        let org = ctx.organization_id;
        let today = ctx.today();
        let limit = p.limit.unwrap_or(DEFAULT_ROW_LIMIT).clamp(1, MAX_ROW_LIMIT);

        // A bare "last N" listing spans all history
        let window = match (p.kind, p.period, p.limit) {
            (ReportKind::Transactions, None, Some(_)) => None,
            (_, period, _) => Some(period.unwrap_or(ReportPeriod::ThisMonth)),
        };
        let range = window.map(|w| w.range(today));
        let period_label = window.map_or_else(|| "latest".to_string(), |w| w.to_string());
        let (start, end) = (range.map(|r| r.0), range.map(|r| r.1));

        let mut report = Report {
            kind: p.kind,
            title: String::new(),
            period: period_label,
            start,
            end,
            rows: Vec::new(),
            totals: Vec::new(),
        };

        match p.kind {
            ReportKind::Transactions => {
                report.title = match &p.category {
                    Some(c) => format!("Transactions: {}", c),
                    None => "Transactions".to_string(),
                };
                let movements = db.list_movements(
                    org,
                    &MovementFilter {
                        start,
                        end,
                        category: p.category.clone(),
                        direction: None,
                        limit: Some(limit),
                    },
                )?;
                let (mut income, mut expenses) = (0.0, 0.0);
                for m in &movements {
                    match m.direction {
                        Direction::Income => income += m.amount,
                        Direction::Expense => expenses += m.amount,
                    }
                    report.rows.push(
                        ReportRow::new(
                            format!("{} {}", m.date, m.description),
                            m.amount * m.direction.sign(),
                        )
                        .with_detail(m.category.clone().unwrap_or_else(|| "uncategorized".into())),
                    );
                }
                if !movements.is_empty() {
                    report.totals = vec![
                        ReportRow::new("Income", income),
                        ReportRow::new("Expenses", expenses),
                        ReportRow::new("Net", income - expenses),
                    ];
                }
            }
            ReportKind::Expenses => {
                let (start, end) = range.unwrap_or((today, today));
                match &p.category {
                    Some(category) => {
                        report.title = format!("Expenses: {}", category);
                        let movements = db.list_movements(
                            org,
                            &MovementFilter {
                                start: Some(start),
                                end: Some(end),
                                category: Some(category.clone()),
                                direction: Some(Direction::Expense),
                                limit: Some(limit),
                            },
                        )?;
                        report.rows = movements
                            .iter()
                            .map(|m| ReportRow::new(format!("{} {}", m.date, m.description), m.amount))
                            .collect();
                    }
                    None => {
                        report.title = "Expenses by category".to_string();
                        let by_category = db.expenses_by_category(org, start, end)?;
                        let total: f64 = by_category.iter().map(|(_, v)| v).sum();
                        report.rows = by_category
                            .into_iter()
                            .map(|(category, amount)| {
                                let share = if total > 0.0 { amount / total * 100.0 } else { 0.0 };
                                ReportRow::new(category, amount).with_detail(format!("{:.0}%", share))
                            })
                            .collect();
                    }
                }
                let total: f64 = report.rows.iter().map(|r| r.amount).sum();
                if !report.rows.is_empty() {
                    report.totals = vec![ReportRow::new("Total", total)];
                }
            }
            ReportKind::Sales => {
                report.title = "Sales".to_string();
                let (start, end) = range.unwrap_or((today, today));
                let invoices: Vec<_> = db
                    .list_invoices(org, None, SALES_SCAN_LIMIT)?
                    .into_iter()
                    .filter(|i| matches!(i.status, InvoiceStatus::Sent | InvoiceStatus::Paid))
                    .filter(|i| i.issue_date >= start && i.issue_date <= end)
                    .collect();
                let paid: f64 = invoices
                    .iter()
                    .filter(|i| i.status == InvoiceStatus::Paid)
                    .map(|i| i.amount)
                    .sum();
                let invoiced: f64 = invoices.iter().map(|i| i.amount).sum();
                report.rows = invoices
                    .iter()
                    .take(limit as usize)
                    .map(|i| {
                        ReportRow::new(format!("{} {}", i.number, i.customer_name), i.amount)
                            .with_detail(i.status.as_str())
                    })
                    .collect();
                if !invoices.is_empty() {
                    report.totals = vec![
                        ReportRow::new("Invoiced", invoiced),
                        ReportRow::new("Paid", paid),
                        ReportRow::new("Outstanding", invoiced - paid),
                    ];
                }
            }
            ReportKind::CashFlow => {
                report.title = "Cash flow".to_string();
                let (start, end) = range.unwrap_or((today, today));
                let totals = db.movement_totals(org, start, end)?;
                if totals.income > 0.0 || totals.expenses > 0.0 {
                    report.rows = vec![
                        ReportRow::new("Money in", totals.income),
                        ReportRow::new("Money out", totals.expenses),
                        ReportRow::new("Net", totals.net()),
                    ];
                }
                report.totals = vec![ReportRow::new("Cash balance", db.cash_balance(org)?)];
            }
            ReportKind::Summary => {
                report.title = "Business summary".to_string();
                let (start, end) = range.unwrap_or((today, today));
                let totals = db.movement_totals(org, start, end)?;
                let invoices = db.invoice_summary(org, today)?;
                let revenue = db.invoiced_revenue(org, start, end)?;
                let has_activity = totals.income > 0.0
                    || totals.expenses > 0.0
                    || revenue > 0.0
                    || invoices.outstanding_count > 0;
                if has_activity {
                    report.rows = vec![
                        ReportRow::new("Money in", totals.income),
                        ReportRow::new("Money out", totals.expenses),
                        ReportRow::new("Net", totals.net()),
                        ReportRow::new("Invoiced", revenue),
                        ReportRow::new("Outstanding invoices", invoices.outstanding_amount)
                            .with_detail(format!("{} open", invoices.outstanding_count)),
                        ReportRow::new("Overdue invoices", invoices.overdue_amount)
                            .with_detail(format!("{} overdue", invoices.overdue_count)),
                    ];
                }
                report.totals = vec![ReportRow::new("Cash balance", db.cash_balance(org)?)];
            }
        }

        Ok(report)
    }
}

impl ActionHandler for GenerateReportHandler {
    fn action_type(&self) -> ActionType {
        ActionType::GenerateReport
    }

    fn category(&self) -> &'static str {
        "reports"
    }

    fn required_permission(&self) -> Permission {
        Permission::ViewReports
    }

    fn validate(&self, _db: &Database, _ctx: &OrgContext, params: &ActionParams) -> Result<()> {
        let p = self.params(params)?;
        if let Some(limit) = p.limit {
            if !(1..=MAX_ROW_LIMIT).contains(&limit) {
                return Err(Error::Validation(format!(
                    "Row limit must be between 1 and {}",
                    MAX_ROW_LIMIT
                )));
            }
        }
        if p.category.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(Error::Validation("Category must not be empty".to_string()));
        }
        if let Some(ReportPeriod::LastDays { days }) = p.period {
            if days < 1 {
                return Err(Error::Validation("Period must cover at least one day".to_string()));
            }
        }
        Ok(())
    }

    fn preview(&self, _db: &Database, ctx: &OrgContext, params: &ActionParams) -> Result<Preview> {
        let p = self.params(params)?;
        let mut preview = Preview::new(format!(
            "Generate {} report",
            p.kind.as_str().replace('_', " ")
        ));
        match (p.period, p.limit) {
            (Some(period), _) => {
                let (start, end) = period.range(ctx.today());
                preview = preview.item("Period", format!("{} ({} to {})", period, start, end));
            }
            (None, Some(limit)) if p.kind == ReportKind::Transactions => {
                preview = preview.item("Rows", format!("latest {}", limit));
            }
            (None, _) => preview = preview.item("Period", ReportPeriod::ThisMonth),
        }
        if let Some(category) = &p.category {
            preview = preview.item("Category", category);
        }
        Ok(preview)
    }

    fn execute(
        &self,
        db: &Database,
        ctx: &OrgContext,
        params: &ActionParams,
    ) -> Result<serde_json::Value> {
        let report = self.build(db, ctx, self.params(params)?)?;
        Ok(serde_json::to_value(report)?)
    }
}
