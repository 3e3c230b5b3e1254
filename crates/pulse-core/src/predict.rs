//! Predictive engine
//!
//! Forecasts are heuristics, not statistical models. Each family records the terms it
//! used in `factors` so a reader can audit the arithmetic. Generation runs independent
//! of the decision cycle; every record of a run shares its `prediction_date`.

use chrono::{Datelike, Duration};
use serde_json::json;
use tracing::{debug, info};

use crate::config::ForecastConfig;
use crate::context::OrgContext;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{NewPrediction, Prediction, PredictionType};
use crate::period::{month_end, shift_months};

/// Accuracy of a forecast once the actual value is known, in `[0, 1]`
pub fn accuracy(predicted: f64, actual: f64) -> f64 {
    if actual == 0.0 {
        return if predicted == 0.0 { 1.0 } else { 0.0 };
    }
    let pct = (100.0 - (actual - predicted).abs() / actual.abs() * 100.0).max(0.0);
    (pct / 100.0).clamp(0.0, 1.0)
}

pub struct PredictiveEngine {
    db: Database,
    config: ForecastConfig,
}

impl PredictiveEngine {
    pub fn new(db: Database, config: ForecastConfig) -> Self {
        Self { db, config }
    }

    /// Projected cash balance at each configured horizon
    pub fn predict_cash_flow(&self, ctx: &OrgContext) -> Result<Vec<NewPrediction>> {
        let org = ctx.organization_id;
        let today = ctx.today();

        let current_cash = self.db.cash_balance(org)?;
        let monthly_net = self
            .db
            .movement_totals(org, today - Duration::days(29), today)?
            .net();

        let mut predictions = Vec::with_capacity(self.config.horizons.len());
        for &days in &self.config.horizons {
            let target = today + Duration::days(days);
            let payroll_due = self.db.scheduled_payroll_between(org, today, target)?;
            let expected_invoices = self.db.expected_invoice_income(org, today, target)?;

            let flow = monthly_net * (days as f64 / 30.0);
            let collected = self.config.invoice_collection_weight * expected_invoices;
            let predicted = current_cash + flow - payroll_due + collected;

            predictions.push(NewPrediction {
                prediction_type: PredictionType::CashFlow,
                category: "cash".to_string(),
                target_date: target,
                predicted_value: predicted,
                confidence: self.config.cash_flow_confidence,
                factors: json!({
                    "current_cash": current_cash,
                    "monthly_net": monthly_net,
                    "projected_flow": flow,
                    "payroll_due": payroll_due,
                    "expected_invoices": expected_invoices,
                    "invoice_collection_weight": self.config.invoice_collection_weight,
                }),
                metadata: json!({ "horizon_days": days, "heuristic": true }),
            });
        }

        Ok(predictions)
    }

    /// Exhaustion date of every budget line still being drawn down
    pub fn predict_budget_burn(&self, ctx: &OrgContext) -> Result<Vec<NewPrediction>> {
        let today = ctx.today();
        let lines = self.db.list_budget_lines(ctx.organization_id, today)?;

        let mut predictions = Vec::new();
        for line in lines {
            let remaining = line.remaining();
            if remaining <= 0.0 {
                continue;
            }
            let days_elapsed = (today - line.period_start).num_days().max(1);
            let daily_burn = line.spent / days_elapsed as f64;
            if daily_burn <= 0.0 {
                continue;
            }

            let days_left = (remaining / daily_burn).ceil() as i64;
            let Some(target_date) =
                Duration::try_days(days_left).and_then(|d| today.checked_add_signed(d))
            else {
                debug!(
                    organization_id = ctx.organization_id,
                    budget_line_id = line.id,
                    days_left,
                    "Budget line exhaustion beyond the calendar, skipped"
                );
                continue;
            };
            predictions.push(NewPrediction {
                prediction_type: PredictionType::BudgetBurn,
                category: line.name.clone(),
                target_date,
                predicted_value: remaining,
                confidence: self.config.budget_burn_confidence,
                factors: json!({
                    "amount": line.amount,
                    "spent": line.spent,
                    "days_elapsed": days_elapsed,
                    "daily_burn": daily_burn,
                }),
                metadata: json!({
                    "budget_line_id": line.id,
                    "budget_category": line.category,
                    "period_end": line.period_end,
                    "exhausts_before_period_end": target_date <= line.period_end,
                }),
            });
        }

        Ok(predictions)
    }

    /// Revenue for the current month from the three most recent complete months
    pub fn predict_sales(&self, ctx: &OrgContext) -> Result<Vec<NewPrediction>> {
        let org = ctx.organization_id;
        let today = ctx.today();

        // Oldest first
        let mut months = Vec::with_capacity(3);
        for back in (1..=3).rev() {
            let start = shift_months(today, -back);
            let revenue = self.db.invoiced_revenue(org, start, month_end(start))?;
            months.push((start, revenue));
        }

        let total: f64 = months.iter().map(|(_, r)| r).sum();
        if total <= 0.0 {
            debug!(organization_id = org, "No revenue in sales window, skipping forecast");
            return Ok(Vec::new());
        }

        let oldest = months[0].1;
        let latest = months[2].1;
        let average = total / months.len() as f64;
        let trend = (latest - oldest) / 2.0;
        let predicted = ((average + trend) * self.config.seasonal_factor).max(0.0);

        Ok(vec![NewPrediction {
            prediction_type: PredictionType::SalesRevenue,
            category: "revenue".to_string(),
            target_date: month_end(today),
            predicted_value: predicted,
            confidence: self.config.sales_confidence,
            factors: json!({
                "monthly_revenue": months
                    .iter()
                    .map(|(start, revenue)| json!({
                        "month": format!("{}-{:02}", start.year(), start.month()),
                        "revenue": revenue,
                    }))
                    .collect::<Vec<_>>(),
                "average": average,
                "trend": trend,
                "seasonal_factor": self.config.seasonal_factor,
            }),
            metadata: json!({ "window_months": 3, "heuristic": true }),
        }])
    }

    /// Reserved family; produces nothing yet
    pub fn predict_inventory_needs(&self, _ctx: &OrgContext) -> Result<Vec<NewPrediction>> {
        Ok(Vec::new())
    }

    /// Every family, without persisting
    pub fn forecast(&self, ctx: &OrgContext) -> Result<Vec<NewPrediction>> {
        let mut all = self.predict_cash_flow(ctx)?;
        all.extend(self.predict_budget_burn(ctx)?);
        all.extend(self.predict_sales(ctx)?);
        all.extend(self.predict_inventory_needs(ctx)?);
        Ok(all)
    }

    /// Run every family and persist the results as one run
    pub fn generate(&self, ctx: &OrgContext) -> Result<Vec<Prediction>> {
        let predictions = self.forecast(ctx)?;
        let saved = self
            .db
            .insert_predictions(ctx.organization_id, ctx.now(), &predictions)?;
        info!(
            organization_id = ctx.organization_id,
            count = saved.len(),
            "Predictions generated"
        );
        Ok(saved)
    }

    /// Backfill the observed value of a prediction and score it
    pub fn record_actual(&self, ctx: &OrgContext, id: i64, actual: f64) -> Result<Prediction> {
        if !actual.is_finite() {
            return Err(Error::Validation("Actual value must be a finite number".into()));
        }
        let prediction = self
            .db
            .get_prediction(ctx.organization_id, id)?
            .ok_or_else(|| Error::NotFound(format!("Prediction {}", id)))?;

        let score = accuracy(prediction.predicted_value, actual);
        debug!(
            organization_id = ctx.organization_id,
            prediction_id = id,
            accuracy = score,
            "Recording prediction actual"
        );
        self.db
            .record_prediction_actual(ctx.organization_id, id, actual, score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FixedClock;
    use crate::db::NewInvoice;
    use crate::models::{Direction, InvoiceStatus, NewMovement};
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ctx() -> OrgContext {
        OrgContext::system(1, 1).with_clock(FixedClock::on(2025, 3, 14))
    }

    fn engine(db: &Database) -> PredictiveEngine {
        PredictiveEngine::new(db.clone(), ForecastConfig::default())
    }

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(100.0, 100.0), 1.0);
        assert!((accuracy(90.0, 100.0) - 0.9).abs() < 1e-9);
        assert_eq!(accuracy(500.0, 100.0), 0.0);
        assert_eq!(accuracy(0.0, 0.0), 1.0);
        assert_eq!(accuracy(5.0, 0.0), 0.0);
    }

    #[test]
    fn test_cash_flow_projection() {
        let db = Database::in_memory().unwrap();
        let ctx = ctx();
        db.create_account(1, "Main", 10000.0).unwrap();
        // No account: history only, balance unchanged
        db.insert_movement(
            1,
            &NewMovement {
                account_id: None,
                date: d(2025, 3, 10),
                description: "Supplier".into(),
                amount: 2000.0,
                direction: Direction::Expense,
                category: Some("supplies".into()),
            },
            ctx.now(),
        )
        .unwrap();

        let predictions = engine(&db).predict_cash_flow(&ctx).unwrap();
        assert_eq!(predictions.len(), 3);

        let p30 = &predictions[0];
        assert_eq!(p30.target_date, d(2025, 4, 13));
        assert!((p30.predicted_value - 8000.0).abs() < 1e-9);
        assert_eq!(p30.confidence, 0.75);
        assert_eq!(p30.factors["current_cash"], 10000.0);
        assert_eq!(p30.factors["monthly_net"], -2000.0);

        assert!((predictions[2].predicted_value - 4000.0).abs() < 1e-9);
    }

    #[test]
    fn test_cash_flow_payroll_and_invoices() {
        let db = Database::in_memory().unwrap();
        let ctx = ctx();
        db.create_account(1, "Main", 5000.0).unwrap();
        db.create_payroll_run(1, d(2025, 3, 28), 3000.0).unwrap();
        // Paid before today: not in the window
        db.create_payroll_run(1, d(2025, 3, 14), 999.0).unwrap();
        let acme = db.create_customer(1, "Acme", None).unwrap();
        db.create_invoice(
            1,
            &NewInvoice {
                customer_id: acme,
                description: None,
                amount: 1000.0,
                status: InvoiceStatus::Sent,
                issue_date: d(2025, 3, 1),
                due_date: d(2025, 3, 31),
            },
            ctx.now(),
        )
        .unwrap();

        let predictions = engine(&db).predict_cash_flow(&ctx).unwrap();
        // 5000 - 3000 + 0.7 * 1000
        assert!((predictions[0].predicted_value - 2700.0).abs() < 1e-9);
    }

    #[test]
    fn test_budget_burn() {
        let db = Database::in_memory().unwrap();
        let ctx = ctx();
        db.create_account(1, "Main", 10000.0).unwrap();
        db.create_budget_line(1, "Marketing", "marketing", 1000.0, d(2025, 3, 1), d(2025, 3, 31))
            .unwrap();
        db.create_budget_line(1, "Stock", "inventory", 1000.0, d(2025, 3, 1), d(2025, 3, 31))
            .unwrap();
        db.create_budget_line(1, "Travel", "travel", 500.0, d(2025, 3, 1), d(2025, 3, 31))
            .unwrap();

        for (category, amount) in [("marketing", 260.0), ("inventory", 1000.0)] {
            db.insert_movement(
                1,
                &NewMovement {
                    account_id: None,
                    date: d(2025, 3, 5),
                    description: format!("{} spend", category),
                    amount,
                    direction: Direction::Expense,
                    category: Some(category.into()),
                },
                ctx.now(),
            )
            .unwrap();
        }

        let predictions = engine(&db).predict_budget_burn(&ctx).unwrap();
        // Stock is exhausted, Travel has zero burn
        assert_eq!(predictions.len(), 1);
        let p = &predictions[0];
        assert_eq!(p.category, "Marketing");
        assert_eq!(p.predicted_value, 740.0);
        // 260 over 13 days = 20/day, 740 / 20 = 37 days
        assert_eq!(p.target_date, d(2025, 4, 20));
    }

    #[test]
    fn test_budget_burn_beyond_calendar_is_skipped() {
        let db = Database::in_memory().unwrap();
        let ctx = ctx();
        db.create_budget_line(1, "Reserve", "reserve", 10_000_000.0, d(2025, 1, 1), d(2025, 12, 31))
            .unwrap();
        db.insert_movement(
            1,
            &NewMovement {
                account_id: None,
                date: d(2025, 2, 1),
                description: "Bank fee".into(),
                amount: 0.01,
                direction: Direction::Expense,
                category: Some("reserve".into()),
            },
            ctx.now(),
        )
        .unwrap();

        let predictions = engine(&db).predict_budget_burn(&ctx).unwrap();
        assert!(predictions.is_empty());
        // The full run still completes
        assert!(engine(&db).generate(&ctx).is_ok());
    }

    #[test]
    fn test_sales_forecast() {
        let db = Database::in_memory().unwrap();
        let ctx = ctx();
        let acme = db.create_customer(1, "Acme", None).unwrap();
        for (month, amount) in [(12, 900.0), (1, 1000.0), (2, 1400.0)] {
            let year = if month == 12 { 2024 } else { 2025 };
            db.create_invoice(
                1,
                &NewInvoice {
                    customer_id: acme,
                    description: None,
                    amount,
                    status: InvoiceStatus::Paid,
                    issue_date: d(year, month, 10),
                    due_date: d(year, month, 28),
                },
                ctx.now(),
            )
            .unwrap();
        }

        let predictions = engine(&db).predict_sales(&ctx).unwrap();
        assert_eq!(predictions.len(), 1);
        let p = &predictions[0];
        // avg 1100, trend (1400 - 900) / 2 = 250
        assert!((p.predicted_value - 1350.0).abs() < 1e-9);
        assert_eq!(p.target_date, d(2025, 3, 31));
        assert_eq!(p.confidence, 0.6);
    }

    #[test]
    fn test_sales_forecast_skipped_without_revenue() {
        let db = Database::in_memory().unwrap();
        assert!(engine(&db).predict_sales(&ctx()).unwrap().is_empty());
    }

    #[test]
    fn test_generate_and_record_actual() {
        let db = Database::in_memory().unwrap();
        let ctx = ctx();
        db.create_account(1, "Main", 1000.0).unwrap();

        let engine = engine(&db);
        let saved = engine.generate(&ctx).unwrap();
        assert_eq!(saved.len(), 3);
        assert!(saved.iter().all(|p| p.prediction_date == ctx.now()));

        // Same instant: overwritten, not duplicated
        engine.generate(&ctx).unwrap();
        assert_eq!(db.list_predictions(1, None, 100).unwrap().len(), 3);

        let scored = engine.record_actual(&ctx, saved[0].id, 800.0).unwrap();
        assert_eq!(scored.actual_value, Some(800.0));
        assert!((scored.accuracy.unwrap() - 0.75).abs() < 1e-9);

        let other = OrgContext::system(2, 1);
        assert!(matches!(
            engine.record_actual(&other, saved[0].id, 1.0),
            Err(Error::NotFound(_))
        ));
    }
}
