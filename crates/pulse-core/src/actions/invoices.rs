//! Invoice and quote actions

use chrono::Duration;
use serde_json::json;
use tracing::info;

use super::{
    mismatch, ActionHandler, ActionParams, CreateInvoiceParams, FollowUpQuoteParams,
    InvoiceRemindersParams, Preview, RecordPaymentParams,
};
use crate::context::{OrgContext, Permission};
use crate::db::{Database, NewInvoice};
use crate::error::{Error, Result};
use crate::models::{ActionType, Direction, Invoice, InvoiceStatus, NewMovement, Quote};

/// Default payment terms for new invoices
const PAYMENT_TERMS_DAYS: i64 = 30;

fn non_empty(name: &Option<String>) -> Option<&str> {
    name.as_deref().map(str::trim).filter(|n| !n.is_empty())
}

fn require_customer(db: &Database, ctx: &OrgContext, name: &str) -> Result<()> {
    if db.find_customer(ctx.organization_id, name)?.is_none() {
        return Err(Error::Validation(format!("No customer named {}", name)));
    }
    Ok(())
}

// ========== create_invoice ==========

pub struct CreateInvoiceHandler;

impl CreateInvoiceHandler {
    fn params<'a>(&self, params: &'a ActionParams) -> Result<&'a CreateInvoiceParams> {
        match params {
            ActionParams::CreateInvoice(p) => Ok(p),
            other => Err(mismatch(ActionType::CreateInvoice, other)),
        }
    }

    fn terms(&self, ctx: &OrgContext, p: &CreateInvoiceParams) -> (chrono::NaiveDate, chrono::NaiveDate) {
        let issue = p.issue_date.unwrap_or_else(|| ctx.today());
        let due = p
            .due_date
            .unwrap_or(issue + Duration::days(PAYMENT_TERMS_DAYS));
        (issue, due)
    }
}

impl ActionHandler for CreateInvoiceHandler {
    fn action_type(&self) -> ActionType {
        ActionType::CreateInvoice
    }

    fn category(&self) -> &'static str {
        "sales"
    }

    fn required_permission(&self) -> Permission {
        Permission::ManageSales
    }

    fn validate(&self, _db: &Database, ctx: &OrgContext, params: &ActionParams) -> Result<()> {
        let p = self.params(params)?;
        if p.customer.trim().is_empty() {
            return Err(Error::Validation("Invoice needs a customer".into()));
        }
        if !p.amount.is_finite() || p.amount <= 0.0 {
            return Err(Error::Validation(format!(
                "Invoice amount must be positive, got {}",
                p.amount
            )));
        }
        let (issue, due) = self.terms(ctx, p);
        if due < issue {
            return Err(Error::Validation(format!(
                "Due date {} is before issue date {}",
                due, issue
            )));
        }
        Ok(())
    }

    fn preview(&self, db: &Database, ctx: &OrgContext, params: &ActionParams) -> Result<Preview> {
        let p = self.params(params)?;
        let customer = p.customer.trim();
        let (issue, due) = self.terms(ctx, p);

        let mut preview = Preview::new(format!("Invoice {} for {:.2}", customer, p.amount))
            .item("Customer", customer)
            .item("Amount", format!("{:.2}", p.amount))
            .item("Issue date", issue)
            .item("Due date", due);
        if let Some(description) = &p.description {
            preview = preview.item("Description", description);
        }

        if db.find_customer(ctx.organization_id, customer)?.is_none() {
            preview = preview.warn(format!("{} is a new customer and will be created", customer));
        } else {
            let overdue = db
                .list_open_invoices_for_customer(ctx.organization_id, customer)?
                .into_iter()
                .filter(|i| i.is_overdue(ctx.today()))
                .count();
            if overdue > 0 {
                preview = preview.warn(format!(
                    "{} already has {} overdue invoice(s)",
                    customer, overdue
                ));
            }
        }

        Ok(preview)
    }

    fn execute(
        &self,
        db: &Database,
        ctx: &OrgContext,
        params: &ActionParams,
    ) -> Result<serde_json::Value> {
        let p = self.params(params)?;
        let (issue, due) = self.terms(ctx, p);
        let customer_id = db.find_or_create_customer(ctx.organization_id, p.customer.trim())?;

        let invoice = db.create_invoice(
            ctx.organization_id,
            &NewInvoice {
                customer_id,
                description: p.description.clone(),
                amount: p.amount,
                status: InvoiceStatus::Sent,
                issue_date: issue,
                due_date: due,
            },
            ctx.now(),
        )?;

        info!(
            organization_id = ctx.organization_id,
            invoice = %invoice.number,
            "Invoice created"
        );

        Ok(json!({
            "invoice_id": invoice.id,
            "number": invoice.number,
            "customer_id": customer_id,
            "amount": invoice.amount,
            "due_date": invoice.due_date,
        }))
    }
}

// ========== send_invoice_reminders ==========

pub struct SendInvoiceRemindersHandler;

impl SendInvoiceRemindersHandler {
    fn params<'a>(&self, params: &'a ActionParams) -> Result<&'a InvoiceRemindersParams> {
        match params {
            ActionParams::SendInvoiceReminders(p) => Ok(p),
            other => Err(mismatch(ActionType::SendInvoiceReminders, other)),
        }
    }

    fn targets(&self, db: &Database, ctx: &OrgContext, p: &InvoiceRemindersParams) -> Result<Vec<Invoice>> {
        let org = ctx.organization_id;
        if let Some(number) = non_empty(&p.invoice_number) {
            let invoice = db
                .find_invoice_by_number(org, number)?
                .ok_or_else(|| Error::Validation(format!("Invoice {} not found", number)))?;
            if invoice.status != InvoiceStatus::Sent {
                return Err(Error::Validation(format!(
                    "Invoice {} is {}, not awaiting payment",
                    invoice.number,
                    invoice.status.as_str()
                )));
            }
            return Ok(vec![invoice]);
        }
        if let Some(customer) = non_empty(&p.customer) {
            require_customer(db, ctx, customer)?;
            return db.list_open_invoices_for_customer(org, customer);
        }
        db.list_overdue_invoices(org, ctx.today())
    }
}

impl ActionHandler for SendInvoiceRemindersHandler {
    fn action_type(&self) -> ActionType {
        ActionType::SendInvoiceReminders
    }

    fn category(&self) -> &'static str {
        "sales"
    }

    fn required_permission(&self) -> Permission {
        Permission::ManageSales
    }

    fn validate(&self, db: &Database, ctx: &OrgContext, params: &ActionParams) -> Result<()> {
        let p = self.params(params)?;
        if self.targets(db, ctx, p)?.is_empty() {
            return Err(Error::Validation("No unpaid invoices need a reminder".into()));
        }
        Ok(())
    }

    fn preview(&self, db: &Database, ctx: &OrgContext, params: &ActionParams) -> Result<Preview> {
        let p = self.params(params)?;
        let invoices = self.targets(db, ctx, p)?;
        let total: f64 = invoices.iter().map(|i| i.amount).sum();

        let mut preview = Preview::new(format!(
            "Send {} payment reminder(s) for {:.2}",
            invoices.len(),
            total
        ));
        for invoice in &invoices {
            preview = preview.item(
                &invoice.number,
                format!(
                    "{}: {:.2} due {}",
                    invoice.customer_name, invoice.amount, invoice.due_date
                ),
            );
            if invoice.reminders_sent > 0 {
                preview = preview.warn(format!(
                    "{} has already had {} reminder(s)",
                    invoice.number, invoice.reminders_sent
                ));
            }
        }
        Ok(preview)
    }

    fn execute(
        &self,
        db: &Database,
        ctx: &OrgContext,
        params: &ActionParams,
    ) -> Result<serde_json::Value> {
        let p = self.params(params)?;
        let mut reminded = Vec::new();
        for invoice in self.targets(db, ctx, p)? {
            if db.record_invoice_reminder(ctx.organization_id, invoice.id, ctx.now())? {
                reminded.push(invoice.number);
            }
        }
        if reminded.is_empty() {
            return Err(Error::Execution("No invoices were awaiting payment".into()));
        }
        Ok(json!({ "reminded": reminded.len(), "invoices": reminded }))
    }
}

// ========== follow_up_quote ==========

pub struct FollowUpQuoteHandler;

impl FollowUpQuoteHandler {
    fn params<'a>(&self, params: &'a ActionParams) -> Result<&'a FollowUpQuoteParams> {
        match params {
            ActionParams::FollowUpQuote(p) => Ok(p),
            other => Err(mismatch(ActionType::FollowUpQuote, other)),
        }
    }

    fn targets(&self, db: &Database, ctx: &OrgContext, p: &FollowUpQuoteParams) -> Result<Vec<Quote>> {
        let customer = non_empty(&p.customer);
        if let Some(name) = customer {
            require_customer(db, ctx, name)?;
        }
        db.list_open_quotes(ctx.organization_id, customer)
    }
}

impl ActionHandler for FollowUpQuoteHandler {
    fn action_type(&self) -> ActionType {
        ActionType::FollowUpQuote
    }

    fn category(&self) -> &'static str {
        "sales"
    }

    fn required_permission(&self) -> Permission {
        Permission::ManageSales
    }

    fn validate(&self, db: &Database, ctx: &OrgContext, params: &ActionParams) -> Result<()> {
        let p = self.params(params)?;
        if self.targets(db, ctx, p)?.is_empty() {
            return Err(Error::Validation("No open quotes to follow up".into()));
        }
        Ok(())
    }

    fn preview(&self, db: &Database, ctx: &OrgContext, params: &ActionParams) -> Result<Preview> {
        let p = self.params(params)?;
        let quotes = self.targets(db, ctx, p)?;
        let mut preview = Preview::new(format!("Follow up {} open quote(s)", quotes.len()));
        for quote in &quotes {
            let age = (ctx.today() - quote.issued_date).num_days();
            preview = preview.item(
                &quote.customer_name,
                format!("{:.2}, issued {} day(s) ago", quote.amount, age),
            );
        }
        Ok(preview)
    }

    fn execute(
        &self,
        db: &Database,
        ctx: &OrgContext,
        params: &ActionParams,
    ) -> Result<serde_json::Value> {
        let p = self.params(params)?;
        let mut followed = Vec::new();
        for quote in self.targets(db, ctx, p)? {
            if db.record_quote_follow_up(ctx.organization_id, quote.id, ctx.now())? {
                followed.push(quote.id);
            }
        }
        if followed.is_empty() {
            return Err(Error::Execution("No quotes were still open".into()));
        }
        Ok(json!({ "followed_up": followed.len(), "quote_ids": followed }))
    }
}

// ========== record_invoice_payment ==========

pub struct RecordInvoicePaymentHandler;

impl RecordInvoicePaymentHandler {
    fn params<'a>(&self, params: &'a ActionParams) -> Result<&'a RecordPaymentParams> {
        match params {
            ActionParams::RecordInvoicePayment(p) => Ok(p),
            other => Err(mismatch(ActionType::RecordInvoicePayment, other)),
        }
    }

    /// The invoice named by number, else the customer's open invoice (matching amount first)
    fn resolve(&self, db: &Database, ctx: &OrgContext, p: &RecordPaymentParams) -> Result<Invoice> {
        let org = ctx.organization_id;
        if let Some(number) = non_empty(&p.invoice_number) {
            return db
                .find_invoice_by_number(org, number)?
                .ok_or_else(|| Error::Validation(format!("Invoice {} not found", number)));
        }
        let Some(customer) = non_empty(&p.customer) else {
            return Err(Error::Validation(
                "Say which invoice was paid (number or customer)".into(),
            ));
        };
        require_customer(db, ctx, customer)?;

        let open = db.list_open_invoices_for_customer(org, customer)?;
        let matching = p.amount.and_then(|amount| {
            open.iter()
                .position(|i| (i.amount - amount).abs() < 0.005)
        });
        let index = matching.unwrap_or(0);
        open.into_iter()
            .nth(index)
            .ok_or_else(|| Error::Validation(format!("{} has no unpaid invoices", customer)))
    }
}

impl ActionHandler for RecordInvoicePaymentHandler {
    fn action_type(&self) -> ActionType {
        ActionType::RecordInvoicePayment
    }

    fn category(&self) -> &'static str {
        "sales"
    }

    fn required_permission(&self) -> Permission {
        Permission::ManageSales
    }

    fn validate(&self, db: &Database, ctx: &OrgContext, params: &ActionParams) -> Result<()> {
        let p = self.params(params)?;
        if let Some(amount) = p.amount {
            if !amount.is_finite() || amount <= 0.0 {
                return Err(Error::Validation(format!(
                    "Payment amount must be positive, got {}",
                    amount
                )));
            }
        }
        let invoice = self.resolve(db, ctx, p)?;
        if !matches!(invoice.status, InvoiceStatus::Sent | InvoiceStatus::Draft) {
            return Err(Error::Validation(format!(
                "Invoice {} is already {}",
                invoice.number,
                invoice.status.as_str()
            )));
        }
        Ok(())
    }

    fn preview(&self, db: &Database, ctx: &OrgContext, params: &ActionParams) -> Result<Preview> {
        let p = self.params(params)?;
        let invoice = self.resolve(db, ctx, p)?;
        let paid_on = p.date.unwrap_or_else(|| ctx.today());

        let mut preview = Preview::new(format!(
            "Mark {} from {} as paid",
            invoice.number, invoice.customer_name
        ))
        .item("Invoice", &invoice.number)
        .item("Customer", &invoice.customer_name)
        .item("Amount", format!("{:.2}", invoice.amount))
        .item("Paid on", paid_on);

        if let Some(amount) = p.amount {
            if (amount - invoice.amount).abs() >= 0.005 {
                preview = preview.warn(format!(
                    "Payment of {:.2} differs from the invoice total of {:.2}; the invoice total is recorded",
                    amount, invoice.amount
                ));
            }
        }
        Ok(preview)
    }

    fn execute(
        &self,
        db: &Database,
        ctx: &OrgContext,
        params: &ActionParams,
    ) -> Result<serde_json::Value> {
        let p = self.params(params)?;
        let invoice = self.resolve(db, ctx, p)?;
        let paid_on = p.date.unwrap_or_else(|| ctx.today());
        let org = ctx.organization_id;

        let payment = NewMovement {
            account_id: db.default_account_id(org)?,
            date: paid_on,
            description: format!("Payment {} {}", invoice.number, invoice.customer_name),
            amount: invoice.amount,
            direction: Direction::Income,
            category: Some("sales".into()),
        };
        // Invoice status and income movement commit together
        let Some(movement) = db.settle_invoice(org, invoice.id, &payment, ctx.now())? else {
            return Err(Error::Execution(format!(
                "Invoice {} could not be marked paid",
                invoice.number
            )));
        };

        Ok(json!({
            "invoice_id": invoice.id,
            "number": invoice.number,
            "amount": invoice.amount,
            "paid_date": paid_on,
            "movement_id": movement.id(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FixedClock;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ctx() -> OrgContext {
        OrgContext::system(1, 1).with_clock(FixedClock::on(2025, 3, 14))
    }

    fn seed_invoice(db: &Database, customer: &str, amount: f64, due: NaiveDate) -> Invoice {
        let customer_id = db.find_or_create_customer(1, customer).unwrap();
        db.create_invoice(
            1,
            &NewInvoice {
                customer_id,
                description: None,
                amount,
                status: InvoiceStatus::Sent,
                issue_date: d(2025, 2, 1),
                due_date: due,
            },
            ctx().now(),
        )
        .unwrap()
    }

    #[test]
    fn test_create_invoice_flow() {
        let db = Database::in_memory().unwrap();
        let ctx = ctx();
        let handler = CreateInvoiceHandler;
        let params = ActionParams::CreateInvoice(CreateInvoiceParams {
            customer: "Acme".into(),
            amount: 2500.0,
            description: Some("Catering".into()),
            issue_date: None,
            due_date: None,
        });

        handler.validate(&db, &ctx, &params).unwrap();
        let preview = handler.preview(&db, &ctx, &params).unwrap();
        assert_eq!(preview.summary, "Invoice Acme for 2500.00");
        assert!(preview.warnings[0].contains("new customer"));
        // Preview writes nothing
        assert!(db.find_customer(1, "Acme").unwrap().is_none());

        let result = handler.execute(&db, &ctx, &params).unwrap();
        assert_eq!(result["number"], "INV-0001");
        assert_eq!(result["due_date"], "2025-04-13");
        let invoice = db.find_invoice_by_number(1, "INV-0001").unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Sent);
    }

    #[test]
    fn test_create_invoice_validation() {
        let db = Database::in_memory().unwrap();
        let bad = ActionParams::CreateInvoice(CreateInvoiceParams {
            customer: " ".into(),
            amount: 10.0,
            description: None,
            issue_date: None,
            due_date: None,
        });
        assert!(matches!(
            CreateInvoiceHandler.validate(&db, &ctx(), &bad),
            Err(Error::Validation(_))
        ));

        let wrong = ActionParams::FollowUpQuote(FollowUpQuoteParams::default());
        assert!(matches!(
            CreateInvoiceHandler.validate(&db, &ctx(), &wrong),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_send_reminders_to_overdue() {
        let db = Database::in_memory().unwrap();
        let ctx = ctx();
        seed_invoice(&db, "Acme", 1500.0, d(2025, 3, 1));
        seed_invoice(&db, "Beta", 700.0, d(2025, 3, 30));

        let handler = SendInvoiceRemindersHandler;
        let params = ActionParams::SendInvoiceReminders(InvoiceRemindersParams::default());
        handler.validate(&db, &ctx, &params).unwrap();
        assert_eq!(handler.preview(&db, &ctx, &params).unwrap().items.len(), 1);

        let result = handler.execute(&db, &ctx, &params).unwrap();
        assert_eq!(result["reminded"], 1);
        let acme = db.find_invoice_by_number(1, "INV-0001").unwrap().unwrap();
        assert_eq!(acme.reminders_sent, 1);
    }

    #[test]
    fn test_reminders_unknown_customer() {
        let db = Database::in_memory().unwrap();
        let params = ActionParams::SendInvoiceReminders(InvoiceRemindersParams {
            customer: Some("Nobody".into()),
            invoice_number: None,
        });
        assert!(matches!(
            SendInvoiceRemindersHandler.validate(&db, &ctx(), &params),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_follow_up_quotes() {
        let db = Database::in_memory().unwrap();
        let ctx = ctx();
        let acme = db.create_customer(1, "Acme", None).unwrap();
        db.create_quote(1, acme, 400.0, d(2025, 3, 1)).unwrap();

        let params = ActionParams::FollowUpQuote(FollowUpQuoteParams {
            customer: Some("acme".into()),
        });
        FollowUpQuoteHandler.validate(&db, &ctx, &params).unwrap();
        let result = FollowUpQuoteHandler.execute(&db, &ctx, &params).unwrap();
        assert_eq!(result["followed_up"], 1);
        assert_eq!(db.list_open_quotes(1, None).unwrap()[0].follow_ups, 1);
    }

    #[test]
    fn test_record_payment_by_customer_and_amount() {
        let db = Database::in_memory().unwrap();
        let ctx = ctx();
        db.create_account(1, "Main", 100.0).unwrap();
        seed_invoice(&db, "Acme", 300.0, d(2025, 3, 1));
        seed_invoice(&db, "Acme", 900.0, d(2025, 3, 20));

        let params = ActionParams::RecordInvoicePayment(RecordPaymentParams {
            customer: Some("Acme".into()),
            amount: Some(900.0),
            ..Default::default()
        });
        let handler = RecordInvoicePaymentHandler;
        handler.validate(&db, &ctx, &params).unwrap();
        let result = handler.execute(&db, &ctx, &params).unwrap();
        assert_eq!(result["number"], "INV-0002");
        assert_eq!(db.cash_balance(1).unwrap(), 1000.0);

        // Paid invoices are rejected up front
        let again = ActionParams::RecordInvoicePayment(RecordPaymentParams {
            invoice_number: Some("INV-0002".into()),
            ..Default::default()
        });
        assert!(matches!(
            handler.validate(&db, &ctx, &again),
            Err(Error::Validation(_))
        ));
    }
}
