//! State-changing actions
//!
//! Every action goes through `prepare -> confirm -> execute`, with a human-readable
//! [`Preview`] shown before anything is written. Handlers are resolved from an
//! [`ActionRegistry`] by [`ActionType`]; the [`ActionPipeline`] owns persistence,
//! status transitions and pattern learning.

mod invoices;
mod organizations;
mod pipeline;
mod reports;
mod transactions;

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::context::{OrgContext, Permission};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{ActionType, Direction};
use crate::period::ReportPeriod;
use crate::personalization::Tone;

pub use invoices::{
    CreateInvoiceHandler, FollowUpQuoteHandler, RecordInvoicePaymentHandler,
    SendInvoiceRemindersHandler,
};
pub use organizations::CreateOrganizationHandler;
pub use pipeline::{ActionPipeline, Suggestion};
pub use reports::{GenerateReportHandler, Report, ReportRow};
pub use transactions::{CategorizeTransactionsHandler, CreateTransactionHandler};

// ========== Parameters ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateInvoiceParams {
    pub customer: String,
    pub amount: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

/// Targets one invoice, one customer's open invoices, or every overdue invoice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRemindersParams {
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub invoice_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FollowUpQuoteParams {
    #[serde(default)]
    pub customer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPaymentParams {
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategorizeParams {
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionSource {
    Single {
        description: String,
        amount: f64,
        direction: Direction,
        #[serde(default)]
        date: Option<NaiveDate>,
        #[serde(default)]
        category: Option<String>,
    },
    /// Pasted bank-statement text, parsed line by line
    Statement { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Transactions,
    Expenses,
    Sales,
    CashFlow,
    Summary,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transactions => "transactions",
            Self::Expenses => "expenses",
            Self::Sales => "sales",
            Self::CashFlow => "cash_flow",
            Self::Summary => "summary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportParams {
    pub kind: ReportKind,
    #[serde(default)]
    pub period: Option<ReportPeriod>,
    #[serde(default)]
    pub category: Option<String>,
    /// Row limit for listings
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrganizationParams {
    pub name: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub tone: Option<Tone>,
}

/// Typed parameters, one variant per action type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionParams {
    CreateInvoice(CreateInvoiceParams),
    SendInvoiceReminders(InvoiceRemindersParams),
    FollowUpQuote(FollowUpQuoteParams),
    RecordInvoicePayment(RecordPaymentParams),
    CategorizeTransactions(CategorizeParams),
    CreateTransaction(TransactionSource),
    GenerateReport(ReportParams),
    CreateOrganization(CreateOrganizationParams),
}

impl ActionParams {
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::CreateInvoice(_) => ActionType::CreateInvoice,
            Self::SendInvoiceReminders(_) => ActionType::SendInvoiceReminders,
            Self::FollowUpQuote(_) => ActionType::FollowUpQuote,
            Self::RecordInvoicePayment(_) => ActionType::RecordInvoicePayment,
            Self::CategorizeTransactions(_) => ActionType::CategorizeTransactions,
            Self::CreateTransaction(_) => ActionType::CreateTransaction,
            Self::GenerateReport(_) => ActionType::GenerateReport,
            Self::CreateOrganization(_) => ActionType::CreateOrganization,
        }
    }
}

fn mismatch(expected: ActionType, got: &ActionParams) -> Error {
    Error::Validation(format!(
        "{} action received {} parameters",
        expected,
        got.action_type()
    ))
}

// ========== Preview ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewItem {
    pub label: String,
    pub value: String,
}

/// What an action will do, shown before confirmation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preview {
    pub summary: String,
    #[serde(default)]
    pub items: Vec<PreviewItem>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Preview {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Default::default()
        }
    }

    pub fn item(mut self, label: impl Into<String>, value: impl ToString) -> Self {
        self.items.push(PreviewItem {
            label: label.into(),
            value: value.to_string(),
        });
        self
    }

    pub fn warn(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

// ========== Handlers ==========

/// One executable action type
///
/// `validate` and `preview` never write. `execute` runs at most once per action,
/// guarded by the pipeline's status compare-and-set.
pub trait ActionHandler: Send + Sync {
    fn action_type(&self) -> ActionType;

    /// Grouping label stored with the action
    fn category(&self) -> &'static str;

    fn required_permission(&self) -> Permission;

    fn validate(&self, db: &Database, ctx: &OrgContext, params: &ActionParams) -> Result<()>;

    fn preview(&self, db: &Database, ctx: &OrgContext, params: &ActionParams) -> Result<Preview>;

    /// Apply the action; the returned value is stored as the action's result
    fn execute(
        &self,
        db: &Database,
        ctx: &OrgContext,
        params: &ActionParams,
    ) -> Result<serde_json::Value>;
}

/// Handler lookup by action type
pub struct ActionRegistry {
    handlers: HashMap<ActionType, Box<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with every built-in handler
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::empty();
        registry.register(Box::new(CreateInvoiceHandler));
        registry.register(Box::new(SendInvoiceRemindersHandler));
        registry.register(Box::new(FollowUpQuoteHandler));
        registry.register(Box::new(RecordInvoicePaymentHandler));
        registry.register(Box::new(CategorizeTransactionsHandler::new()?));
        registry.register(Box::new(CreateTransactionHandler::new()?));
        registry.register(Box::new(GenerateReportHandler));
        registry.register(Box::new(CreateOrganizationHandler));
        Ok(registry)
    }

    /// Register a handler, replacing any previous one for the same type
    pub fn register(&mut self, handler: Box<dyn ActionHandler>) {
        self.handlers.insert(handler.action_type(), handler);
    }

    pub fn get(&self, action_type: ActionType) -> Result<&dyn ActionHandler> {
        self.handlers
            .get(&action_type)
            .map(|h| h.as_ref())
            .ok_or_else(|| Error::Validation(format!("No handler for action {}", action_type)))
    }

    pub fn action_types(&self) -> Vec<ActionType> {
        ActionType::all()
            .iter()
            .copied()
            .filter(|t| self.handlers.contains_key(t))
            .collect()
    }
}
