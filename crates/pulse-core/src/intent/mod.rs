//! Deterministic intent classification
//!
//! An utterance is matched against an ordered dispatch table: bank-statement text
//! first, then action requests (each with its own sub-parser), then query
//! classifiers, then `general`. Order alone resolves overlapping keywords.

mod extract;
mod statement;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::actions::{
    ActionParams, CategorizeParams, CreateInvoiceParams, CreateOrganizationParams,
    FollowUpQuoteParams, InvoiceRemindersParams, RecordPaymentParams, ReportKind, ReportParams,
    TransactionSource,
};
use crate::categorizer::Categorizer;
use crate::error::Result;
use crate::models::{ActionType, Direction};
use crate::period::ReportPeriod;
use crate::personalization::Tone;

pub use extract::{month_number, Extractor};
pub use statement::{StatementLine, StatementParser};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Greeting,
    QueryCash,
    QueryBudget,
    QueryExpenses,
    QueryTransactions,
    QueryInvoices,
    QuerySales,
    QueryTeam,
    QueryPayroll,
    QueryInventory,
    QueryFocus,
    QueryInsights,
    Action,
    General,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::QueryCash => "query_cash",
            Self::QueryBudget => "query_budget",
            Self::QueryExpenses => "query_expenses",
            Self::QueryTransactions => "query_transactions",
            Self::QueryInvoices => "query_invoices",
            Self::QuerySales => "query_sales",
            Self::QueryTeam => "query_team",
            Self::QueryPayroll => "query_payroll",
            Self::QueryInventory => "query_inventory",
            Self::QueryFocus => "query_focus",
            Self::QueryInsights => "query_insights",
            Self::Action => "action",
            Self::General => "general",
        }
    }
}

/// A classified utterance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Intent {
    pub kind: IntentKind,
    /// Present exactly when `kind` is `Action`
    pub params: Option<ActionParams>,
    pub period: Option<ReportPeriod>,
    pub confidence: f64,
}

impl Intent {
    fn query(kind: IntentKind, period: Option<ReportPeriod>) -> Self {
        Self {
            kind,
            params: None,
            period,
            confidence: 0.9,
        }
    }

    fn action(params: ActionParams, period: Option<ReportPeriod>, confidence: f64) -> Self {
        Self {
            kind: IntentKind::Action,
            params: Some(params),
            period,
            confidence,
        }
    }

    pub fn action_type(&self) -> Option<ActionType> {
        self.params.as_ref().map(ActionParams::action_type)
    }

    pub fn is_action(&self) -> bool {
        self.kind == IntentKind::Action
    }
}

/// One utterance in the forms the classifiers need
struct Utterance<'a> {
    original: &'a str,
    lower: String,
    today: NaiveDate,
}

impl Utterance<'_> {
    fn has_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.lower.contains(n))
    }
}

type SubParser = fn(&IntentParser, &Utterance) -> Option<ActionParams>;

/// Action sub-parsers in precedence order
const ACTION_PARSERS: &[(&str, SubParser)] = &[
    ("create_invoice", IntentParser::create_invoice),
    ("send_invoice_reminders", IntentParser::send_invoice_reminders),
    ("follow_up_quote", IntentParser::follow_up_quote),
    ("record_invoice_payment", IntentParser::record_invoice_payment),
    ("categorize_transactions", IntentParser::categorize_transactions),
    ("create_transaction", IntentParser::create_transaction),
    ("generate_report", IntentParser::generate_report),
    ("create_organization", IntentParser::create_organization),
];

/// Query classifiers after the greeting check, in precedence order
const QUERY_KEYWORDS: &[(IntentKind, &[&str])] = &[
    (IntentKind::QueryCash, &["cash", "balance", "bank", "money do i have", "runway"]),
    (IntentKind::QueryBudget, &["budget", "overspen"]),
    (IntentKind::QueryExpenses, &["expense", "spend", "spent", "cost"]),
    (IntentKind::QueryTransactions, &["transaction", "movement", "payments"]),
    (
        IntentKind::QueryInvoices,
        &["invoice", "owe", "overdue", "unpaid", "receivable"],
    ),
    (IntentKind::QuerySales, &["sales", "revenue", "selling", "sold", "customers"]),
    (IntentKind::QueryTeam, &["team", "staff", "employee", "leave", "vacation"]),
    (IntentKind::QueryPayroll, &["payroll", "salary", "salaries", "wages", "payday"]),
    (IntentKind::QueryInventory, &["stock", "inventory", "reorder"]),
    (
        IntentKind::QueryFocus,
        &[
            "focus",
            "priorit",
            "what should i",
            "how is my business",
            "how's business",
            "how are we doing",
            "overview",
        ],
    ),
    (
        IntentKind::QueryInsights,
        &["insight", "alert", "warning", "issue", "problem", "recommend"],
    ),
];

pub struct IntentParser {
    extract: Extractor,
    statements: StatementParser,
    categorizer: Categorizer,
    action_verbs: Regex,
    greeting: Regex,
    description: Regex,
    org_name: Regex,
    currency_code: Regex,
}

impl IntentParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            extract: Extractor::new()?,
            statements: StatementParser::new()?,
            categorizer: Categorizer::new()?,
            action_verbs: Regex::new(
                r"\b(?:(?:send|create|generate|schedule|approve|record|make|add|remind|mark|log|issue|bill)(?:s|ed|ing|er|ers)?|follow[\s-]?up|categori[sz]e|show me|give me|reports?)\b",
            )?,
            greeting: Regex::new(
                r"^(?:hi|hello|hey|hiya|howdy|jambo|habari|good (?:morning|afternoon|evening))\b",
            )?,
            description: Regex::new(r"(?i)\b(?:for|on)\s+(.+)$")?,
            org_name: Regex::new(r"(?i)\b(?:called|named)\s+(.+?)(?:\s+(?:in|with|using)\s+.*)?$")?,
            currency_code: Regex::new(r"\b(KES|USD|EUR|GBP|UGX|TZS|NGN|ZAR|INR|CAD|AUD)\b")?,
        })
    }

    pub fn statements(&self) -> &StatementParser {
        &self.statements
    }

    /// Classify one utterance
    pub fn parse(&self, text: &str, today: NaiveDate) -> Intent {
        let u = Utterance {
            original: text.trim(),
            lower: text.trim().to_lowercase(),
            today,
        };
        let intent = self.classify(&u);
        debug!(kind = intent.kind.as_str(), confidence = intent.confidence, "Intent parsed");
        intent
    }

    fn classify(&self, u: &Utterance) -> Intent {
        if self.statements.looks_like_statement(u.original) {
            return Intent::action(
                ActionParams::CreateTransaction(TransactionSource::Statement {
                    text: u.original.to_string(),
                }),
                None,
                0.95,
            );
        }

        let period = self.extract.period(&u.lower, u.original);

        if self.action_verbs.is_match(&u.lower) {
            for (name, parser) in ACTION_PARSERS {
                if let Some(params) = parser(self, u) {
                    debug!(sub_parser = name, "Action request matched");
                    return Intent::action(params, period, 0.9);
                }
            }
        }

        if self.greeting.is_match(&u.lower) && u.lower.split_whitespace().count() <= 5 {
            return Intent {
                kind: IntentKind::Greeting,
                params: None,
                period: None,
                confidence: 1.0,
            };
        }

        for (kind, keywords) in QUERY_KEYWORDS {
            if !u.has_any(keywords) {
                continue;
            }
            if *kind == IntentKind::QueryExpenses {
                if let Some(params) = self.reportable_expenses(u, period) {
                    return Intent::action(params, period, 0.9);
                }
            }
            return Intent::query(*kind, period);
        }

        Intent {
            kind: IntentKind::General,
            params: None,
            period,
            confidence: 0.5,
        }
    }

    /// Expense questions naming a category or a window become a report
    fn reportable_expenses(&self, u: &Utterance, period: Option<ReportPeriod>) -> Option<ActionParams> {
        let category = self.categorizer.detect_category(&u.lower);
        if category.is_none() && period.is_none() {
            return None;
        }
        Some(ActionParams::GenerateReport(ReportParams {
            kind: ReportKind::Expenses,
            period,
            category,
            limit: None,
        }))
    }

    // ========== Action sub-parsers ==========

    fn create_invoice(&self, u: &Utterance) -> Option<ActionParams> {
        let creating = u.has_any(&["create", "make", "generate", "issue", "raise", "new ", "send an invoice", "send invoice"]);
        if !u.lower.contains("invoice")
            || !creating
            || u.has_any(&["remind", "report", "paid", "payment"])
        {
            return None;
        }
        let issue_date = self.extract.date(u.original);
        let due_date = self
            .extract
            .due_in(u.original, issue_date.unwrap_or(u.today));
        Some(ActionParams::CreateInvoice(CreateInvoiceParams {
            customer: self.extract.customer(u.original).unwrap_or_default(),
            amount: self.extract.amount(u.original).unwrap_or(0.0),
            description: None,
            issue_date,
            due_date,
        }))
    }

    fn send_invoice_reminders(&self, u: &Utterance) -> Option<ActionParams> {
        let chasing = u.has_any(&["remind"])
            || (u.has_any(&["chase", "follow up", "follow-up", "followup"])
                && u.has_any(&["invoice", "payment", "overdue"]));
        if !chasing || u.lower.contains("quote") {
            return None;
        }
        Some(ActionParams::SendInvoiceReminders(InvoiceRemindersParams {
            customer: self.extract.customer(u.original),
            invoice_number: self.extract.invoice_number(u.original),
        }))
    }

    fn follow_up_quote(&self, u: &Utterance) -> Option<ActionParams> {
        if !u.lower.contains("quote")
            || !u.has_any(&["follow", "chase", "check in", "remind"])
        {
            return None;
        }
        Some(ActionParams::FollowUpQuote(FollowUpQuoteParams {
            customer: self.extract.customer(u.original),
        }))
    }

    fn record_invoice_payment(&self, u: &Utterance) -> Option<ActionParams> {
        let marked_paid = u.lower.contains("paid") && u.has_any(&["mark", "record", "log"]);
        let payment_in = u.lower.contains("payment")
            && u.has_any(&["record", "log", "received", "got"])
            && (u.has_any(&["invoice", "inv"]) || self.extract.customer(u.original).is_some());
        if !marked_paid && !payment_in {
            return None;
        }
        Some(ActionParams::RecordInvoicePayment(RecordPaymentParams {
            invoice_number: self.extract.invoice_number(u.original),
            customer: self.extract.customer(u.original),
            amount: self.extract.amount(u.original),
            date: self.extract.date(u.original),
        }))
    }

    fn categorize_transactions(&self, u: &Utterance) -> Option<ActionParams> {
        if !u.has_any(&["categori", "classify", "sort my transactions", "tag my transactions"]) {
            return None;
        }
        Some(ActionParams::CategorizeTransactions(CategorizeParams {
            limit: self.extract.limit(&u.lower),
        }))
    }

    fn create_transaction(&self, u: &Utterance) -> Option<ActionParams> {
        let verb = u.has_any(&["record", "add", "log", "create"]);
        let noun = u.has_any(&[
            "expense", "income", "transaction", "spent", "paid for", "bought", "purchase", "sale",
            "sold", "received",
        ]);
        if !verb || !noun {
            return None;
        }
        let amount = self.extract.amount(u.original)?;
        let direction = if u.has_any(&["income", "received", "sale", "sold", "deposit"]) {
            Direction::Income
        } else {
            Direction::Expense
        };
        let description = self
            .description
            .captures(u.original)
            .map(|c| c[1].trim().trim_end_matches(['.', '!']).to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| u.original.to_string());
        Some(ActionParams::CreateTransaction(TransactionSource::Single {
            description,
            amount,
            direction,
            date: self.extract.date(u.original),
            category: None,
        }))
    }

    fn generate_report(&self, u: &Utterance) -> Option<ActionParams> {
        if !u.has_any(&["report", "show me", "give me", "summary", "breakdown", "list "]) {
            return None;
        }
        let kind = if u.has_any(&["transaction", "movement"]) {
            ReportKind::Transactions
        } else if u.has_any(&["expense", "spend", "spent", "spending", "cost"]) {
            ReportKind::Expenses
        } else if u.has_any(&["sales", "revenue", "invoice"]) {
            ReportKind::Sales
        } else if u.has_any(&["cash flow", "cashflow", "cash"]) {
            ReportKind::CashFlow
        } else if u.has_any(&["report", "summary", "overview"]) {
            ReportKind::Summary
        } else {
            return None;
        };
        let category = match kind {
            ReportKind::Expenses | ReportKind::Transactions => {
                self.categorizer.detect_category(&u.lower)
            }
            _ => None,
        };
        Some(ActionParams::GenerateReport(ReportParams {
            kind,
            period: self.extract.period(&u.lower, u.original),
            category,
            limit: self.extract.limit(&u.lower),
        }))
    }

    fn create_organization(&self, u: &Utterance) -> Option<ActionParams> {
        if !u.has_any(&["create", "set up", "add", "register", "new"])
            || !u.has_any(&["organization", "organisation", "business", "company"])
        {
            return None;
        }
        let name = self
            .org_name
            .captures(u.original)
            .map(|c| c[1].trim().trim_end_matches(['.', '!']).to_string())
            .unwrap_or_default();
        let tone = [Tone::Formal, Tone::Friendly, Tone::Concise]
            .into_iter()
            .find(|t| u.lower.contains(t.as_str()));
        Some(ActionParams::CreateOrganization(CreateOrganizationParams {
            name,
            currency: self
                .currency_code
                .captures(u.original)
                .map(|c| c[1].to_string()),
            tone,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn parse(text: &str) -> Intent {
        IntentParser::new().unwrap().parse(text, today())
    }

    #[test]
    fn test_last_n_transactions_is_report_action() {
        let intent = parse("show me the last 3 transactions");
        assert_eq!(intent.kind, IntentKind::Action);
        assert_eq!(intent.confidence, 0.9);
        assert_eq!(
            intent.params,
            Some(ActionParams::GenerateReport(ReportParams {
                kind: ReportKind::Transactions,
                period: None,
                category: None,
                limit: Some(3),
            }))
        );
    }

    #[test]
    fn test_create_invoice() {
        let intent = parse("Create an invoice for Acme Ltd for KES 45,000 due in 14 days");
        match intent.params {
            Some(ActionParams::CreateInvoice(p)) => {
                assert_eq!(p.customer, "Acme Ltd");
                assert_eq!(p.amount, 45000.0);
                assert_eq!(p.due_date, NaiveDate::from_ymd_opt(2025, 3, 28));
            }
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[test]
    fn test_create_invoice_with_unreachable_due_date() {
        let intent = parse("Create an invoice for Acme for $500 due in 9999999999 days");
        match intent.params {
            Some(ActionParams::CreateInvoice(p)) => {
                assert_eq!(p.customer, "Acme");
                assert_eq!(p.due_date, None);
            }
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[test]
    fn test_reminders_precede_invoice_creation() {
        let intent = parse("Send invoice reminders to Acme");
        assert_eq!(intent.action_type(), Some(ActionType::SendInvoiceReminders));

        let intent = parse("remind everyone with overdue invoices");
        assert_eq!(intent.action_type(), Some(ActionType::SendInvoiceReminders));
    }

    #[test]
    fn test_quote_follow_up() {
        let intent = parse("Follow up on the quote for Baraka Hardware");
        assert_eq!(
            intent.params,
            Some(ActionParams::FollowUpQuote(FollowUpQuoteParams {
                customer: Some("Baraka Hardware".into())
            }))
        );
    }

    #[test]
    fn test_record_payment() {
        let intent = parse("Mark INV-0042 as paid");
        match intent.params {
            Some(ActionParams::RecordInvoicePayment(p)) => {
                assert_eq!(p.invoice_number.as_deref(), Some("INV-0042"));
                assert_eq!(p.amount, None);
            }
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[test]
    fn test_categorize() {
        let intent = parse("Please categorise my transactions");
        assert_eq!(intent.action_type(), Some(ActionType::CategorizeTransactions));
    }

    #[test]
    fn test_create_transaction() {
        let intent = parse("Record an expense of 2,500 for fuel");
        match intent.params {
            Some(ActionParams::CreateTransaction(TransactionSource::Single {
                description,
                amount,
                direction,
                ..
            })) => {
                assert_eq!(description, "fuel");
                assert_eq!(amount, 2500.0);
                assert_eq!(direction, Direction::Expense);
            }
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[test]
    fn test_create_organization() {
        let intent = parse("Create a new business called Mama Mboga Grocers in KES");
        assert_eq!(
            intent.params,
            Some(ActionParams::CreateOrganization(CreateOrganizationParams {
                name: "Mama Mboga Grocers".into(),
                currency: Some("KES".into()),
                tone: None,
            }))
        );
    }

    #[test]
    fn test_statement_detection_wins() {
        let text = "02 Mar POS purchase Naivas 1,250.00 48,750.00\n\
                    05 Mar Salary in CR 60,000.00 108,750.00";
        let intent = parse(text);
        assert_eq!(intent.confidence, 0.95);
        assert!(matches!(
            intent.params,
            Some(ActionParams::CreateTransaction(TransactionSource::Statement { .. }))
        ));
    }

    #[test]
    fn test_queries() {
        assert_eq!(parse("Hello!").kind, IntentKind::Greeting);
        assert_eq!(parse("Hello!").confidence, 1.0);
        assert_eq!(parse("How much cash do I have?").kind, IntentKind::QueryCash);
        assert_eq!(parse("Are we over budget?").kind, IntentKind::QueryBudget);
        assert_eq!(parse("what are my expenses").kind, IntentKind::QueryExpenses);
        assert_eq!(parse("who owes me money").kind, IntentKind::QueryInvoices);
        assert_eq!(parse("how are sales going").kind, IntentKind::QuerySales);
        assert_eq!(parse("who is on leave").kind, IntentKind::QueryTeam);
        assert_eq!(parse("when is payday").kind, IntentKind::QueryPayroll);
        assert_eq!(parse("what needs to be reordered").kind, IntentKind::QueryInventory);
        assert_eq!(parse("what should I focus on").kind, IntentKind::QueryFocus);
        assert_eq!(parse("any alerts?").kind, IntentKind::QueryInsights);
    }

    #[test]
    fn test_query_precedence_is_ordered() {
        // Cash is checked before budget
        assert_eq!(parse("is my cash balance within budget").kind, IntentKind::QueryCash);
        // Expenses before transactions
        assert_eq!(
            parse("which transactions were expenses").kind,
            IntentKind::QueryExpenses
        );
    }

    #[test]
    fn test_reportable_expense_question() {
        let intent = parse("How much did I spend on rent last month?");
        assert_eq!(
            intent.params,
            Some(ActionParams::GenerateReport(ReportParams {
                kind: ReportKind::Expenses,
                period: Some(ReportPeriod::LastMonth),
                category: Some("rent".into()),
                limit: None,
            }))
        );
    }

    #[test]
    fn test_general_fallback() {
        let intent = parse("tell me a joke");
        assert_eq!(intent.kind, IntentKind::General);
        assert_eq!(intent.confidence, 0.5);
        assert!(intent.params.is_none());
    }
}
