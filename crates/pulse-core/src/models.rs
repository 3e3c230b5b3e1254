//! Domain models for Pulse

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::actions::{ActionParams, Preview};
use crate::personalization::Tone;

// ========== Areas & perception ==========

/// Business area watched by one agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Area {
    Money,
    Sales,
    People,
    Inventory,
}

impl Area {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Money => "money",
            Self::Sales => "sales",
            Self::People => "people",
            Self::Inventory => "inventory",
        }
    }

    /// Fixed perception order
    pub fn all() -> &'static [Area] {
        &[Self::Money, Self::Sales, Self::People, Self::Inventory]
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Area {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "money" => Ok(Self::Money),
            "sales" => Ok(Self::Sales),
            "people" => Ok(Self::People),
            "inventory" => Ok(Self::Inventory),
            _ => Err(format!("Unknown area: {}", s)),
        }
    }
}

/// Direction of a metric over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    #[default]
    Stable,
}

impl Trend {
    /// Classify a percentage change against a symmetric band
    pub fn from_change(pct: f64, band: f64) -> Self {
        if pct > band {
            Self::Increasing
        } else if pct < -band {
            Self::Decreasing
        } else {
            Self::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::Stable => "stable",
        }
    }
}

/// Percentage change from `previous` to `current`; 0 when there is no base
pub fn percent_change(previous: f64, current: f64) -> f64 {
    if previous.abs() < f64::EPSILON {
        if current > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        (current - previous) / previous.abs() * 100.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoneyMetrics {
    pub cash_balance: f64,
    pub income_30d: f64,
    pub expenses_30d: f64,
    /// income_30d - expenses_30d
    pub net_cash_flow: f64,
    pub expenses_prev_30d: f64,
    pub spend_trend: Trend,
    pub budget_total: f64,
    pub budget_spent: f64,
    pub budget_usage_pct: f64,
    /// Budget lines with spent >= amount
    pub overrun_lines: Vec<String>,
    /// An `inventory` budget line is overrun
    pub inventory_budget_overrun: bool,
    pub uncategorized_movements: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesMetrics {
    pub revenue_this_month: f64,
    pub revenue_last_month: f64,
    pub growth_pct: f64,
    pub trend: Trend,
    pub overdue_invoices: i64,
    pub overdue_amount: f64,
    pub outstanding_invoices: i64,
    pub outstanding_amount: f64,
    pub open_quotes: i64,
    pub customers: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeopleMetrics {
    pub team_size: i64,
    pub pending_leave_requests: i64,
    /// Approved leave starting inside the configured window
    pub upcoming_leave: i64,
    pub next_payroll_date: Option<NaiveDate>,
    pub next_payroll_amount: f64,
    pub days_until_payroll: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryMetrics {
    pub total_items: i64,
    /// 0 < quantity <= reorder level
    pub low_stock: i64,
    /// quantity <= 0
    pub out_of_stock: i64,
    pub stock_value: f64,
    pub low_stock_items: Vec<String>,
    pub out_of_stock_items: Vec<String>,
}

/// Metrics of one area, as returned by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "area", rename_all = "snake_case")]
pub enum AreaMetrics {
    Money(MoneyMetrics),
    Sales(SalesMetrics),
    People(PeopleMetrics),
    Inventory(InventoryMetrics),
}

impl AreaMetrics {
    /// Empty-but-typed metrics for an area
    pub fn empty(area: Area) -> Self {
        match area {
            Area::Money => Self::Money(MoneyMetrics::default()),
            Area::Sales => Self::Sales(SalesMetrics::default()),
            Area::People => Self::People(PeopleMetrics::default()),
            Area::Inventory => Self::Inventory(InventoryMetrics::default()),
        }
    }

    pub fn area(&self) -> Area {
        match self {
            Self::Money(_) => Area::Money,
            Self::Sales(_) => Area::Sales,
            Self::People(_) => Area::People,
            Self::Inventory(_) => Area::Inventory,
        }
    }
}

/// Everything the agents saw in one cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerceptionSnapshot {
    pub money: MoneyMetrics,
    pub sales: SalesMetrics,
    pub people: PeopleMetrics,
    pub inventory: InventoryMetrics,
    /// Areas whose perception failed and hold empty metrics
    pub failed: Vec<Area>,
}

impl PerceptionSnapshot {
    pub fn insert(&mut self, metrics: AreaMetrics) {
        match metrics {
            AreaMetrics::Money(m) => self.money = m,
            AreaMetrics::Sales(m) => self.sales = m,
            AreaMetrics::People(m) => self.people = m,
            AreaMetrics::Inventory(m) => self.inventory = m,
        }
    }

    pub fn get(&self, area: Area) -> AreaMetrics {
        match area {
            Area::Money => AreaMetrics::Money(self.money.clone()),
            Area::Sales => AreaMetrics::Sales(self.sales.clone()),
            Area::People => AreaMetrics::People(self.people.clone()),
            Area::Inventory => AreaMetrics::Inventory(self.inventory.clone()),
        }
    }
}

// ========== State ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    #[default]
    Neutral,
    Concerned,
    Attentive,
    Optimistic,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Concerned => "concerned",
            Self::Attentive => "attentive",
            Self::Optimistic => "optimistic",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mood {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "neutral" => Ok(Self::Neutral),
            "concerned" => Ok(Self::Concerned),
            "attentive" => Ok(Self::Attentive),
            "optimistic" => Ok(Self::Optimistic),
            _ => Err(format!("Unknown mood: {}", s)),
        }
    }
}

/// Current understanding of one organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub id: i64,
    pub organization_id: i64,
    pub focus_area: String,
    pub urgency: f64,
    pub context: String,
    pub mood: Mood,
    pub priorities: Vec<String>,
    /// Archived perception snapshot of the last cycle
    pub perception_data: serde_json::Value,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of the decide step, applied onto the State
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub focus_area: String,
    pub urgency: f64,
    pub context: String,
    pub mood: Mood,
    pub priorities: Vec<String>,
}

// ========== Insights ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Warning,
    Opportunity,
    /// Fired by a cross-domain rule
    Correlation,
    Info,
}

impl InsightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Opportunity => "opportunity",
            Self::Correlation => "correlation",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for InsightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InsightType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "warning" => Ok(Self::Warning),
            "opportunity" => Ok(Self::Opportunity),
            "correlation" => Ok(Self::Correlation),
            "info" => Ok(Self::Info),
            _ => Err(format!("Unknown insight type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightStatus {
    Active,
    Dismissed,
    Completed,
    /// Not regenerated by the latest cycle
    Expired,
}

impl InsightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Dismissed => "dismissed",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for InsightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InsightStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "dismissed" => Ok(Self::Dismissed),
            "completed" => Ok(Self::Completed),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Unknown insight status: {}", s)),
        }
    }
}

/// A persisted insight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: i64,
    pub organization_id: i64,
    pub source_state_id: Option<i64>,
    pub insight_type: InsightType,
    pub category: String,
    pub title: String,
    pub description: String,
    pub priority: f64,
    pub is_actionable: bool,
    pub suggested_actions: Vec<String>,
    pub action_url: Option<String>,
    pub status: InsightStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An insight produced by an agent or a rule (before reconciliation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightDraft {
    pub insight_type: InsightType,
    pub category: String,
    pub title: String,
    pub description: String,
    pub priority: f64,
    pub is_actionable: bool,
    pub suggested_actions: Vec<String>,
    pub action_url: Option<String>,
}

impl InsightDraft {
    pub fn new(
        insight_type: InsightType,
        category: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        priority: f64,
    ) -> Self {
        Self {
            insight_type,
            category: category.into(),
            title: title.into(),
            description: description.into(),
            priority: priority.clamp(0.0, 1.0),
            is_actionable: false,
            suggested_actions: Vec::new(),
            action_url: None,
        }
    }

    /// Mark actionable with suggested follow-ups
    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggested_actions = actions.into_iter().map(Into::into).collect();
        self.is_actionable = !self.suggested_actions.is_empty();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    /// Upsert identity among active insights
    pub fn identity(&self) -> (&str, &str) {
        (&self.category, &self.title)
    }
}

// ========== Predictions ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionType {
    CashFlow,
    BudgetBurn,
    SalesRevenue,
    InventoryNeeds,
}

impl PredictionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CashFlow => "cash_flow",
            Self::BudgetBurn => "budget_burn",
            Self::SalesRevenue => "sales_revenue",
            Self::InventoryNeeds => "inventory_needs",
        }
    }
}

impl fmt::Display for PredictionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PredictionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cash_flow" => Ok(Self::CashFlow),
            "budget_burn" => Ok(Self::BudgetBurn),
            "sales_revenue" => Ok(Self::SalesRevenue),
            "inventory_needs" => Ok(Self::InventoryNeeds),
            _ => Err(format!("Unknown prediction type: {}", s)),
        }
    }
}

/// A persisted forecast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: i64,
    pub organization_id: i64,
    pub prediction_type: PredictionType,
    pub category: String,
    /// Identifies the generation run
    pub prediction_date: DateTime<Utc>,
    pub target_date: NaiveDate,
    pub predicted_value: f64,
    pub confidence: f64,
    pub factors: serde_json::Value,
    pub metadata: serde_json::Value,
    pub actual_value: Option<f64>,
    pub accuracy: Option<f64>,
}

/// A forecast before persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPrediction {
    pub prediction_type: PredictionType,
    pub category: String,
    pub target_date: NaiveDate,
    pub predicted_value: f64,
    pub confidence: f64,
    pub factors: serde_json::Value,
    pub metadata: serde_json::Value,
}

// ========== Actions ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateInvoice,
    SendInvoiceReminders,
    FollowUpQuote,
    RecordInvoicePayment,
    CategorizeTransactions,
    CreateTransaction,
    GenerateReport,
    CreateOrganization,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateInvoice => "create_invoice",
            Self::SendInvoiceReminders => "send_invoice_reminders",
            Self::FollowUpQuote => "follow_up_quote",
            Self::RecordInvoicePayment => "record_invoice_payment",
            Self::CategorizeTransactions => "categorize_transactions",
            Self::CreateTransaction => "create_transaction",
            Self::GenerateReport => "generate_report",
            Self::CreateOrganization => "create_organization",
        }
    }

    pub fn all() -> &'static [ActionType] {
        &[
            Self::CreateInvoice,
            Self::SendInvoiceReminders,
            Self::FollowUpQuote,
            Self::RecordInvoicePayment,
            Self::CategorizeTransactions,
            Self::CreateTransaction,
            Self::GenerateReport,
            Self::CreateOrganization,
        ]
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::all()
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown action type: {}", s))
    }
}

/// Action lifecycle: pending -> confirmed -> executing -> executed | failed,
/// or pending -> cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Confirmed,
    Executing,
    Executed,
    Failed,
    Cancelled,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "executing" => Ok(Self::Executing),
            "executed" => Ok(Self::Executed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown action status: {}", s)),
        }
    }
}

/// A proposed or executed state-changing action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: i64,
    pub organization_id: i64,
    pub user_id: i64,
    pub action_type: ActionType,
    pub category: String,
    pub status: ActionStatus,
    pub parameters: ActionParams,
    pub preview: Preview,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub was_successful: Option<bool>,
    pub rating: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Most recent context samples kept per pattern list
pub const PATTERN_CONTEXT_LIMIT: usize = 10;

/// Confidence below which an action type is not suggested
pub const SUGGESTION_THRESHOLD: f64 = 0.6;

/// Learned feedback for one (organization, user, action type)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPattern {
    pub id: i64,
    pub organization_id: i64,
    pub user_id: i64,
    pub action_type: ActionType,
    pub times_suggested: i64,
    pub times_confirmed: i64,
    pub times_rejected: i64,
    pub times_successful: i64,
    pub successful_contexts: Vec<serde_json::Value>,
    pub failed_contexts: Vec<serde_json::Value>,
    pub avg_rating: Option<f64>,
    pub ratings_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActionPattern {
    /// 0.5 until three decisions were seen, then 0.6 x confirm rate + 0.4 x success rate
    pub fn confidence(&self) -> f64 {
        pattern_confidence(
            self.times_confirmed,
            self.times_rejected,
            self.times_successful,
        )
    }

    pub fn is_suggestable(&self) -> bool {
        self.confidence() >= SUGGESTION_THRESHOLD
    }
}

pub fn pattern_confidence(confirmed: i64, rejected: i64, successful: i64) -> f64 {
    let decided = confirmed + rejected;
    if decided < 3 {
        return 0.5;
    }
    let confirm_rate = confirmed as f64 / decided as f64;
    let success_rate = if confirmed > 0 {
        (successful as f64 / confirmed as f64).min(1.0)
    } else {
        0.0
    };
    0.6 * confirm_rate + 0.4 * success_rate
}

/// Append a sample keeping only the newest [`PATTERN_CONTEXT_LIMIT`] entries
pub fn push_bounded(list: &mut Vec<serde_json::Value>, sample: serde_json::Value) {
    list.push(sample);
    if list.len() > PATTERN_CONTEXT_LIMIT {
        let excess = list.len() - PATTERN_CONTEXT_LIMIT;
        list.drain(..excess);
    }
}

// ========== Organizations & audit ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub currency: String,
    pub tone: Tone,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub organization_id: i64,
    pub user_id: Option<i64>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<i64>,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ========== Data sources ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub balance: f64,
}

/// Flow direction of a movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Income,
    Expense,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    /// Sign applied to an account balance
    pub fn sign(&self) -> f64 {
        match self {
            Self::Income => 1.0,
            Self::Expense => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" | "in" | "credit" => Ok(Self::Income),
            "expense" | "out" | "debit" => Ok(Self::Expense),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

/// A money movement on an account. `amount` is always positive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movement {
    pub id: i64,
    pub organization_id: i64,
    pub account_id: Option<i64>,
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    pub direction: Direction,
    pub category: Option<String>,
    pub import_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMovement {
    pub account_id: Option<i64>,
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    pub direction: Direction,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetLine {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub category: String,
    pub amount: f64,
    /// Expense movements of the line's category inside its period
    pub spent: f64,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

impl BudgetLine {
    pub fn remaining(&self) -> f64 {
        self.amount - self.spent
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            "paid" => Ok(Self::Paid),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown invoice status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub organization_id: i64,
    pub customer_id: i64,
    pub customer_name: String,
    pub number: String,
    pub description: Option<String>,
    pub amount: f64,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub paid_date: Option<NaiveDate>,
    pub reminders_sent: i64,
    pub last_reminder_at: Option<DateTime<Utc>>,
}

impl Invoice {
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == InvoiceStatus::Sent && self.due_date < today
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Open,
    Accepted,
    Declined,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }
}

impl FromStr for QuoteStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            _ => Err(format!("Unknown quote status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub id: i64,
    pub organization_id: i64,
    pub customer_id: i64,
    pub customer_name: String,
    pub amount: f64,
    pub status: QuoteStatus,
    pub issued_date: NaiveDate,
    pub follow_ups: i64,
    pub last_follow_up_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub role: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

impl LeaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollRun {
    pub id: i64,
    pub organization_id: i64,
    pub pay_date: NaiveDate,
    pub amount: f64,
    /// `scheduled` or `paid`
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockItem {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub sku: Option<String>,
    pub quantity: f64,
    pub reorder_level: f64,
    pub unit_cost: f64,
}
