//! Chat entry point
//!
//! Turns a classified utterance into a response. Actions are prepared through the
//! [`ActionPipeline`] and returned for confirmation. Queries are answered from
//! facts the engine computed itself; the optional LLM only rephrases those facts,
//! under a timeout, and a deterministic template is used whenever it fails.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::actions::{
    ActionParams, ActionPipeline, GenerateReportHandler, Preview, ReportKind, ReportParams,
    TransactionSource,
};
use crate::agents::agent_for;
use crate::ai::{AIBackend, AIClient, ChatTurn, CompletionRequest};
use crate::config::EngineConfig;
use crate::context::OrgContext;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::intent::{Intent, IntentKind, IntentParser};
use crate::models::{Area, AreaMetrics, PredictionType};
use crate::personalization::{Personalization, Tone};

/// Labels of the controls rendered next to a pending action
pub const QUICK_ACTIONS: [&str; 3] = ["Confirm", "Edit", "Cancel"];

/// Prior turns passed to the renderer
const HISTORY_TURNS: usize = 6;

/// Rows listed when the user asks for recent transactions
const RECENT_TRANSACTIONS: i64 = 10;

/// A pending action awaiting the user's decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAction {
    pub action_id: i64,
    pub requires_confirmation: bool,
    pub preview: Preview,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ChatAction>,
    #[serde(default)]
    pub quick_actions: Vec<String>,
}

impl ChatResponse {
    fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            action: None,
            quick_actions: Vec::new(),
        }
    }
}

/// Facts gathered for one query
struct DataContext {
    /// Noun used in headings and the no-data message
    topic: &'static str,
    facts: Vec<String>,
}

impl DataContext {
    fn new(topic: &'static str) -> Self {
        Self {
            topic,
            facts: Vec::new(),
        }
    }

    fn push(&mut self, fact: impl Into<String>) {
        self.facts.push(fact.into());
    }

    fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    fn render(&self) -> String {
        self.facts.join("\n")
    }
}

fn no_data_message(topic: &str) -> String {
    format!(
        "I don't have any {} data for your organization yet, so there is nothing to report.",
        topic
    )
}

fn humanize(action_type: &str) -> String {
    let spaced = action_type.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => spaced,
    }
}

pub struct Responder {
    db: Arc<Database>,
    pipeline: Arc<ActionPipeline>,
    parser: IntentParser,
    ai: Option<AIClient>,
    config: EngineConfig,
}

impl Responder {
    pub fn new(
        db: Arc<Database>,
        pipeline: Arc<ActionPipeline>,
        ai: Option<AIClient>,
        config: EngineConfig,
    ) -> Result<Self> {
        Ok(Self {
            db,
            pipeline,
            parser: IntentParser::new()?,
            ai,
            config,
        })
    }

    pub fn parser(&self) -> &IntentParser {
        &self.parser
    }

    /// Classify `user_text` and answer it
    pub async fn respond(
        &self,
        ctx: &OrgContext,
        user_text: &str,
        history: &[ChatTurn],
        attachments: &[String],
    ) -> Result<ChatResponse> {
        let intent = self.parser.parse(user_text, ctx.today());
        self.generate_response(ctx, &intent, user_text, history, attachments)
            .await
    }

    /// Answer an already classified utterance
    ///
    /// `attachments` hold text extracted from uploaded documents.
    pub async fn generate_response(
        &self,
        ctx: &OrgContext,
        intent: &Intent,
        user_text: &str,
        history: &[ChatTurn],
        attachments: &[String],
    ) -> Result<ChatResponse> {
        debug!(
            organization_id = ctx.organization_id,
            intent = intent.kind.as_str(),
            confidence = intent.confidence,
            attachments = attachments.len(),
            "Generating response"
        );

        let statement = attachments
            .iter()
            .find(|text| self.parser.statements().looks_like_statement(text));
        if let Some(text) = statement {
            let params = ActionParams::CreateTransaction(TransactionSource::Statement {
                text: text.clone(),
            });
            return self.propose(ctx, params);
        }

        let personalization =
            Personalization::for_organization(&self.db, ctx.organization_id, &self.config.personalization)?;

        match (&intent.kind, &intent.params) {
            (IntentKind::Action, Some(params)) => self.propose(ctx, params.clone()),
            (IntentKind::Greeting, _) => self.greet(ctx, &personalization),
            (IntentKind::General, _) | (IntentKind::Action, None) => {
                self.general(ctx, &personalization)
            }
            (kind, _) => {
                let data = self.gather(ctx, *kind, intent, &personalization)?;
                if data.is_empty() {
                    info!(
                        organization_id = ctx.organization_id,
                        topic = data.topic,
                        "No data for query"
                    );
                    return Ok(ChatResponse::text(no_data_message(data.topic)));
                }
                let content = self
                    .render(&personalization, &data, user_text, history)
                    .await;
                Ok(ChatResponse::text(content))
            }
        }
    }

    /// Prepare an action and hand it back for confirmation
    fn propose(&self, ctx: &OrgContext, params: ActionParams) -> Result<ChatResponse> {
        let action_type = params.action_type();
        match self.pipeline.prepare(ctx, params) {
            Ok(action) => {
                let mut content = action.preview.summary.clone();
                for item in &action.preview.items {
                    content.push_str(&format!("\n- {}: {}", item.label, item.value));
                }
                for warning in &action.preview.warnings {
                    content.push_str(&format!("\nNote: {}", warning));
                }
                content.push_str("\n\nShall I go ahead?");

                Ok(ChatResponse {
                    content,
                    action: Some(ChatAction {
                        action_id: action.id,
                        requires_confirmation: true,
                        preview: action.preview,
                    }),
                    quick_actions: QUICK_ACTIONS.iter().map(|s| s.to_string()).collect(),
                })
            }
            Err(Error::Validation(msg)) => Ok(ChatResponse::text(format!(
                "I can't {} yet: {}",
                humanize(action_type.as_str()).to_lowercase(),
                msg
            ))),
            Err(Error::PermissionDenied(msg)) => Ok(ChatResponse::text(format!(
                "You don't have permission to do that ({}). Ask an administrator for access.",
                msg
            ))),
            Err(e) => Err(e),
        }
    }

    fn greet(&self, ctx: &OrgContext, p: &Personalization) -> Result<ChatResponse> {
        let mut content = p.greeting(ctx.now());
        if let Some(state) = self.db.get_state(ctx.organization_id)? {
            if state.last_cycle_at.is_some() && !state.context.is_empty() {
                content.push(' ');
                content.push_str(&p.frame_context(&state.context, state.mood));
            }
        }

        let mut response = ChatResponse::text(content);
        if !p.is_quiet_hour(ctx.now()) {
            response.quick_actions = self
                .pipeline
                .suggestions(ctx)?
                .into_iter()
                .take(3)
                .map(|s| humanize(s.action_type.as_str()))
                .collect();
        }
        Ok(response)
    }

    fn general(&self, ctx: &OrgContext, p: &Personalization) -> Result<ChatResponse> {
        let help = "I can answer questions about cash, budgets, expenses, transactions, \
                    invoices, sales, team, payroll and inventory, or prepare invoices, \
                    reminders, payments and reports for you.";
        let content = match self.db.get_state(ctx.organization_id)? {
            Some(state) if state.last_cycle_at.is_some() && !state.context.is_empty() => {
                format!("{}\n\n{}", p.frame_context(&state.context, state.mood), help)
            }
            _ => help.to_string(),
        };
        Ok(ChatResponse::text(content))
    }

    /// Metrics of one area, or None when its data source failed
    fn perceive(&self, ctx: &OrgContext, area: Area) -> Option<AreaMetrics> {
        let perception = agent_for(area, &self.config.thresholds).perceive(&self.db, ctx);
        (!perception.failed).then_some(perception.metrics)
    }

    fn report_facts(
        &self,
        ctx: &OrgContext,
        params: ReportParams,
        data: &mut DataContext,
        p: &Personalization,
    ) -> Result<()> {
        let report = GenerateReportHandler.build(&self.db, ctx, &params)?;
        if report.is_empty() {
            return Ok(());
        }
        data.push(format!("{} ({})", report.title, report.period));
        for row in &report.rows {
            match &row.detail {
                Some(detail) => data.push(format!(
                    "{}: {} ({})",
                    row.label,
                    p.format_money(row.amount),
                    detail
                )),
                None => data.push(format!("{}: {}", row.label, p.format_money(row.amount))),
            }
        }
        for total in &report.totals {
            data.push(format!("{}: {}", total.label, p.format_money(total.amount)));
        }
        Ok(())
    }

    /// Assemble the facts a query needs
    fn gather(
        &self,
        ctx: &OrgContext,
        kind: IntentKind,
        intent: &Intent,
        p: &Personalization,
    ) -> Result<DataContext> {
        let org = ctx.organization_id;
        let data = match kind {
            IntentKind::QueryCash => {
                let mut data = DataContext::new("cash");
                let has_accounts = !self.db.list_accounts(org)?.is_empty();
                if let Some(AreaMetrics::Money(m)) = self.perceive(ctx, Area::Money) {
                    if has_accounts || m.income_30d > 0.0 || m.expenses_30d > 0.0 {
                        data.push(format!("Cash balance: {}", p.format_money(m.cash_balance)));
                        data.push(format!("Income (last 30 days): {}", p.format_money(m.income_30d)));
                        data.push(format!(
                            "Expenses (last 30 days): {}",
                            p.format_money(m.expenses_30d)
                        ));
                        data.push(format!(
                            "Net cash flow (last 30 days): {}",
                            p.format_money(m.net_cash_flow)
                        ));
                        for prediction in self
                            .db
                            .latest_predictions(org)?
                            .iter()
                            .filter(|pr| pr.prediction_type == PredictionType::CashFlow)
                        {
                            data.push(format!(
                                "Projected cash on {}: {}",
                                prediction.target_date,
                                p.format_money(prediction.predicted_value)
                            ));
                        }
                    }
                }
                data
            }
            IntentKind::QueryBudget => {
                let mut data = DataContext::new("budget");
                if let Some(AreaMetrics::Money(m)) = self.perceive(ctx, Area::Money) {
                    if m.budget_total > 0.0 {
                        data.push(format!("Budget this period: {}", p.format_money(m.budget_total)));
                        data.push(format!(
                            "Spent so far: {} ({:.0}%)",
                            p.format_money(m.budget_spent),
                            m.budget_usage_pct
                        ));
                        if !m.overrun_lines.is_empty() {
                            data.push(format!("Over budget: {}", m.overrun_lines.join(", ")));
                        }
                    }
                }
                data
            }
            IntentKind::QueryExpenses => {
                let mut data = DataContext::new("expense");
                let params = ReportParams {
                    kind: ReportKind::Expenses,
                    period: intent.period.clone(),
                    category: None,
                    limit: None,
                };
                self.report_facts(ctx, params, &mut data, p)?;
                data
            }
            IntentKind::QueryTransactions => {
                let mut data = DataContext::new("transaction");
                let params = ReportParams {
                    kind: ReportKind::Transactions,
                    period: intent.period.clone(),
                    category: None,
                    limit: Some(RECENT_TRANSACTIONS),
                };
                self.report_facts(ctx, params, &mut data, p)?;
                data
            }
            IntentKind::QueryInvoices => {
                let mut data = DataContext::new("invoice");
                if let Some(AreaMetrics::Sales(s)) = self.perceive(ctx, Area::Sales) {
                    if s.outstanding_invoices > 0 || s.overdue_invoices > 0 {
                        data.push(format!(
                            "Outstanding invoices: {} totalling {}",
                            s.outstanding_invoices,
                            p.format_money(s.outstanding_amount)
                        ));
                        data.push(format!(
                            "Overdue invoices: {} totalling {}",
                            s.overdue_invoices,
                            p.format_money(s.overdue_amount)
                        ));
                    }
                }
                data
            }
            IntentKind::QuerySales => {
                let mut data = DataContext::new("sales");
                if let Some(AreaMetrics::Sales(s)) = self.perceive(ctx, Area::Sales) {
                    if s.revenue_this_month > 0.0 || s.revenue_last_month > 0.0 || s.open_quotes > 0
                    {
                        data.push(format!(
                            "Revenue this month: {}",
                            p.format_money(s.revenue_this_month)
                        ));
                        data.push(format!(
                            "Revenue last month: {}",
                            p.format_money(s.revenue_last_month)
                        ));
                        data.push(format!("Growth: {:+.1}% ({})", s.growth_pct, s.trend.as_str()));
                        data.push(format!("Open quotes: {}", s.open_quotes));
                    }
                }
                data
            }
            IntentKind::QueryTeam => {
                let mut data = DataContext::new("team");
                if let Some(AreaMetrics::People(m)) = self.perceive(ctx, Area::People) {
                    if m.team_size > 0 {
                        data.push(format!("Active team members: {}", m.team_size));
                        data.push(format!("Pending leave requests: {}", m.pending_leave_requests));
                        data.push(format!("Upcoming leave: {}", m.upcoming_leave));
                    }
                }
                data
            }
            IntentKind::QueryPayroll => {
                let mut data = DataContext::new("payroll");
                if let Some(AreaMetrics::People(m)) = self.perceive(ctx, Area::People) {
                    if let Some(date) = m.next_payroll_date {
                        data.push(format!("Next payroll: {}", date));
                        data.push(format!("Amount: {}", p.format_money(m.next_payroll_amount)));
                        if let Some(days) = m.days_until_payroll {
                            data.push(format!("Days until payroll: {}", days));
                        }
                    }
                }
                data
            }
            IntentKind::QueryInventory => {
                let mut data = DataContext::new("inventory");
                if let Some(AreaMetrics::Inventory(m)) = self.perceive(ctx, Area::Inventory) {
                    if m.total_items > 0 {
                        data.push(format!("Stock items: {}", m.total_items));
                        data.push(format!("Stock value: {}", p.format_money(m.stock_value)));
                        if !m.low_stock_items.is_empty() {
                            data.push(format!("Low stock: {}", m.low_stock_items.join(", ")));
                        }
                        if !m.out_of_stock_items.is_empty() {
                            data.push(format!("Out of stock: {}", m.out_of_stock_items.join(", ")));
                        }
                    }
                }
                data
            }
            IntentKind::QueryFocus => {
                let mut data = DataContext::new("business state");
                if let Some(state) = self.db.get_state(org)? {
                    if state.last_cycle_at.is_some() {
                        data.push(format!("Focus area: {}", state.focus_area));
                        data.push(format!("Urgency: {:.2}", state.urgency));
                        data.push(format!("Mood: {}", state.mood));
                        if !state.context.is_empty() {
                            data.push(format!("Context: {}", state.context));
                        }
                        if !state.priorities.is_empty() {
                            data.push(format!("Priorities: {}", state.priorities.join(", ")));
                        }
                    }
                }
                data
            }
            IntentKind::QueryInsights => {
                let mut data = DataContext::new("insight");
                for insight in self.db.list_active_insights(org)? {
                    data.push(format!(
                        "[{}] {}: {}",
                        insight.insight_type, insight.title, insight.description
                    ));
                }
                data
            }
            IntentKind::Greeting | IntentKind::Action | IntentKind::General => {
                DataContext::new("business")
            }
        };
        Ok(data)
    }

    fn template(&self, p: &Personalization, data: &DataContext) -> String {
        let lines = data
            .facts
            .iter()
            .map(|f| format!("- {}", f))
            .collect::<Vec<_>>()
            .join("\n");
        match p.tone {
            Tone::Friendly => format!("Here's your {} overview:\n{}", data.topic, lines),
            Tone::Formal => format!("{} summary:\n{}", humanize(data.topic), lines),
            Tone::Concise => lines,
        }
    }

    /// Phrase the facts with the LLM, or fall back to the template
    async fn render(
        &self,
        p: &Personalization,
        data: &DataContext,
        user_text: &str,
        history: &[ChatTurn],
    ) -> String {
        let Some(ai) = &self.ai else {
            return self.template(p, data);
        };

        let system = format!(
            "You are Pulse, a business assistant. Answer the QUESTION in a {} tone using \
             only the facts listed under DATA. Never add figures, names or dates that are \
             not in DATA. Amounts are in {}.",
            p.tone, p.currency
        );
        let skip = history.len().saturating_sub(HISTORY_TURNS);
        let mut messages: Vec<ChatTurn> = history[skip..].to_vec();
        messages.push(ChatTurn::user(format!(
            "DATA:\n{}\n\nQUESTION: {}",
            data.render(),
            user_text
        )));
        let request = CompletionRequest {
            system,
            messages,
            max_tokens: self.config.renderer_max_tokens,
            temperature: 0.2,
        };

        let budget = self.config.renderer_timeout;
        let outcome = match tokio::time::timeout(budget, ai.complete(&request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(budget.as_millis() as u64)),
        };

        match outcome {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!(model = ai.model(), "Renderer returned empty text, using template");
                self.template(p, data)
            }
            Err(e) => {
                warn!(model = ai.model(), error = %e, "Renderer failed, using template");
                self.template(p, data)
            }
        }
    }
}
