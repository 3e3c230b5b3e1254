//! Decision core
//!
//! One cycle runs `Perceive -> Fuse -> Decide -> GenerateInsights -> Persist`:
//!
//! - every registered agent perceives its area in a fixed order;
//! - a threshold table fuses the snapshot into weighted issues and opportunities;
//! - the most severe issue becomes the focus, with context, mood and priorities
//!   taken from a message table;
//! - agent drafts plus cross-domain correlation drafts are reconciled against the
//!   organization's active insights;
//! - the new state and the insight plan commit in one transaction.
//!
//! Only one cycle runs per organization at a time.

use std::collections::{HashMap, HashSet};

use chrono::Duration;
use serde::Serialize;
use tracing::{debug, info};

use crate::agents::{default_agents, Agent};
use crate::config::{EngineConfig, Thresholds};
use crate::context::OrgContext;
use crate::db::Database;
use crate::error::Result;
use crate::models::{
    Area, Decision, Insight, InsightDraft, InsightType, Mood, PerceptionSnapshot, State, Trend,
};

/// Category of insights fired by cross-domain rules
pub const CROSS_DOMAIN: &str = "cross_domain";

/// A weighted issue or opportunity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub area: Area,
    pub kind: &'static str,
    pub severity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Fusion {
    pub issues: Vec<Signal>,
    pub opportunities: Vec<Signal>,
}

fn payroll_within(snapshot: &PerceptionSnapshot, days: i64) -> bool {
    snapshot
        .people
        .days_until_payroll
        .is_some_and(|d| (0..=days).contains(&d))
}

/// Apply the fixed threshold table. Issue order follows the table.
pub fn fuse(snapshot: &PerceptionSnapshot, thresholds: &Thresholds) -> Fusion {
    let money = &snapshot.money;
    let sales = &snapshot.sales;
    let people = &snapshot.people;
    let inventory = &snapshot.inventory;

    let table: [(Area, &'static str, f64, bool); 9] = [
        (Area::Money, "budget_overrun", 0.90, money.budget_usage_pct >= 100.0),
        (
            Area::Money,
            "budget_pressure",
            0.60,
            money.budget_usage_pct >= thresholds.budget_pressure_pct
                && money.budget_usage_pct < 100.0,
        ),
        (Area::Money, "negative_cash_flow", 0.85, money.net_cash_flow < 0.0),
        (
            Area::Sales,
            "sales_decline",
            0.80,
            sales.growth_pct < -thresholds.sales_decline_pct,
        ),
        (Area::Sales, "overdue_invoices", 0.75, sales.overdue_invoices > 0),
        (
            Area::People,
            "payroll_due",
            0.70,
            payroll_within(snapshot, thresholds.payroll_due_days),
        ),
        (Area::People, "pending_leave", 0.40, people.pending_leave_requests > 0),
        (Area::Inventory, "out_of_stock", 0.80, inventory.out_of_stock > 0),
        (Area::Inventory, "low_stock", 0.65, inventory.low_stock > 0),
    ];

    let issues = table
        .into_iter()
        .filter(|(_, _, _, fired)| *fired)
        .map(|(area, kind, severity, _)| Signal {
            area,
            kind,
            severity,
        })
        .collect();

    let mut opportunities = Vec::new();
    if sales.growth_pct > thresholds.sales_growth_pct {
        opportunities.push(Signal {
            area: Area::Sales,
            kind: "sales_growth",
            severity: 0.6,
        });
    }
    if money.net_cash_flow > 0.0 && money.budget_usage_pct < thresholds.budget_pressure_pct {
        opportunities.push(Signal {
            area: Area::Money,
            kind: "healthy_cash",
            severity: 0.5,
        });
    }

    Fusion {
        issues,
        opportunities,
    }
}

/// Context, mood and priorities for a focus issue
fn message_for(kind: &str) -> (&'static str, Mood, &'static [&'static str]) {
    match kind {
        "budget_overrun" => (
            "Spending has gone past this period's budget.",
            Mood::Concerned,
            &["Review overrun budget lines", "Pause non-essential spending", "Re-plan the remaining period"],
        ),
        "budget_pressure" => (
            "Most of this period's budget is already spent.",
            Mood::Attentive,
            &["Check upcoming commitments", "Prioritise essential spending"],
        ),
        "negative_cash_flow" => (
            "More cash went out than came in over the last 30 days.",
            Mood::Concerned,
            &["Chase outstanding invoices", "Review recurring expenses", "Protect the cash runway"],
        ),
        "sales_decline" => (
            "Sales are down against last month.",
            Mood::Concerned,
            &["Follow up open quotes", "Reach out to recent customers", "Review pricing and pipeline"],
        ),
        "overdue_invoices" => (
            "Customers have overdue invoices.",
            Mood::Attentive,
            &["Send payment reminders", "Record payments already received"],
        ),
        "payroll_due" => (
            "Payroll is due within the next few days.",
            Mood::Attentive,
            &["Confirm cash covers payroll", "Approve the payroll run"],
        ),
        "pending_leave" => (
            "Leave requests are waiting for a decision.",
            Mood::Neutral,
            &["Review pending leave requests"],
        ),
        "out_of_stock" => (
            "Some items are out of stock.",
            Mood::Concerned,
            &["Reorder out-of-stock items", "Tell affected customers"],
        ),
        "low_stock" => (
            "Some items are running low.",
            Mood::Attentive,
            &["Plan reorders for low-stock items"],
        ),
        _ => (
            "Everything looks on track.",
            Mood::Optimistic,
            &["Review opportunities", "Plan ahead"],
        ),
    }
}

/// Pick the focus: the most severe issue, table order breaking ties
pub fn decide(fusion: &Fusion) -> Decision {
    let mut issues: Vec<&Signal> = fusion.issues.iter().collect();
    // Vec::sort_by is stable
    issues.sort_by(|a, b| b.severity.total_cmp(&a.severity));

    match issues.first() {
        Some(top) => {
            let (context, mood, priorities) = message_for(top.kind);
            Decision {
                focus_area: top.area.as_str().to_string(),
                urgency: top.severity,
                context: context.to_string(),
                mood,
                priorities: priorities.iter().map(|p| p.to_string()).collect(),
            }
        }
        None => {
            let (context, mood, priorities) = message_for("overview");
            let mut priorities: Vec<String> = priorities.iter().map(|p| p.to_string()).collect();
            if fusion.opportunities.iter().any(|o| o.kind == "sales_growth") {
                priorities.insert(0, "Build on sales growth".to_string());
            }
            Decision {
                focus_area: "overview".to_string(),
                urgency: 0.3,
                context: context.to_string(),
                mood,
                priorities,
            }
        }
    }
}

/// Cross-domain rules. Each fires only when signals from two areas co-occur.
pub fn correlate(snapshot: &PerceptionSnapshot, thresholds: &Thresholds) -> Vec<InsightDraft> {
    let money = &snapshot.money;
    let sales = &snapshot.sales;
    let people = &snapshot.people;
    let inventory = &snapshot.inventory;
    let mut drafts = Vec::new();

    if inventory.low_stock > 0 && sales.trend == Trend::Increasing {
        drafts.push(
            InsightDraft::new(
                InsightType::Correlation,
                CROSS_DOMAIN,
                "Stockout risk",
                format!(
                    "Sales are up {:.0}% while {} item(s) are low on stock.",
                    sales.growth_pct, inventory.low_stock
                ),
                0.88,
            )
            .with_actions(["reorder_stock", "generate_report"]),
        );
    }

    if sales.overdue_invoices > 0 && payroll_within(snapshot, thresholds.cash_squeeze_payroll_days) {
        drafts.push(
            InsightDraft::new(
                InsightType::Correlation,
                CROSS_DOMAIN,
                "Cash squeeze",
                format!(
                    "{:.2} is overdue from customers and payroll of {:.2} is due in {} day(s).",
                    sales.overdue_amount,
                    people.next_payroll_amount,
                    people.days_until_payroll.unwrap_or_default()
                ),
                0.92,
            )
            .with_actions(["send_invoice_reminders", "review_cash"]),
        );
    }

    if sales.trend == Trend::Decreasing && money.spend_trend == Trend::Increasing {
        drafts.push(
            InsightDraft::new(
                InsightType::Correlation,
                CROSS_DOMAIN,
                "Margin squeeze",
                "Sales are falling while spending is rising.",
                0.90,
            )
            .with_actions(["review_expenses", "generate_report"]),
        );
    }

    if people.upcoming_leave >= thresholds.capacity_leave_count && sales.trend == Trend::Increasing
    {
        drafts.push(
            InsightDraft::new(
                InsightType::Correlation,
                CROSS_DOMAIN,
                "Capacity risk",
                format!(
                    "{} team member(s) are on leave soon while sales are growing.",
                    people.upcoming_leave
                ),
                0.70,
            )
            .with_actions(["review_leave"]),
        );
    }

    if money.inventory_budget_overrun && inventory.out_of_stock > 0 {
        drafts.push(
            InsightDraft::new(
                InsightType::Correlation,
                CROSS_DOMAIN,
                "Planning inefficiency",
                format!(
                    "The inventory budget is spent but {} item(s) are out of stock.",
                    inventory.out_of_stock
                ),
                0.75,
            )
            .with_actions(["review_budget", "reorder_stock"]),
        );
    }

    drafts
}

/// Writes needed to bring active insights in line with a new batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub create: Vec<InsightDraft>,
    /// (existing active insight id, replacement content)
    pub update: Vec<(i64, InsightDraft)>,
    pub expire: Vec<i64>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.expire.is_empty()
    }
}

/// Pure reconciliation of (previously active insights, new batch)
///
/// Identity is `(category, title)`. Duplicates inside the batch collapse to the
/// higher-priority draft.
pub fn reconcile(active: &[Insight], batch: Vec<InsightDraft>) -> ReconcilePlan {
    let mut drafts: Vec<InsightDraft> = Vec::with_capacity(batch.len());
    let mut by_identity: HashMap<(String, String), usize> = HashMap::new();
    for draft in batch {
        let key = (draft.category.clone(), draft.title.clone());
        match by_identity.get(&key) {
            Some(&i) => {
                if draft.priority > drafts[i].priority {
                    drafts[i] = draft;
                }
            }
            None => {
                by_identity.insert(key, drafts.len());
                drafts.push(draft);
            }
        }
    }

    let mut existing: HashMap<(&str, &str), i64> = HashMap::new();
    let mut plan = ReconcilePlan::default();
    for insight in active {
        let key = (insight.category.as_str(), insight.title.as_str());
        if existing.contains_key(&key) {
            plan.expire.push(insight.id);
        } else {
            existing.insert(key, insight.id);
        }
    }

    let mut kept: HashSet<i64> = HashSet::new();
    for draft in drafts {
        match existing.get(&(draft.category.as_str(), draft.title.as_str())) {
            Some(&id) => {
                kept.insert(id);
                plan.update.push((id, draft));
            }
            None => plan.create.push(draft),
        }
    }

    let mut stale: Vec<i64> = existing
        .values()
        .copied()
        .filter(|id| !kept.contains(id))
        .collect();
    stale.sort_unstable();
    plan.expire.extend(stale);

    plan
}

/// Orchestrates agents and owns State / Insight persistence
pub struct DecisionCore {
    db: Database,
    config: EngineConfig,
    agents: Vec<Box<dyn Agent>>,
}

impl DecisionCore {
    /// Core with the built-in agents
    pub fn new(db: Database, config: EngineConfig) -> Self {
        let agents = default_agents(&config.thresholds);
        Self::with_agents(db, config, agents)
    }

    pub fn with_agents(db: Database, config: EngineConfig, agents: Vec<Box<dyn Agent>>) -> Self {
        Self {
            db,
            config,
            agents,
        }
    }

    /// Register an additional agent. Agents perceive in registration order.
    pub fn register(&mut self, agent: Box<dyn Agent>) {
        self.agents.push(agent);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every agent's perception for the context's organization
    pub fn perceive(&self, ctx: &OrgContext) -> PerceptionSnapshot {
        let mut snapshot = PerceptionSnapshot::default();
        for agent in &self.agents {
            let perception = agent.perceive(&self.db, ctx);
            if perception.failed {
                snapshot.failed.push(agent.area());
            }
            snapshot.insert(perception.metrics);
        }
        snapshot
    }

    /// Agent drafts for the areas that perceived successfully, then correlation drafts
    pub fn generate_insights(
        &self,
        snapshot: &PerceptionSnapshot,
        ctx: &OrgContext,
    ) -> Vec<InsightDraft> {
        let mut drafts = Vec::new();
        for agent in &self.agents {
            if snapshot.failed.contains(&agent.area()) {
                continue;
            }
            drafts.extend(agent.analyze(&snapshot.get(agent.area()), ctx));
        }
        drafts.extend(correlate(snapshot, &self.config.thresholds));
        drafts
    }

    /// Run one decision cycle and return the new state
    pub fn run_cycle(&self, ctx: &OrgContext) -> Result<State> {
        // Shared through the database so separate cores exclude each other
        let lock = self.db.cycle_lock(ctx.organization_id);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());

        debug!(organization_id = ctx.organization_id, "Decision cycle started");

        let snapshot = self.perceive(ctx);
        let fusion = fuse(&snapshot, &self.config.thresholds);
        let decision = decide(&fusion);
        let drafts = self.generate_insights(&snapshot, ctx);

        let active = self.db.list_active_insights(ctx.organization_id)?;
        let plan = reconcile(&active, drafts);

        let state = self
            .db
            .commit_cycle(ctx.organization_id, &decision, &snapshot, &plan, ctx.now())?;

        info!(
            organization_id = ctx.organization_id,
            focus = %state.focus_area,
            urgency = state.urgency,
            mood = %state.mood,
            issues = fusion.issues.len(),
            created = plan.create.len(),
            updated = plan.update.len(),
            expired = plan.expire.len(),
            failed_areas = snapshot.failed.len(),
            "Decision cycle complete"
        );

        Ok(state)
    }

    /// Current state, created neutral on first access
    pub fn current_state(&self, ctx: &OrgContext) -> Result<State> {
        self.db.get_or_create_state(ctx.organization_id, ctx.now())
    }

    /// Delete inactive insights older than the configured retention
    pub fn retention_sweep(&self, ctx: &OrgContext) -> Result<usize> {
        let cutoff = ctx.now() - Duration::days(self.config.retention_days);
        let deleted = self.db.purge_inactive_insights(ctx.organization_id, cutoff)?;
        if deleted > 0 {
            info!(
                organization_id = ctx.organization_id,
                deleted, "Retention sweep removed inactive insights"
            );
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FixedClock;
    use crate::error::Error;
    use crate::models::{
        AreaMetrics, InsightStatus, InventoryMetrics, MoneyMetrics, PeopleMetrics, SalesMetrics,
    };
    use chrono::Utc;

    fn draft(category: &str, title: &str, priority: f64) -> InsightDraft {
        InsightDraft::new(InsightType::Warning, category, title, "desc", priority)
    }

    fn active(id: i64, category: &str, title: &str) -> Insight {
        Insight {
            id,
            organization_id: 1,
            source_state_id: None,
            insight_type: InsightType::Warning,
            category: category.into(),
            title: title.into(),
            description: "old".into(),
            priority: 0.5,
            is_actionable: false,
            suggested_actions: vec![],
            action_url: None,
            status: InsightStatus::Active,
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    // ----- fuse / decide -----

    #[test]
    fn test_fuse_table() {
        let snapshot = PerceptionSnapshot {
            money: MoneyMetrics {
                budget_usage_pct: 85.0,
                net_cash_flow: -1.0,
                ..Default::default()
            },
            sales: SalesMetrics {
                growth_pct: -15.0,
                overdue_invoices: 2,
                ..Default::default()
            },
            people: PeopleMetrics {
                days_until_payroll: Some(3),
                pending_leave_requests: 1,
                ..Default::default()
            },
            inventory: InventoryMetrics {
                out_of_stock: 1,
                low_stock: 1,
                ..Default::default()
            },
            failed: vec![],
        };

        let fusion = fuse(&snapshot, &Thresholds::default());
        let kinds: Vec<&str> = fusion.issues.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                "budget_pressure",
                "negative_cash_flow",
                "sales_decline",
                "overdue_invoices",
                "payroll_due",
                "pending_leave",
                "out_of_stock",
                "low_stock"
            ]
        );
        assert!(fusion.opportunities.is_empty());
    }

    #[test]
    fn test_budget_overrun_excludes_pressure() {
        let snapshot = PerceptionSnapshot {
            money: MoneyMetrics {
                budget_usage_pct: 100.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let fusion = fuse(&snapshot, &Thresholds::default());
        let kinds: Vec<&str> = fusion.issues.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec!["budget_overrun"]);
    }

    #[test]
    fn test_decide_picks_most_severe_with_stable_ties() {
        let fusion = Fusion {
            issues: vec![
                Signal { area: Area::Sales, kind: "overdue_invoices", severity: 0.75 },
                Signal { area: Area::Sales, kind: "sales_decline", severity: 0.80 },
                Signal { area: Area::Inventory, kind: "out_of_stock", severity: 0.80 },
            ],
            opportunities: vec![],
        };
        let decision = decide(&fusion);
        assert_eq!(decision.focus_area, "sales");
        assert_eq!(decision.urgency, 0.80);
        assert_eq!(decision.mood, Mood::Concerned);
        assert_eq!(decision.context, "Sales are down against last month.");
    }

    #[test]
    fn test_decide_default_overview() {
        let decision = decide(&Fusion::default());
        assert_eq!(decision.focus_area, "overview");
        assert_eq!(decision.mood, Mood::Optimistic);
        assert_eq!(decision.urgency, 0.3);
    }

    #[test]
    fn test_opportunities() {
        let snapshot = PerceptionSnapshot {
            money: MoneyMetrics {
                net_cash_flow: 500.0,
                budget_usage_pct: 40.0,
                ..Default::default()
            },
            sales: SalesMetrics {
                growth_pct: 25.0,
                trend: Trend::Increasing,
                ..Default::default()
            },
            ..Default::default()
        };
        let fusion = fuse(&snapshot, &Thresholds::default());
        let kinds: Vec<&str> = fusion.opportunities.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec!["sales_growth", "healthy_cash"]);
        assert_eq!(decide(&fusion).priorities[0], "Build on sales growth");
    }

    // ----- correlation -----

    #[test]
    fn test_stockout_risk_requires_both_signals() {
        let t = Thresholds::default();
        let low_stock_only = PerceptionSnapshot {
            inventory: InventoryMetrics { low_stock: 2, ..Default::default() },
            ..Default::default()
        };
        assert!(correlate(&low_stock_only, &t).is_empty());

        let growth_only = PerceptionSnapshot {
            sales: SalesMetrics { trend: Trend::Increasing, growth_pct: 30.0, ..Default::default() },
            ..Default::default()
        };
        assert!(correlate(&growth_only, &t).is_empty());

        let both = PerceptionSnapshot {
            inventory: InventoryMetrics { low_stock: 2, ..Default::default() },
            sales: SalesMetrics { trend: Trend::Increasing, growth_pct: 30.0, ..Default::default() },
            ..Default::default()
        };
        let drafts = correlate(&both, &t);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "Stockout risk");
        assert_eq!(drafts[0].category, CROSS_DOMAIN);
        assert_eq!(drafts[0].insight_type, InsightType::Correlation);
        assert_eq!(drafts[0].priority, 0.88);
        assert!(drafts[0].is_actionable);
    }

    #[test]
    fn test_cash_squeeze_window() {
        let t = Thresholds::default();
        let mut snapshot = PerceptionSnapshot {
            sales: SalesMetrics { overdue_invoices: 1, ..Default::default() },
            people: PeopleMetrics { days_until_payroll: Some(10), ..Default::default() },
            ..Default::default()
        };
        assert_eq!(correlate(&snapshot, &t)[0].title, "Cash squeeze");

        snapshot.people.days_until_payroll = Some(11);
        assert!(correlate(&snapshot, &t).is_empty());
    }

    #[test]
    fn test_other_correlations() {
        let t = Thresholds::default();
        let snapshot = PerceptionSnapshot {
            money: MoneyMetrics {
                spend_trend: Trend::Increasing,
                inventory_budget_overrun: true,
                ..Default::default()
            },
            sales: SalesMetrics { trend: Trend::Decreasing, ..Default::default() },
            people: PeopleMetrics { upcoming_leave: 3, ..Default::default() },
            inventory: InventoryMetrics { out_of_stock: 1, ..Default::default() },
            failed: vec![],
        };
        let titles: Vec<String> = correlate(&snapshot, &t).into_iter().map(|d| d.title).collect();
        // Capacity risk needs increasing sales
        assert_eq!(titles, vec!["Margin squeeze", "Planning inefficiency"]);
    }

    // ----- reconcile -----

    #[test]
    fn test_reconcile_create_update_expire() {
        let active = vec![active(1, "money", "Negative cash flow"), active(2, "sales", "Overdue invoices")];
        let batch = vec![draft("money", "Negative cash flow", 0.8), draft("inventory", "Low stock", 0.6)];

        let plan = reconcile(&active, batch);
        assert_eq!(plan.update.len(), 1);
        assert_eq!(plan.update[0].0, 1);
        assert_eq!(plan.create.len(), 1);
        assert_eq!(plan.create[0].title, "Low stock");
        assert_eq!(plan.expire, vec![2]);
    }

    #[test]
    fn test_reconcile_collapses_duplicates() {
        let batch = vec![
            draft("money", "Cash", 0.4),
            draft("money", "Cash", 0.9),
            draft("money", "Cash", 0.7),
        ];
        let plan = reconcile(&[], batch);
        assert_eq!(plan.create.len(), 1);
        assert_eq!(plan.create[0].priority, 0.9);
    }

    #[test]
    fn test_reconcile_empty_batch_expires_all() {
        let plan = reconcile(&[active(7, "a", "b"), active(3, "c", "d")], vec![]);
        assert!(plan.create.is_empty() && plan.update.is_empty());
        assert_eq!(plan.expire, vec![3, 7]);
    }

    // ----- full cycle -----

    fn seeded_db() -> Database {
        let db = Database::in_memory().unwrap();
        db.create_stock_item(1, "Beans", None, 0.0, 5.0, 4.0).unwrap();
        db.create_stock_item(1, "Cups", None, 2.0, 10.0, 0.5).unwrap();
        db
    }

    #[test]
    fn test_cycle_is_stable_without_data_changes() {
        let db = seeded_db();
        let core = DecisionCore::new(db.clone(), EngineConfig::default());
        let ctx = OrgContext::system(1, 1).with_clock(FixedClock::on(2025, 3, 14));

        let first = core.run_cycle(&ctx).unwrap();
        let insights_first = db.list_active_insights(1).unwrap();

        let second = core.run_cycle(&ctx).unwrap();
        let insights_second = db.list_active_insights(1).unwrap();

        assert_eq!(first.focus_area, "inventory");
        assert_eq!(first.focus_area, second.focus_area);
        assert_eq!(first.urgency, second.urgency);
        assert_eq!(first.mood, second.mood);
        assert_eq!(first.id, second.id);

        let ids = |v: &[Insight]| v.iter().map(|i| (i.id, i.title.clone())).collect::<Vec<_>>();
        assert_eq!(ids(&insights_first), ids(&insights_second));
    }

    #[test]
    fn test_concurrent_cycles_on_separate_cores_serialize() {
        let db = seeded_db();
        let first = DecisionCore::new(db.clone(), EngineConfig::default());
        let second = DecisionCore::new(db.clone(), EngineConfig::default());
        let ctx = OrgContext::system(1, 1).with_clock(FixedClock::on(2025, 3, 14));
        let beans = db.list_stock_items(1).unwrap()[0].id;

        for round in 0..20 {
            // Alternate so every other round creates the insight afresh
            let quantity = if round % 2 == 0 { 0.0 } else { 40.0 };
            db.set_stock_quantity(1, beans, quantity).unwrap();

            let barrier = std::sync::Barrier::new(2);
            let results: Vec<Result<State>> = std::thread::scope(|s| {
                let handles = [&first, &second].map(|core| {
                    let (barrier, ctx) = (&barrier, &ctx);
                    s.spawn(move || {
                        barrier.wait();
                        core.run_cycle(ctx)
                    })
                });
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
            for result in results {
                assert!(result.is_ok(), "round {}: {:?}", round, result.err());
            }

            let active = db.list_active_insights(1).unwrap();
            let identities: HashSet<_> = active.iter().map(|i| (&i.category, &i.title)).collect();
            assert_eq!(identities.len(), active.len());
        }
    }

    #[test]
    fn test_absent_insight_expires_not_deleted() {
        let db = seeded_db();
        let core = DecisionCore::new(db.clone(), EngineConfig::default());
        let ctx = OrgContext::system(1, 1).with_clock(FixedClock::on(2025, 3, 14));

        core.run_cycle(&ctx).unwrap();
        let out_of_stock = db
            .list_active_insights(1)
            .unwrap()
            .into_iter()
            .find(|i| i.title == "Items out of stock")
            .unwrap();

        // Restock beans
        let beans = db.list_stock_items(1).unwrap()[0].id;
        db.set_stock_quantity(1, beans, 40.0).unwrap();
        core.run_cycle(&ctx).unwrap();

        let after = db.get_insight(1, out_of_stock.id).unwrap().unwrap();
        assert_eq!(after.status, InsightStatus::Expired);
    }

    struct FailingAgent;

    impl Agent for FailingAgent {
        fn area(&self) -> Area {
            Area::Sales
        }
        fn gather(&self, _db: &Database, _ctx: &OrgContext) -> Result<AreaMetrics> {
            Err(Error::InvalidData("offline".into()))
        }
        fn analyze(&self, _m: &AreaMetrics, _ctx: &OrgContext) -> Vec<InsightDraft> {
            vec![draft("sales", "should not appear", 0.9)]
        }
    }

    #[test]
    fn test_agent_failure_yields_partial_cycle() {
        let db = seeded_db();
        let thresholds = Thresholds::default();
        let agents: Vec<Box<dyn Agent>> = vec![
            crate::agents::agent_for(Area::Money, &thresholds),
            Box::new(FailingAgent),
            crate::agents::agent_for(Area::Inventory, &thresholds),
        ];
        let core = DecisionCore::with_agents(db.clone(), EngineConfig::default(), agents);
        let ctx = OrgContext::system(1, 1).with_clock(FixedClock::on(2025, 3, 14));

        let state = core.run_cycle(&ctx).unwrap();
        assert_eq!(state.focus_area, "inventory");
        assert_eq!(state.perception_data["failed"], serde_json::json!(["sales"]));
        assert!(db
            .list_active_insights(1)
            .unwrap()
            .iter()
            .all(|i| i.title != "should not appear"));
    }

    #[test]
    fn test_cycle_tenant_isolation() {
        let db = seeded_db();
        let core = DecisionCore::new(db.clone(), EngineConfig::default());
        let clock = FixedClock::on(2025, 3, 14);

        core.run_cycle(&OrgContext::system(1, 1).with_clock(clock)).unwrap();
        let other = core.run_cycle(&OrgContext::system(2, 1).with_clock(clock)).unwrap();

        assert_eq!(other.focus_area, "overview");
        assert!(db.list_active_insights(2).unwrap().is_empty());
        assert!(!db.list_active_insights(1).unwrap().is_empty());
    }

    #[test]
    fn test_retention_sweep() {
        let db = seeded_db();
        let core = DecisionCore::new(db.clone(), EngineConfig::default());
        let day1 = OrgContext::system(1, 1).with_clock(FixedClock::on(2025, 3, 1));
        core.run_cycle(&day1).unwrap();

        let insight = db.list_active_insights(1).unwrap()[0].clone();
        db.close_insight(1, insight.id, InsightStatus::Dismissed, day1.now()).unwrap();

        // Within retention: kept
        let day5 = OrgContext::system(1, 1).with_clock(FixedClock::on(2025, 3, 5));
        assert_eq!(core.retention_sweep(&day5).unwrap(), 0);

        let day10 = OrgContext::system(1, 1).with_clock(FixedClock::on(2025, 3, 10));
        assert_eq!(core.retention_sweep(&day10).unwrap(), 1);
        assert!(db.get_insight(1, insight.id).unwrap().is_none());
    }

    #[test]
    fn test_current_state_lazily_neutral() {
        let core = DecisionCore::new(Database::in_memory().unwrap(), EngineConfig::default());
        let state = core.current_state(&OrgContext::system(5, 1)).unwrap();
        assert_eq!(state.mood, Mood::Neutral);
        assert_eq!(state.focus_area, "overview");
        assert!(state.last_cycle_at.is_none());
    }
}
