//! Action lifecycle: prepare, confirm, execute, cancel, rate
//!
//! ```text
//! pending --confirm--> confirmed --claim--> executing --> executed | failed
//!    \--cancel--> cancelled
//! ```
//!
//! Each transition is a compare-and-set on the stored status. Pattern counters for
//! the (organization, user, action type) triple are updated after every transition.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{ActionParams, ActionRegistry};
use crate::context::OrgContext;
use crate::db::{ActionUpdate, Database};
use crate::error::{Error, Result};
use crate::models::{push_bounded, Action, ActionStatus, ActionType};

/// An action type the user tends to accept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub action_type: ActionType,
    pub confidence: f64,
    pub times_confirmed: i64,
}

pub struct ActionPipeline {
    db: Arc<Database>,
    registry: ActionRegistry,
}

impl ActionPipeline {
    pub fn new(db: Arc<Database>, registry: ActionRegistry) -> Self {
        Self { db, registry }
    }

    /// Pipeline with every built-in handler
    pub fn with_defaults(db: Arc<Database>) -> Result<Self> {
        Ok(Self::new(db, ActionRegistry::with_defaults()?))
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    fn load(&self, ctx: &OrgContext, id: i64) -> Result<Action> {
        self.db
            .get_action(ctx.organization_id, id)?
            .ok_or_else(|| Error::NotFound(format!("Action {}", id)))
    }

    /// Transition or explain why the action was not in the required status
    fn transition(&self, ctx: &OrgContext, id: i64, update: &ActionUpdate) -> Result<()> {
        if self
            .db
            .update_action_status(ctx.organization_id, id, update, ctx.now())?
        {
            return Ok(());
        }
        let current = self.load(ctx, id)?;
        Err(Error::InvalidState(format!(
            "Action {} is {}, expected {}",
            id,
            current.status,
            update.from_status()
        )))
    }

    fn context_sample(ctx: &OrgContext, action: &Action) -> serde_json::Value {
        json!({
            "action_id": action.id,
            "parameters": action.parameters,
            "at": ctx.now().to_rfc3339(),
        })
    }

    fn audit(&self, ctx: &OrgContext, event: &str, action: &Action, details: Option<&str>) {
        if let Err(e) = self.db.log_audit(
            ctx.organization_id,
            Some(ctx.user_id),
            event,
            "action",
            Some(action.id),
            details,
        ) {
            warn!(action_id = action.id, error = %e, "Failed to write audit entry");
        }
    }

    /// Validate, preview and persist a pending action
    ///
    /// Permission and validation failures return before anything is written.
    pub fn prepare(&self, ctx: &OrgContext, params: ActionParams) -> Result<Action> {
        let action_type = params.action_type();
        let handler = self.registry.get(action_type)?;

        let permission = handler.required_permission();
        if !ctx.can(permission) {
            return Err(Error::PermissionDenied(format!(
                "{} requires {}",
                action_type, permission
            )));
        }

        handler.validate(&self.db, ctx, &params)?;
        let preview = handler.preview(&self.db, ctx, &params)?;

        let action = self.db.insert_action(
            ctx.organization_id,
            ctx.user_id,
            action_type,
            handler.category(),
            &params,
            &preview,
            ctx.now(),
        )?;

        self.db.update_action_pattern(
            ctx.organization_id,
            ctx.user_id,
            action_type,
            ctx.now(),
            |p| p.times_suggested += 1,
        )?;
        self.audit(ctx, "action.prepared", &action, Some(&preview.summary));

        info!(
            organization_id = ctx.organization_id,
            action_id = action.id,
            action_type = %action_type,
            "Action prepared"
        );
        Ok(action)
    }

    pub fn confirm(&self, ctx: &OrgContext, id: i64) -> Result<Action> {
        self.transition(ctx, id, &ActionUpdate::Confirm)?;
        let action = self.load(ctx, id)?;

        let sample = Self::context_sample(ctx, &action);
        self.db.update_action_pattern(
            ctx.organization_id,
            action.user_id,
            action.action_type,
            ctx.now(),
            |p| {
                p.times_confirmed += 1;
                push_bounded(&mut p.successful_contexts, sample);
            },
        )?;
        self.audit(ctx, "action.confirmed", &action, None);

        info!(action_id = id, "Action confirmed");
        Ok(action)
    }

    /// Run a confirmed action exactly once
    ///
    /// Handler errors mark the action failed and are returned to the caller.
    pub fn execute(&self, ctx: &OrgContext, id: i64) -> Result<Action> {
        self.transition(ctx, id, &ActionUpdate::Claim)?;
        let action = self.load(ctx, id)?;
        let handler = self.registry.get(action.action_type)?;

        debug!(action_id = id, action_type = %action.action_type, "Executing action");

        match handler.execute(&self.db, ctx, &action.parameters) {
            Ok(result) => {
                self.transition(ctx, id, &ActionUpdate::Succeed(result))?;
                self.db.update_action_pattern(
                    ctx.organization_id,
                    action.user_id,
                    action.action_type,
                    ctx.now(),
                    |p| p.times_successful += 1,
                )?;
                self.audit(ctx, "action.executed", &action, None);
                info!(action_id = id, "Action executed");
                self.load(ctx, id)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(action_id = id, error = %message, "Action failed");
                self.transition(ctx, id, &ActionUpdate::Fail(message.clone()))?;

                let mut sample = Self::context_sample(ctx, &action);
                sample["error"] = json!(&message);
                self.db.update_action_pattern(
                    ctx.organization_id,
                    action.user_id,
                    action.action_type,
                    ctx.now(),
                    |p| push_bounded(&mut p.failed_contexts, sample),
                )?;
                self.audit(ctx, "action.failed", &action, Some(&message));
                Err(e)
            }
        }
    }

    /// Cancel a pending action; nothing is compensated
    pub fn cancel(&self, ctx: &OrgContext, id: i64) -> Result<Action> {
        self.transition(ctx, id, &ActionUpdate::Cancel)?;
        let action = self.load(ctx, id)?;

        let sample = Self::context_sample(ctx, &action);
        self.db.update_action_pattern(
            ctx.organization_id,
            action.user_id,
            action.action_type,
            ctx.now(),
            |p| {
                p.times_rejected += 1;
                push_bounded(&mut p.failed_contexts, sample);
            },
        )?;
        self.audit(ctx, "action.cancelled", &action, None);

        info!(action_id = id, "Action cancelled");
        Ok(action)
    }

    /// Rate an executed action from 1 to 5, once
    pub fn rate(&self, ctx: &OrgContext, id: i64, rating: i64) -> Result<Action> {
        if !(1..=5).contains(&rating) {
            return Err(Error::Validation(format!(
                "Rating must be between 1 and 5, got {}",
                rating
            )));
        }

        let action = self.load(ctx, id)?;
        if action.status != ActionStatus::Executed {
            return Err(Error::InvalidState(format!(
                "Only executed actions can be rated; action {} is {}",
                id, action.status
            )));
        }
        if !self.db.set_action_rating(ctx.organization_id, id, rating)? {
            return Err(Error::InvalidState(format!("Action {} is already rated", id)));
        }

        self.db.update_action_pattern(
            ctx.organization_id,
            action.user_id,
            action.action_type,
            ctx.now(),
            |p| {
                p.ratings_count += 1;
                let n = p.ratings_count as f64;
                let old = p.avg_rating.unwrap_or(0.0);
                p.avg_rating = Some((old * (n - 1.0) + rating as f64) / n);
            },
        )?;

        debug!(action_id = id, rating, "Action rated");
        self.load(ctx, id)
    }

    pub fn get(&self, ctx: &OrgContext, id: i64) -> Result<Action> {
        self.load(ctx, id)
    }

    pub fn list(
        &self,
        ctx: &OrgContext,
        status: Option<ActionStatus>,
        limit: i64,
    ) -> Result<Vec<Action>> {
        self.db.list_actions(ctx.organization_id, status, limit)
    }

    /// Action types this user usually accepts, most confident first
    pub fn suggestions(&self, ctx: &OrgContext) -> Result<Vec<Suggestion>> {
        let mut suggestions: Vec<Suggestion> = self
            .db
            .list_action_patterns(ctx.organization_id, ctx.user_id)?
            .into_iter()
            .filter(|p| p.is_suggestable())
            .map(|p| Suggestion {
                action_type: p.action_type,
                confidence: p.confidence(),
                times_confirmed: p.times_confirmed,
            })
            .collect();
        suggestions.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(b.times_confirmed.cmp(&a.times_confirmed))
        });
        Ok(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{
        ActionHandler, CreateInvoiceParams, Preview, ReportKind, ReportParams,
    };
    use crate::context::{FixedClock, Permission};
    use crate::models::pattern_confidence;

    fn ctx() -> OrgContext {
        OrgContext::system(1, 1).with_clock(FixedClock::on(2025, 3, 14))
    }

    fn pipeline() -> ActionPipeline {
        let db = Arc::new(Database::in_memory().unwrap());
        ActionPipeline::with_defaults(db).unwrap()
    }

    fn invoice_params(amount: f64) -> ActionParams {
        ActionParams::CreateInvoice(CreateInvoiceParams {
            customer: "Acme".to_string(),
            amount,
            description: None,
            issue_date: None,
            due_date: None,
        })
    }

    fn report_params() -> ActionParams {
        ActionParams::GenerateReport(ReportParams {
            kind: ReportKind::Summary,
            period: None,
            category: None,
            limit: None,
        })
    }

    /// Always fails at execution time
    struct BrokenReportHandler;

    impl ActionHandler for BrokenReportHandler {
        fn action_type(&self) -> ActionType {
            ActionType::GenerateReport
        }
        fn category(&self) -> &'static str {
            "reports"
        }
        fn required_permission(&self) -> Permission {
            Permission::ViewReports
        }
        fn validate(&self, _: &Database, _: &OrgContext, _: &ActionParams) -> Result<()> {
            Ok(())
        }
        fn preview(&self, _: &Database, _: &OrgContext, _: &ActionParams) -> Result<Preview> {
            Ok(Preview::new("Broken report"))
        }
        fn execute(&self, _: &Database, _: &OrgContext, _: &ActionParams) -> Result<serde_json::Value> {
            Err(Error::Execution("report store offline".to_string()))
        }
    }

    #[test]
    fn test_full_lifecycle() {
        let pipeline = pipeline();
        let ctx = ctx();

        let action = pipeline.prepare(&ctx, invoice_params(500.0)).unwrap();
        assert_eq!(action.status, ActionStatus::Pending);
        assert!(action.preview.summary.contains("Acme"));

        let action = pipeline.confirm(&ctx, action.id).unwrap();
        assert_eq!(action.status, ActionStatus::Confirmed);
        assert!(action.confirmed_at.is_some());

        let action = pipeline.execute(&ctx, action.id).unwrap();
        assert_eq!(action.status, ActionStatus::Executed);
        assert_eq!(action.was_successful, Some(true));
        assert!(action.executed_at.is_some());
        assert_eq!(action.result.as_ref().unwrap()["number"], "INV-0001");

        let pattern = pipeline
            .db
            .get_action_pattern(1, 1, ActionType::CreateInvoice)
            .unwrap()
            .unwrap();
        assert_eq!(pattern.times_suggested, 1);
        assert_eq!(pattern.times_confirmed, 1);
        assert_eq!(pattern.times_successful, 1);
        assert_eq!(pattern.successful_contexts.len(), 1);
    }

    #[test]
    fn test_execute_twice_is_invalid_state() {
        let pipeline = pipeline();
        let ctx = ctx();
        let action = pipeline.prepare(&ctx, report_params()).unwrap();
        pipeline.confirm(&ctx, action.id).unwrap();

        pipeline.execute(&ctx, action.id).unwrap();
        let err = pipeline.execute(&ctx, action.id).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_report_over_unbounded_window_prepares() {
        let pipeline = pipeline();
        let ctx = ctx();
        let intent = crate::intent::IntentParser::new()
            .unwrap()
            .parse("show me expenses for the last 9999999999 days", ctx.today());
        let params = intent.params.unwrap();

        let action = pipeline.prepare(&ctx, params).unwrap();
        pipeline.confirm(&ctx, action.id).unwrap();
        let action = pipeline.execute(&ctx, action.id).unwrap();
        assert_eq!(action.status, ActionStatus::Executed);
    }

    #[test]
    fn test_concurrent_execute_runs_once() {
        let pipeline = pipeline();
        let ctx = ctx();

        for _ in 0..10 {
            let action = pipeline.prepare(&ctx, invoice_params(250.0)).unwrap();
            pipeline.confirm(&ctx, action.id).unwrap();

            let barrier = std::sync::Barrier::new(2);
            let results: Vec<Result<Action>> = std::thread::scope(|s| {
                let handles: Vec<_> = (0..2)
                    .map(|_| {
                        let (pipeline, ctx, barrier) = (&pipeline, &ctx, &barrier);
                        s.spawn(move || {
                            barrier.wait();
                            pipeline.execute(ctx, action.id)
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let succeeded = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(succeeded, 1);
            assert!(results
                .iter()
                .any(|r| matches!(r, Err(Error::InvalidState(_)))));
        }

        // One invoice per action
        assert_eq!(pipeline.db.list_invoices(1, None, 100).unwrap().len(), 10);
    }

    #[test]
    fn test_execute_requires_confirmation() {
        let pipeline = pipeline();
        let ctx = ctx();
        let action = pipeline.prepare(&ctx, report_params()).unwrap();
        assert!(matches!(
            pipeline.execute(&ctx, action.id),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_validation_and_permission_persist_nothing() {
        let pipeline = pipeline();
        let ctx = ctx();
        assert!(matches!(
            pipeline.prepare(&ctx, invoice_params(-5.0)),
            Err(Error::Validation(_))
        ));

        let viewer = OrgContext::new(1, 1)
            .with_permissions([Permission::ViewReports])
            .with_clock(FixedClock::on(2025, 3, 14));
        assert!(matches!(
            pipeline.prepare(&viewer, invoice_params(500.0)),
            Err(Error::PermissionDenied(_))
        ));

        assert!(pipeline.list(&ctx, None, 10).unwrap().is_empty());
        assert!(pipeline
            .db
            .get_action_pattern(1, 1, ActionType::CreateInvoice)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_failed_execution_is_recorded() {
        let db = Arc::new(Database::in_memory().unwrap());
        let mut registry = ActionRegistry::with_defaults().unwrap();
        registry.register(Box::new(BrokenReportHandler));
        let pipeline = ActionPipeline::new(db, registry);
        let ctx = ctx();

        let action = pipeline.prepare(&ctx, report_params()).unwrap();
        pipeline.confirm(&ctx, action.id).unwrap();
        let err = pipeline.execute(&ctx, action.id).unwrap_err();
        assert!(matches!(err, Error::Execution(_)));

        let action = pipeline.get(&ctx, action.id).unwrap();
        assert_eq!(action.status, ActionStatus::Failed);
        assert_eq!(action.was_successful, Some(false));
        assert!(action.error_message.unwrap().contains("offline"));

        let pattern = pipeline
            .db
            .get_action_pattern(1, 1, ActionType::GenerateReport)
            .unwrap()
            .unwrap();
        assert_eq!(pattern.times_successful, 0);
        assert_eq!(pattern.failed_contexts.len(), 1);
    }

    #[test]
    fn test_cancel_and_confidence() {
        let pipeline = pipeline();
        let ctx = ctx();

        let a = pipeline.prepare(&ctx, report_params()).unwrap();
        pipeline.cancel(&ctx, a.id).unwrap();
        assert!(matches!(pipeline.confirm(&ctx, a.id), Err(Error::InvalidState(_))));

        for _ in 0..2 {
            let a = pipeline.prepare(&ctx, report_params()).unwrap();
            pipeline.confirm(&ctx, a.id).unwrap();
        }
        // Three decisions, none executed
        let pattern = pipeline
            .db
            .get_action_pattern(1, 1, ActionType::GenerateReport)
            .unwrap()
            .unwrap();
        assert_eq!(pattern.times_confirmed + pattern.times_rejected, 3);
        assert_eq!(pattern.confidence(), pattern_confidence(2, 1, 0));
        assert!(pipeline.suggestions(&ctx).unwrap().is_empty());
    }

    #[test]
    fn test_suggestions_rank_confident_types() {
        let pipeline = pipeline();
        let ctx = ctx();
        for _ in 0..3 {
            let a = pipeline.prepare(&ctx, report_params()).unwrap();
            pipeline.confirm(&ctx, a.id).unwrap();
            pipeline.execute(&ctx, a.id).unwrap();
        }
        let suggestions = pipeline.suggestions(&ctx).unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].action_type, ActionType::GenerateReport);
        assert!((suggestions[0].confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rating() {
        let pipeline = pipeline();
        let ctx = ctx();
        let pending = pipeline.prepare(&ctx, report_params()).unwrap();
        assert!(matches!(
            pipeline.rate(&ctx, pending.id, 4),
            Err(Error::InvalidState(_))
        ));

        let mut ids = Vec::new();
        for _ in 0..2 {
            let a = pipeline.prepare(&ctx, report_params()).unwrap();
            pipeline.confirm(&ctx, a.id).unwrap();
            pipeline.execute(&ctx, a.id).unwrap();
            ids.push(a.id);
        }
        assert!(matches!(pipeline.rate(&ctx, ids[0], 6), Err(Error::Validation(_))));

        let rated = pipeline.rate(&ctx, ids[0], 4).unwrap();
        assert_eq!(rated.rating, Some(4));
        pipeline.rate(&ctx, ids[1], 2).unwrap();
        assert!(matches!(pipeline.rate(&ctx, ids[1], 5), Err(Error::InvalidState(_))));

        let pattern = pipeline
            .db
            .get_action_pattern(1, 1, ActionType::GenerateReport)
            .unwrap()
            .unwrap();
        assert_eq!(pattern.ratings_count, 2);
        assert_eq!(pattern.avg_rating, Some(3.0));
    }

    #[test]
    fn test_other_tenant_cannot_touch_action() {
        let pipeline = pipeline();
        let action = pipeline.prepare(&ctx(), report_params()).unwrap();
        let other = OrgContext::system(2, 1).with_clock(FixedClock::on(2025, 3, 14));
        assert!(matches!(
            pipeline.confirm(&other, action.id),
            Err(Error::NotFound(_))
        ));
    }
}
