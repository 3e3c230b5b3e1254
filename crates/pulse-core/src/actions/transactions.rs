//! Money movement actions: recording and categorizing

use std::collections::BTreeMap;

use serde_json::json;
use tracing::{debug, info};

use super::{mismatch, ActionHandler, ActionParams, CategorizeParams, Preview, TransactionSource};
use crate::categorizer::Categorizer;
use crate::context::{OrgContext, Permission};
use crate::db::{Database, MovementInsert};
use crate::error::{Error, Result};
use crate::intent::StatementParser;
use crate::models::{ActionType, NewMovement};

const DEFAULT_CATEGORIZE_LIMIT: i64 = 50;
const MAX_CATEGORIZE_LIMIT: i64 = 500;

/// Preview rows listed before the remainder is summarized
const PREVIEW_ROWS: usize = 10;

// ========== categorize_transactions ==========

pub struct CategorizeTransactionsHandler {
    categorizer: Categorizer,
}

impl CategorizeTransactionsHandler {
    pub fn new() -> Result<Self> {
        Ok(Self {
            categorizer: Categorizer::new()?,
        })
    }

    fn params<'a>(&self, params: &'a ActionParams) -> Result<&'a CategorizeParams> {
        match params {
            ActionParams::CategorizeTransactions(p) => Ok(p),
            other => Err(mismatch(ActionType::CategorizeTransactions, other)),
        }
    }

    fn limit(p: &CategorizeParams) -> i64 {
        p.limit
            .unwrap_or(DEFAULT_CATEGORIZE_LIMIT)
            .clamp(1, MAX_CATEGORIZE_LIMIT)
    }
}

impl ActionHandler for CategorizeTransactionsHandler {
    fn action_type(&self) -> ActionType {
        ActionType::CategorizeTransactions
    }

    fn category(&self) -> &'static str {
        "money"
    }

    fn required_permission(&self) -> Permission {
        Permission::ManageMoney
    }

    fn validate(&self, db: &Database, ctx: &OrgContext, params: &ActionParams) -> Result<()> {
        self.params(params)?;
        if db.count_uncategorized_movements(ctx.organization_id)? == 0 {
            return Err(Error::Validation(
                "There are no uncategorized transactions".to_string(),
            ));
        }
        Ok(())
    }

    fn preview(&self, db: &Database, ctx: &OrgContext, params: &ActionParams) -> Result<Preview> {
        let limit = Self::limit(self.params(params)?);
        let movements = db.list_uncategorized_movements(ctx.organization_id, limit)?;

        let mut preview = Preview::new(format!("Categorize {} transaction(s)", movements.len()));
        let mut unmatched = 0;
        for (i, m) in movements.iter().enumerate() {
            let c = self.categorizer.categorize(&m.description, m.direction);
            if !c.matched {
                unmatched += 1;
            }
            if i < PREVIEW_ROWS {
                preview = preview.item(
                    m.description.clone(),
                    format!("{} ({:.0}%)", c.category, c.confidence * 100.0),
                );
            }
        }
        if movements.len() > PREVIEW_ROWS {
            preview = preview.item("More", format!("{} not shown", movements.len() - PREVIEW_ROWS));
        }
        if unmatched > 0 {
            preview = preview.warn(format!(
                "{} transaction(s) matched no rule and will be filed as other",
                unmatched
            ));
        }
        Ok(preview)
    }

    fn execute(
        &self,
        db: &Database,
        ctx: &OrgContext,
        params: &ActionParams,
    ) -> Result<serde_json::Value> {
        let limit = Self::limit(self.params(params)?);
        let movements = db.list_uncategorized_movements(ctx.organization_id, limit)?;

        let mut by_category: BTreeMap<String, i64> = BTreeMap::new();
        let mut categorized = 0;
        for m in &movements {
            let c = self.categorizer.categorize(&m.description, m.direction);
            if db.set_movement_category(ctx.organization_id, m.id, &c.category)? {
                categorized += 1;
                *by_category.entry(c.category).or_default() += 1;
            }
        }

        info!(
            organization_id = ctx.organization_id,
            categorized,
            "Transactions categorized"
        );

        Ok(json!({
            "categorized": categorized,
            "by_category": by_category,
        }))
    }
}

// ========== create_transaction ==========

pub struct CreateTransactionHandler {
    categorizer: Categorizer,
    statements: StatementParser,
}

impl CreateTransactionHandler {
    pub fn new() -> Result<Self> {
        Ok(Self {
            categorizer: Categorizer::new()?,
            statements: StatementParser::new()?,
        })
    }

    fn params<'a>(&self, params: &'a ActionParams) -> Result<&'a TransactionSource> {
        match params {
            ActionParams::CreateTransaction(p) => Ok(p),
            other => Err(mismatch(ActionType::CreateTransaction, other)),
        }
    }

    /// Movements the action would record, without account assignment
    fn movements(&self, ctx: &OrgContext, source: &TransactionSource) -> Vec<NewMovement> {
        match source {
            TransactionSource::Single {
                description,
                amount,
                direction,
                date,
                category,
            } => {
                let category = category
                    .clone()
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| self.categorizer.categorize(description, *direction).category);
                vec![NewMovement {
                    account_id: None,
                    date: date.unwrap_or_else(|| ctx.today()),
                    description: description.trim().to_string(),
                    amount: *amount,
                    direction: *direction,
                    category: Some(category),
                }]
            }
            TransactionSource::Statement { text } => self
                .statements
                .parse(text, ctx.today())
                .into_iter()
                .map(|line| NewMovement {
                    account_id: None,
                    category: Some(
                        self.categorizer
                            .categorize(&line.description, line.direction)
                            .category,
                    ),
                    date: line.date,
                    description: line.description,
                    amount: line.amount,
                    direction: line.direction,
                })
                .collect(),
        }
    }
}

impl ActionHandler for CreateTransactionHandler {
    fn action_type(&self) -> ActionType {
        ActionType::CreateTransaction
    }

    fn category(&self) -> &'static str {
        "money"
    }

    fn required_permission(&self) -> Permission {
        Permission::ManageMoney
    }

    fn validate(&self, _db: &Database, ctx: &OrgContext, params: &ActionParams) -> Result<()> {
        let source = self.params(params)?;
        match source {
            TransactionSource::Single {
                description,
                amount,
                ..
            } => {
                if description.trim().is_empty() {
                    return Err(Error::Validation(
                        "A transaction needs a description".to_string(),
                    ));
                }
                if !amount.is_finite() || *amount <= 0.0 {
                    return Err(Error::Validation(
                        "Transaction amount must be greater than zero".to_string(),
                    ));
                }
            }
            TransactionSource::Statement { .. } => {
                if self.movements(ctx, source).is_empty() {
                    return Err(Error::Validation(
                        "No transactions found in the statement".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn preview(&self, db: &Database, ctx: &OrgContext, params: &ActionParams) -> Result<Preview> {
        let movements = self.movements(ctx, self.params(params)?);

        let mut preview = Preview::new(match movements.as_slice() {
            [m] => format!("Record {} of {:.2}: {}", m.direction, m.amount, m.description),
            many => format!("Record {} transactions from statement", many.len()),
        });

        let mut duplicates = 0;
        for (i, m) in movements.iter().enumerate() {
            if db.movement_exists(ctx.organization_id, m)? {
                duplicates += 1;
            }
            if i < PREVIEW_ROWS {
                preview = preview.item(
                    format!("{} {}", m.date, m.description),
                    format!(
                        "{} {:.2} ({})",
                        m.direction,
                        m.amount,
                        m.category.as_deref().unwrap_or("uncategorized")
                    ),
                );
            }
        }
        if duplicates > 0 {
            preview = preview.warn(format!(
                "{} transaction(s) already recorded and will be skipped",
                duplicates
            ));
        }
        if db.default_account_id(ctx.organization_id)?.is_none() {
            preview = preview.warn("No account set up; balances will not change");
        }
        Ok(preview)
    }

    fn execute(
        &self,
        db: &Database,
        ctx: &OrgContext,
        params: &ActionParams,
    ) -> Result<serde_json::Value> {
        let account_id = db.default_account_id(ctx.organization_id)?;
        let now = ctx.now();

        let mut inserted = Vec::new();
        let mut duplicates = 0;
        for mut movement in self.movements(ctx, self.params(params)?) {
            movement.account_id = account_id;
            match db.insert_movement(ctx.organization_id, &movement, now)? {
                MovementInsert::Inserted(id) => inserted.push(id),
                MovementInsert::Duplicate(id) => {
                    debug!(movement_id = id, "Skipping duplicate movement");
                    duplicates += 1;
                }
            }
        }

        info!(
            organization_id = ctx.organization_id,
            inserted = inserted.len(),
            duplicates,
            "Transactions recorded"
        );

        Ok(json!({
            "inserted": inserted.len(),
            "duplicates": duplicates,
            "movement_ids": inserted,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FixedClock;
    use crate::db::MovementFilter;
    use crate::models::Direction;
    use chrono::NaiveDate;

    fn ctx() -> OrgContext {
        OrgContext::system(1, 1).with_clock(FixedClock::on(2025, 3, 14))
    }

    fn single(description: &str, amount: f64, direction: Direction) -> ActionParams {
        ActionParams::CreateTransaction(TransactionSource::Single {
            description: description.to_string(),
            amount,
            direction,
            date: None,
            category: None,
        })
    }

    #[test]
    fn test_create_single_transaction() {
        let db = Database::in_memory().unwrap();
        let ctx = ctx();
        db.create_account(1, "Main", 1000.0).unwrap();
        let handler = CreateTransactionHandler::new().unwrap();
        let params = single("Fuel for delivery van", 200.0, Direction::Expense);

        handler.validate(&db, &ctx, &params).unwrap();
        let preview = handler.preview(&db, &ctx, &params).unwrap();
        assert!(preview.items[0].value.contains("transport"));
        assert!(preview.warnings.is_empty());

        let result = handler.execute(&db, &ctx, &params).unwrap();
        assert_eq!(result["inserted"], 1);
        assert_eq!(db.cash_balance(1).unwrap(), 800.0);

        let movements = db.list_movements(1, &MovementFilter::default()).unwrap();
        assert_eq!(movements[0].date, NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        assert_eq!(movements[0].category.as_deref(), Some("transport"));

        // Same movement again is a duplicate, balance untouched
        let preview = handler.preview(&db, &ctx, &params).unwrap();
        assert_eq!(preview.warnings.len(), 1);
        let result = handler.execute(&db, &ctx, &params).unwrap();
        assert_eq!(result["inserted"], 0);
        assert_eq!(result["duplicates"], 1);
        assert_eq!(db.cash_balance(1).unwrap(), 800.0);
    }

    #[test]
    fn test_create_transaction_validation() {
        let db = Database::in_memory().unwrap();
        let handler = CreateTransactionHandler::new().unwrap();
        let err = handler
            .validate(&db, &ctx(), &single("Fuel", 0.0, Direction::Expense))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let empty = ActionParams::CreateTransaction(TransactionSource::Statement {
            text: "nothing to see here".to_string(),
        });
        assert!(matches!(
            handler.validate(&db, &ctx(), &empty),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_statement_import() {
        let db = Database::in_memory().unwrap();
        let ctx = ctx();
        let handler = CreateTransactionHandler::new().unwrap();
        let params = ActionParams::CreateTransaction(TransactionSource::Statement {
            text: "02 Mar POS purchase Naivas 1,250.00 48,750.00\n\
                   05 Mar Salary in from Acme CR 60,000.00 108,750.00"
                .to_string(),
        });

        handler.validate(&db, &ctx, &params).unwrap();
        let preview = handler.preview(&db, &ctx, &params).unwrap();
        assert_eq!(preview.summary, "Record 2 transactions from statement");

        let result = handler.execute(&db, &ctx, &params).unwrap();
        assert_eq!(result["inserted"], 2);
        let income = db
            .list_movements(
                1,
                &MovementFilter {
                    direction: Some(Direction::Income),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(income.len(), 1);
        assert_eq!(income[0].amount, 60000.0);
    }

    #[test]
    fn test_categorize_uncategorized() {
        let db = Database::in_memory().unwrap();
        let ctx = ctx();
        let handler = CategorizeTransactionsHandler::new().unwrap();
        let params = ActionParams::CategorizeTransactions(CategorizeParams::default());

        assert!(matches!(
            handler.validate(&db, &ctx, &params),
            Err(Error::Validation(_))
        ));

        for (desc, direction) in [
            ("Office rent March", Direction::Expense),
            ("Mystery payment", Direction::Expense),
            ("Refund from supplier", Direction::Income),
        ] {
            db.insert_movement(
                1,
                &NewMovement {
                    account_id: None,
                    date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                    description: desc.to_string(),
                    amount: 50.0,
                    direction,
                    category: None,
                },
                ctx.now(),
            )
            .unwrap();
        }

        handler.validate(&db, &ctx, &params).unwrap();
        let preview = handler.preview(&db, &ctx, &params).unwrap();
        assert_eq!(preview.items.len(), 3);
        assert_eq!(preview.warnings.len(), 1);

        let result = handler.execute(&db, &ctx, &params).unwrap();
        assert_eq!(result["categorized"], 3);
        assert_eq!(result["by_category"]["rent"], 1);
        assert_eq!(result["by_category"]["other_expense"], 1);
        assert_eq!(result["by_category"]["refunds"], 1);
        assert_eq!(db.count_uncategorized_movements(1).unwrap(), 0);
    }
}
