//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use pulse_core::actions::CreateInvoiceParams;
use pulse_core::db::Database;
use pulse_core::models::{ActionStatus, InsightStatus};
use pulse_core::{ActionParams, EngineConfig, Tone};

use crate::commands::{self, truncate};

fn setup_test_db() -> Database {
    Database::in_memory().unwrap()
}

fn seeded() -> (Database, i64) {
    let db = setup_test_db();
    let org = commands::cmd_seed_demo(&db, "Demo Traders").unwrap();
    (db, org)
}

// ========== Core Command Tests ==========

#[test]
fn test_cmd_init_creates_organization() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pulse.db");

    commands::cmd_init(&path, true, Some("Acme"), "eur", "formal").unwrap();

    let db = commands::open_db(&path, true).unwrap();
    let id = db.find_organization_by_name("acme").unwrap().unwrap();
    let org = db.get_organization(id).unwrap().unwrap();
    assert_eq!(org.currency, "EUR");
    assert_eq!(org.tone, Tone::Formal);
}

#[test]
fn test_cmd_init_without_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pulse.db");

    commands::cmd_init(&path, true, None, "USD", "friendly").unwrap();

    let db = commands::open_db(&path, true).unwrap();
    assert!(db.list_organization_ids().unwrap().is_empty());
}

#[test]
fn test_create_org_rejects_duplicate_name() {
    let db = setup_test_db();
    commands::create_org(&db, "Acme", "USD", "friendly").unwrap();
    assert!(commands::create_org(&db, "ACME", "USD", "friendly").is_err());
}

#[test]
fn test_create_org_rejects_unknown_tone() {
    let db = setup_test_db();
    assert!(commands::create_org(&db, "Acme", "USD", "sarcastic").is_err());
    assert!(db.find_organization_by_name("Acme").unwrap().is_none());
}

#[test]
fn test_cmd_seed_demo_populates_every_area() {
    let (db, org) = seeded();

    assert!(db.cash_balance(org).unwrap() > 0.0);
    assert_eq!(db.count_customers(org).unwrap(), 2);
    assert_eq!(db.count_active_team_members(org).unwrap(), 2);
    assert_eq!(db.list_stock_items(org).unwrap().len(), 3);
    assert_eq!(db.count_uncategorized_movements(org).unwrap(), 1);
}

#[test]
fn test_cmd_orgs() {
    let (db, _) = seeded();
    assert!(commands::cmd_orgs(&db).is_ok());
    assert!(commands::cmd_orgs(&setup_test_db()).is_ok());
}

#[test]
fn test_load_config_missing_file_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let config = commands::load_config(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config, EngineConfig::default());
}

// ========== Engine Command Tests ==========

#[test]
fn test_cmd_cycle_creates_insights() {
    let (db, org) = seeded();
    let config = EngineConfig::default();
    let ctx = commands::context(org, 1);

    commands::cmd_cycle(&db, &config, &ctx).unwrap();

    let active = db.list_active_insights(org).unwrap();
    assert!(active.iter().any(|i| i.title == "Items out of stock"));
    let state = db.get_or_create_state(org, ctx.now()).unwrap();
    assert!(state.last_cycle_at.is_some());
}

#[test]
fn test_cmd_cycle_all() {
    let db = setup_test_db();
    let a = commands::cmd_seed_demo(&db, "First").unwrap();
    let b = commands::cmd_seed_demo(&db, "Second").unwrap();

    commands::cmd_cycle_all(&db, &EngineConfig::default()).unwrap();

    for org in [a, b] {
        assert!(db.count_active_insights(org).unwrap() > 0);
    }
}

#[test]
fn test_cmd_state_before_first_cycle() {
    let (db, org) = seeded();
    let result = commands::cmd_state(&db, &EngineConfig::default(), &commands::context(org, 1));
    assert!(result.is_ok());
}

#[test]
fn test_cmd_predict() {
    let (db, org) = seeded();
    let result = commands::cmd_predict(&db, &EngineConfig::default(), &commands::context(org, 1));
    assert!(result.is_ok());
    assert!(!db.latest_predictions(org).unwrap().is_empty());
}

// ========== Insights Command Tests ==========

#[test]
fn test_cmd_insights_dismiss_and_complete() {
    let (db, org) = seeded();
    let ctx = commands::context(org, 1);
    commands::cmd_cycle(&db, &EngineConfig::default(), &ctx).unwrap();

    let active = db.list_active_insights(org).unwrap();
    assert!(active.len() >= 2);

    commands::cmd_insights_dismiss(&db, &ctx, active[0].id).unwrap();
    commands::cmd_insights_complete(&db, &ctx, active[1].id).unwrap();

    let first = db.get_insight(org, active[0].id).unwrap().unwrap();
    let second = db.get_insight(org, active[1].id).unwrap().unwrap();
    assert_eq!(first.status, InsightStatus::Dismissed);
    assert_eq!(second.status, InsightStatus::Completed);

    // Closed insights cannot be closed again
    assert!(commands::cmd_insights_dismiss(&db, &ctx, active[0].id).is_err());
}

#[test]
fn test_cmd_insights_list_rejects_unknown_status() {
    let (db, org) = seeded();
    let ctx = commands::context(org, 1);
    assert!(commands::cmd_insights_list(&db, &ctx, Some("archived"), 10).is_err());
    assert!(commands::cmd_insights_list(&db, &ctx, Some("active"), 10).is_ok());
}

// ========== Actions Command Tests ==========

fn prepare_invoice(db: &Database, org: i64) -> (pulse_core::ActionPipeline, i64) {
    let pipeline = commands::pipeline(db).unwrap();
    let action = pipeline
        .prepare(
            &commands::context(org, 1),
            ActionParams::CreateInvoice(CreateInvoiceParams {
                customer: "Initech".to_string(),
                amount: 750.0,
                description: None,
                issue_date: None,
                due_date: None,
            }),
        )
        .unwrap();
    (pipeline, action.id)
}

#[test]
fn test_cmd_actions_lifecycle() {
    let (db, org) = seeded();
    let ctx = commands::context(org, 1);
    let (pipeline, id) = prepare_invoice(&db, org);

    commands::cmd_actions_list(&pipeline, &ctx, Some("pending"), 10).unwrap();
    commands::cmd_actions_show(&pipeline, &ctx, id).unwrap();
    commands::cmd_actions_confirm(&pipeline, &ctx, id).unwrap();
    commands::cmd_actions_execute(&pipeline, &ctx, id).unwrap();
    commands::cmd_actions_rate(&pipeline, &ctx, id, 5).unwrap();

    let action = pipeline.get(&ctx, id).unwrap();
    assert_eq!(action.status, ActionStatus::Executed);
    assert_eq!(action.rating, Some(5));

    // Executing twice is refused
    assert!(commands::cmd_actions_execute(&pipeline, &ctx, id).is_err());
}

#[test]
fn test_cmd_actions_cancel() {
    let (db, org) = seeded();
    let ctx = commands::context(org, 1);
    let (pipeline, id) = prepare_invoice(&db, org);

    commands::cmd_actions_cancel(&pipeline, &ctx, id).unwrap();
    assert_eq!(pipeline.get(&ctx, id).unwrap().status, ActionStatus::Cancelled);
    assert!(commands::cmd_actions_confirm(&pipeline, &ctx, id).is_err());
}

#[test]
fn test_cmd_actions_execute_requires_confirmation() {
    let (db, org) = seeded();
    let ctx = commands::context(org, 1);
    let (pipeline, id) = prepare_invoice(&db, org);

    assert!(commands::cmd_actions_execute(&pipeline, &ctx, id).is_err());
    assert_eq!(pipeline.get(&ctx, id).unwrap().status, ActionStatus::Pending);
}

#[test]
fn test_cmd_suggestions_empty() {
    let (db, org) = seeded();
    let pipeline = commands::pipeline(&db).unwrap();
    assert!(commands::cmd_suggestions(&pipeline, &commands::context(org, 1)).is_ok());
}

// ========== Chat Command Tests ==========

#[tokio::test]
async fn test_run_chat_cash_question_uses_templates() {
    let (db, org) = seeded();
    let ctx = commands::context(org, 1);

    let response = commands::run_chat(
        &db,
        EngineConfig::default(),
        None,
        &ctx,
        "how much cash do we have?",
        None,
    )
    .await
    .unwrap();

    assert!(response.content.contains('$'), "content: {}", response.content);
    assert!(response.action.is_none());
}

#[tokio::test]
async fn test_run_chat_missing_attachment() {
    let (db, org) = seeded();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("statement.txt");

    let result = commands::run_chat(
        &db,
        EngineConfig::default(),
        None,
        &commands::context(org, 1),
        "add these transactions",
        Some(&missing),
    )
    .await;
    assert!(result.is_err());
}

// ========== Utility Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("exactly10!", 10), "exactly10!");
    assert_eq!(truncate("this is a long string", 10), "this is...");
    assert_eq!(truncate("café au lait", 6), "caf...");
}
