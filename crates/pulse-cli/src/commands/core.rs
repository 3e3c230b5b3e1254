//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` - Engine config from --config or the default location
//! - `cmd_init` - Initialize the database
//! - `cmd_seed_demo` - Populate an organization with demo data
//! - `cmd_orgs` - List organizations

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use pulse_core::db::{Database, NewInvoice};
use pulse_core::models::{Direction, InvoiceStatus, LeaveStatus, NewMovement};
use pulse_core::{ActionPipeline, EngineConfig, OrgContext, Tone};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow!("Database path is not valid UTF-8: {}", db_path.display()))?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => EngineConfig::load().context("Failed to load engine config"),
    }
}

/// CLI callers act with every permission on the system clock
pub fn context(org: i64, user: i64) -> OrgContext {
    OrgContext::system(org, user)
}

pub fn pipeline(db: &Database) -> Result<ActionPipeline> {
    ActionPipeline::with_defaults(Arc::new(db.clone())).context("Failed to build action pipeline")
}

pub fn cmd_init(
    db_path: &Path,
    no_encrypt: bool,
    name: Option<&str>,
    currency: &str,
    tone: &str,
) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;

    if let Some(name) = name {
        let org = create_org(&db, name, currency, tone)?;
        println!("   Created organization '{}' (id {})", name, org);
    }

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Load demo data: pulse seed-demo");
    println!("  2. Run a cycle: pulse cycle");
    println!("  3. Start web UI: pulse serve");

    Ok(())
}

/// Create an organization unless one with that name already exists
pub fn create_org(db: &Database, name: &str, currency: &str, tone: &str) -> Result<i64> {
    if let Some(id) = db.find_organization_by_name(name)? {
        anyhow::bail!("Organization '{}' already exists (id {})", name, id);
    }
    let tone: Tone = tone.parse().map_err(anyhow::Error::msg)?;
    let id = db
        .create_organization(name, currency, tone, Utc::now())
        .context("Failed to create organization")?;
    db.log_audit(id, None, "create", "organization", Some(id), None)?;
    Ok(id)
}

/// Populate a fresh organization with a few weeks of activity in every area
pub fn cmd_seed_demo(db: &Database, name: &str) -> Result<i64> {
    let org = create_org(db, name, "USD", "friendly")?;
    let now = Utc::now();
    let today = now.date_naive();
    let days_ago = |n: i64| today - Duration::days(n);

    // Money
    let account = db.create_account(org, "Operating", 18_500.0)?;
    let movements = [
        (2, "Office rent", 2_400.0, Direction::Expense, Some("rent")),
        (4, "Client payment - Initech", 5_200.0, Direction::Income, Some("sales")),
        (6, "AWS invoice", 310.0, Direction::Expense, Some("software")),
        (9, "Team lunch", 145.0, Direction::Expense, Some("meals")),
        (12, "Office supplies order", 260.0, Direction::Expense, Some("inventory")),
        (15, "Client payment - Globex", 3_800.0, Direction::Income, Some("sales")),
        (18, "Unknown card charge", 89.0, Direction::Expense, None),
        (33, "Office rent", 2_400.0, Direction::Expense, Some("rent")),
        (38, "Client payment - Initech", 4_100.0, Direction::Income, Some("sales")),
        (41, "Contractor payout", 1_900.0, Direction::Expense, Some("contractors")),
    ];
    for (ago, description, amount, direction, category) in movements {
        let movement = NewMovement {
            account_id: Some(account),
            date: days_ago(ago),
            description: description.to_string(),
            amount,
            direction,
            category: category.map(str::to_string),
        };
        db.insert_movement(org, &movement, now)?;
    }

    let month_start = first_of_month(today);
    let month_end = first_of_month(month_start + Duration::days(32)) - Duration::days(1);
    db.create_budget_line(org, "Software", "software", 500.0, month_start, month_end)?;
    db.create_budget_line(org, "Inventory", "inventory", 250.0, month_start, month_end)?;

    // Sales
    let initech = db.find_or_create_customer(org, "Initech")?;
    let globex = db.find_or_create_customer(org, "Globex")?;
    let invoices = [
        (globex, 1_200.0, days_ago(45), days_ago(15)),
        (initech, 2_750.0, days_ago(10), today + Duration::days(20)),
        (globex, 900.0, days_ago(3), today + Duration::days(27)),
    ];
    for (customer_id, amount, issue_date, due_date) in invoices {
        db.create_invoice(
            org,
            &NewInvoice {
                customer_id,
                description: Some("Consulting".to_string()),
                amount,
                status: InvoiceStatus::Sent,
                issue_date,
                due_date,
            },
            now,
        )?;
    }
    db.create_quote(org, initech, 6_000.0, days_ago(8))?;

    // People
    let ada = db.create_team_member(org, "Ada", Some("Engineer"))?;
    db.create_team_member(org, "Grace", Some("Sales"))?;
    db.create_leave_request(
        org,
        ada,
        today + Duration::days(5),
        today + Duration::days(9),
        LeaveStatus::Approved,
    )?;
    db.create_payroll_run(org, today + Duration::days(6), 7_800.0)?;

    // Inventory
    db.create_stock_item(org, "Printer paper", Some("PP-500"), 3.0, 10.0, 6.5)?;
    db.create_stock_item(org, "Toner", Some("TN-01"), 0.0, 2.0, 48.0)?;
    db.create_stock_item(org, "Notebooks", Some("NB-A5"), 40.0, 15.0, 2.2)?;

    tracing::info!(organization_id = org, "Seeded demo organization");
    println!("🌱 Seeded demo organization '{}' (id {})", name, org);
    println!("   Try: pulse --org {} cycle", org);

    Ok(org)
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn cmd_orgs(db: &Database) -> Result<()> {
    let ids = db.list_organization_ids()?;
    if ids.is_empty() {
        println!("No organizations yet. Create one with: pulse init --name \"My Business\"");
        return Ok(());
    }

    println!("{:>4}  {:<28} {:<8} {:<10}", "ID", "Name", "Currency", "Tone");
    println!("{}", "-".repeat(54));
    for id in ids {
        match db.get_organization(id)? {
            Some(org) => println!(
                "{:>4}  {:<28} {:<8} {:<10}",
                org.id,
                super::truncate(&org.name, 28),
                org.currency,
                org.tone.as_str()
            ),
            None => println!("{:>4}  {:<28}", id, "(state only)"),
        }
    }
    Ok(())
}
