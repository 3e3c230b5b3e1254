//! Insight commands

use anyhow::{Context, Result};
use pulse_core::db::Database;
use pulse_core::models::InsightStatus;
use pulse_core::OrgContext;

use super::truncate;

pub fn cmd_insights_list(
    db: &Database,
    ctx: &OrgContext,
    status: Option<&str>,
    limit: i64,
) -> Result<()> {
    let status: Option<InsightStatus> = status
        .map(|s| s.parse())
        .transpose()
        .map_err(anyhow::Error::msg)?;

    let insights = db.list_insights(ctx.organization_id, status, limit)?;
    if insights.is_empty() {
        println!("No insights found. Run a cycle first: pulse cycle");
        return Ok(());
    }

    println!(
        "{:>6}  {:<9} {:<12} {:<10} {:>5}  {}",
        "ID", "Status", "Type", "Category", "Prio", "Title"
    );
    println!("{}", "-".repeat(90));
    for insight in &insights {
        println!(
            "{:>6}  {:<9} {:<12} {:<10} {:>5.2}  {}",
            insight.id,
            insight.status.as_str(),
            insight.insight_type.as_str(),
            truncate(&insight.category, 10),
            insight.priority,
            truncate(&insight.title, 40)
        );
        if !insight.suggested_actions.is_empty() {
            println!("{:>8}→ {}", "", insight.suggested_actions.join(", "));
        }
    }
    Ok(())
}

pub fn cmd_insights_dismiss(db: &Database, ctx: &OrgContext, id: i64) -> Result<()> {
    close(db, ctx, id, InsightStatus::Dismissed)
}

pub fn cmd_insights_complete(db: &Database, ctx: &OrgContext, id: i64) -> Result<()> {
    close(db, ctx, id, InsightStatus::Completed)
}

fn close(db: &Database, ctx: &OrgContext, id: i64, status: InsightStatus) -> Result<()> {
    let insight = db
        .close_insight(ctx.organization_id, id, status, ctx.now())
        .with_context(|| format!("Failed to mark insight {} {}", id, status))?;
    db.log_audit(
        ctx.organization_id,
        Some(ctx.user_id),
        status.as_str(),
        "insight",
        Some(id),
        Some(&insight.title),
    )?;
    println!("✅ Insight {} {}: {}", id, status, insight.title);
    Ok(())
}
