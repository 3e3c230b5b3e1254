//! Action lifecycle commands

use anyhow::{Context, Result};
use pulse_core::models::{Action, ActionStatus};
use pulse_core::{ActionPipeline, OrgContext};

use super::truncate;

pub fn cmd_actions_list(
    pipeline: &ActionPipeline,
    ctx: &OrgContext,
    status: Option<&str>,
    limit: i64,
) -> Result<()> {
    let status: Option<ActionStatus> = status
        .map(|s| s.parse())
        .transpose()
        .map_err(anyhow::Error::msg)?;

    let actions = pipeline.list(ctx, status, limit)?;
    if actions.is_empty() {
        println!("No actions found");
        return Ok(());
    }

    println!(
        "{:>6}  {:<10} {:<24} {:<16}  {}",
        "ID", "Status", "Type", "Created", "Summary"
    );
    println!("{}", "-".repeat(96));
    for action in &actions {
        println!(
            "{:>6}  {:<10} {:<24} {:<16}  {}",
            action.id,
            action.status.as_str(),
            action.action_type.as_str(),
            action.created_at.format("%Y-%m-%d %H:%M").to_string(),
            truncate(&action.preview.summary, 40)
        );
    }
    Ok(())
}

pub fn cmd_actions_show(pipeline: &ActionPipeline, ctx: &OrgContext, id: i64) -> Result<()> {
    let action = pipeline.get(ctx, id)?;
    print_action(&action);
    Ok(())
}

pub fn cmd_actions_confirm(pipeline: &ActionPipeline, ctx: &OrgContext, id: i64) -> Result<()> {
    let action = pipeline
        .confirm(ctx, id)
        .with_context(|| format!("Failed to confirm action {}", id))?;
    println!("✅ Confirmed: {}", action.preview.summary);
    println!("   Execute with: pulse actions execute {}", id);
    Ok(())
}

pub fn cmd_actions_execute(pipeline: &ActionPipeline, ctx: &OrgContext, id: i64) -> Result<()> {
    let action = pipeline
        .execute(ctx, id)
        .with_context(|| format!("Failed to execute action {}", id))?;
    println!("✅ Executed: {}", action.preview.summary);
    if let Some(result) = &action.result {
        println!("{}", serde_json::to_string_pretty(result)?);
    }
    Ok(())
}

pub fn cmd_actions_cancel(pipeline: &ActionPipeline, ctx: &OrgContext, id: i64) -> Result<()> {
    let action = pipeline
        .cancel(ctx, id)
        .with_context(|| format!("Failed to cancel action {}", id))?;
    println!("🚫 Cancelled: {}", action.preview.summary);
    Ok(())
}

pub fn cmd_actions_rate(
    pipeline: &ActionPipeline,
    ctx: &OrgContext,
    id: i64,
    rating: i64,
) -> Result<()> {
    pipeline
        .rate(ctx, id, rating)
        .with_context(|| format!("Failed to rate action {}", id))?;
    println!("⭐ Rated action {} with {}", id, rating);
    Ok(())
}

pub fn cmd_suggestions(pipeline: &ActionPipeline, ctx: &OrgContext) -> Result<()> {
    let suggestions = pipeline.suggestions(ctx)?;
    if suggestions.is_empty() {
        println!("No suggestions yet. Confirm a few actions first.");
        return Ok(());
    }

    println!("{:<26} {:>10} {:>10}", "Action", "Confidence", "Confirmed");
    println!("{}", "-".repeat(48));
    for s in &suggestions {
        println!(
            "{:<26} {:>9.0}% {:>10}",
            s.action_type.as_str(),
            s.confidence * 100.0,
            s.times_confirmed
        );
    }
    Ok(())
}

fn print_action(action: &Action) {
    println!("Action {} ({})", action.id, action.action_type);
    println!("   Status:   {}", action.status);
    println!("   Category: {}", action.category);
    println!("   Created:  {}", action.created_at.format("%Y-%m-%d %H:%M UTC"));
    println!();
    println!("   {}", action.preview.summary);
    for item in &action.preview.items {
        println!("     {}: {}", item.label, item.value);
    }
    for warning in &action.preview.warnings {
        println!("     ⚠️  {}", warning);
    }
    if let Some(result) = &action.result {
        println!();
        println!("   Result: {}", result);
    }
    if let Some(error) = &action.error_message {
        println!("   Error:  {}", error);
    }
    if let Some(rating) = action.rating {
        println!("   Rating: {}/5", rating);
    }
}
