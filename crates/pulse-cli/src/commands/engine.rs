//! Decision cycle, forecast and state commands

use anyhow::{Context, Result};
use pulse_core::db::Database;
use pulse_core::models::State;
use pulse_core::{DecisionCore, EngineConfig, OrgContext, PredictiveEngine};

use super::{context, truncate};

pub fn cmd_cycle(db: &Database, config: &EngineConfig, ctx: &OrgContext) -> Result<()> {
    println!("🔄 Running decision cycle for organization {}...", ctx.organization_id);

    let core = DecisionCore::new(db.clone(), config.clone());
    let state = core.run_cycle(ctx).context("Decision cycle failed")?;
    print_state(&state);

    let insights = db.list_active_insights(ctx.organization_id)?;
    if insights.is_empty() {
        println!("\n✨ No active insights");
    } else {
        println!("\n💡 Active insights ({}):", insights.len());
        for insight in &insights {
            println!(
                "   [{:.2}] {:<12} {}",
                insight.priority,
                insight.insight_type.as_str(),
                truncate(&insight.title, 60)
            );
        }
    }

    Ok(())
}

/// Cycle every organization, continuing past failures
pub fn cmd_cycle_all(db: &Database, config: &EngineConfig) -> Result<()> {
    let core = DecisionCore::new(db.clone(), config.clone());
    let ids = db.list_organization_ids()?;
    println!("🔄 Running decision cycles for {} organizations...", ids.len());

    let mut failed = 0;
    for org in ids {
        let ctx = context(org, 0);
        match core.run_cycle(&ctx) {
            Ok(state) => println!(
                "   {:>4}  {:<10} urgency {:.2}  focus {}",
                org, state.mood.as_str(), state.urgency, state.focus_area
            ),
            Err(e) => {
                failed += 1;
                tracing::warn!(organization_id = org, error = %e, "Decision cycle failed");
                println!("   {:>4}  ❌ {}", org, e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} cycles failed", failed);
    }
    println!("✅ Done");
    Ok(())
}

pub fn cmd_predict(db: &Database, config: &EngineConfig, ctx: &OrgContext) -> Result<()> {
    println!("📈 Generating forecasts...");

    let engine = PredictiveEngine::new(db.clone(), config.forecast.clone());
    let predictions = engine.generate(ctx).context("Forecast failed")?;

    if predictions.is_empty() {
        println!("   Not enough history to forecast yet");
        return Ok(());
    }

    println!(
        "{:>6}  {:<16} {:<20} {:<12} {:>14} {:>6}",
        "ID", "Type", "Category", "Target", "Value", "Conf"
    );
    println!("{}", "-".repeat(80));
    for p in &predictions {
        println!(
            "{:>6}  {:<16} {:<20} {:<12} {:>14.2} {:>5.0}%",
            p.id,
            p.prediction_type.as_str(),
            truncate(&p.category, 20),
            p.target_date,
            p.predicted_value,
            p.confidence * 100.0
        );
    }
    Ok(())
}

pub fn cmd_state(db: &Database, config: &EngineConfig, ctx: &OrgContext) -> Result<()> {
    let core = DecisionCore::new(db.clone(), config.clone());
    let state = core.current_state(ctx)?;
    print_state(&state);
    Ok(())
}

fn print_state(state: &State) {
    println!();
    println!("📊 State");
    println!("   Focus:    {}", state.focus_area);
    println!("   Urgency:  {:.2}", state.urgency);
    println!("   Mood:     {}", state.mood);
    println!("   Context:  {}", state.context);
    match state.last_cycle_at {
        Some(at) => println!("   Last run: {}", at.format("%Y-%m-%d %H:%M UTC")),
        None => println!("   Last run: never"),
    }
    if !state.priorities.is_empty() {
        println!("   Priorities:");
        for (i, p) in state.priorities.iter().enumerate() {
            println!("     {}. {}", i + 1, p);
        }
    }
}
