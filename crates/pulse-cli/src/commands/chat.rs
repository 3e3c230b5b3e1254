//! Chat command: one turn through the responder

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use pulse_core::db::Database;
use pulse_core::{AIBackend, AIClient, ChatResponse, EngineConfig, OrgContext, Responder};

use super::pipeline;

pub async fn cmd_chat(
    db: &Database,
    config: EngineConfig,
    ctx: &OrgContext,
    message: &str,
    attach: Option<&Path>,
) -> Result<()> {
    let ai = AIClient::from_env();
    match &ai {
        Some(client) => tracing::debug!(host = client.host(), model = client.model(), "Renderer enabled"),
        None => tracing::debug!("No AI backend configured, using templates"),
    }

    let response = run_chat(db, config, ai, ctx, message, attach).await?;
    print_response(&response);
    Ok(())
}

/// Answer one message, reading an optional attachment as extracted text
pub async fn run_chat(
    db: &Database,
    config: EngineConfig,
    ai: Option<AIClient>,
    ctx: &OrgContext,
    message: &str,
    attach: Option<&Path>,
) -> Result<ChatResponse> {
    let attachments = match attach {
        Some(path) => vec![std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read attachment {}", path.display()))?],
        None => Vec::new(),
    };

    let db = Arc::new(db.clone());
    let pipeline = Arc::new(pipeline(&db)?);
    let responder = Responder::new(db, pipeline, ai, config)?;

    let response = responder
        .respond(ctx, message, &[], &attachments)
        .await
        .context("Failed to answer message")?;
    Ok(response)
}

fn print_response(response: &ChatResponse) {
    println!("{}", response.content);

    if let Some(action) = &response.action {
        println!();
        println!("📝 {}", action.preview.summary);
        for item in &action.preview.items {
            println!("   {}: {}", item.label, item.value);
        }
        for warning in &action.preview.warnings {
            println!("   ⚠️  {}", warning);
        }
        if action.requires_confirmation {
            println!();
            println!(
                "   Confirm with: pulse actions confirm {0} && pulse actions execute {0}",
                action.action_id
            );
        }
    }

    if !response.quick_actions.is_empty() {
        println!();
        println!("💬 Try: {}", response.quick_actions.join(" | "));
    }
}
