//! Pulse CLI - Business-state reasoning engine
//!
//! Usage:
//!   pulse init --name "Acme"          Initialize database and an organization
//!   pulse seed-demo                    Create an organization with demo data
//!   pulse cycle                        Run a decision cycle
//!   pulse chat "how much cash do we have?"
//!   pulse serve --port 3000            Start web server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init {
            name,
            currency,
            tone,
        } => commands::cmd_init(&cli.db, cli.no_encrypt, name.as_deref(), &currency, &tone),
        Commands::SeedDemo { name } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_seed_demo(&db, &name).map(|_| ())
        }
        Commands::Orgs => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_orgs(&db)
        }
        Commands::Cycle { all } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            if all {
                commands::cmd_cycle_all(&db, &config)
            } else {
                commands::cmd_cycle(&db, &config, &commands::context(cli.org, cli.user))
            }
        }
        Commands::Predict => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_predict(&db, &config, &commands::context(cli.org, cli.user))
        }
        Commands::State => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_state(&db, &config, &commands::context(cli.org, cli.user))
        }
        Commands::Chat { message, attach } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let ctx = commands::context(cli.org, cli.user);
            commands::cmd_chat(&db, config, &ctx, &message.join(" "), attach.as_deref()).await
        }
        Commands::Insights { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let ctx = commands::context(cli.org, cli.user);
            match action {
                None => commands::cmd_insights_list(&db, &ctx, None, 20),
                Some(InsightsAction::List { status, limit }) => {
                    commands::cmd_insights_list(&db, &ctx, status.as_deref(), limit)
                }
                Some(InsightsAction::Dismiss { id }) => commands::cmd_insights_dismiss(&db, &ctx, id),
                Some(InsightsAction::Complete { id }) => {
                    commands::cmd_insights_complete(&db, &ctx, id)
                }
            }
        }
        Commands::Actions { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let ctx = commands::context(cli.org, cli.user);
            let pipeline = commands::pipeline(&db)?;
            match action {
                None => commands::cmd_actions_list(&pipeline, &ctx, None, 20),
                Some(ActionsAction::List { status, limit }) => {
                    commands::cmd_actions_list(&pipeline, &ctx, status.as_deref(), limit)
                }
                Some(ActionsAction::Show { id }) => commands::cmd_actions_show(&pipeline, &ctx, id),
                Some(ActionsAction::Confirm { id }) => {
                    commands::cmd_actions_confirm(&pipeline, &ctx, id)
                }
                Some(ActionsAction::Execute { id }) => {
                    commands::cmd_actions_execute(&pipeline, &ctx, id)
                }
                Some(ActionsAction::Cancel { id }) => commands::cmd_actions_cancel(&pipeline, &ctx, id),
                Some(ActionsAction::Rate { id, rating }) => {
                    commands::cmd_actions_rate(&pipeline, &ctx, id, rating)
                }
            }
        }
        Commands::Suggestions => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let pipeline = commands::pipeline(&db)?;
            commands::cmd_suggestions(&pipeline, &commands::context(cli.org, cli.user))
        }
        Commands::Serve {
            port,
            host,
            no_auth,
        } => commands::cmd_serve(&cli.db, &host, port, no_auth, cli.no_encrypt, config).await,
    }
}
