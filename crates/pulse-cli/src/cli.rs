//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Pulse - Business-state reasoning for small organizations
#[derive(Parser)]
#[command(name = "pulse")]
#[command(about = "Perceive, decide and act on the state of a small business", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "pulse.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set PULSE_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// Engine config file (defaults to the built-in config plus the user override)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Organization the command acts on
    #[arg(long, default_value = "1", global = true)]
    pub org: i64,

    /// Acting user id
    #[arg(long, default_value = "1", global = true)]
    pub user: i64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database, optionally creating an organization
    Init {
        /// Organization name to create
        #[arg(long)]
        name: Option<String>,

        /// Currency code for the organization
        #[arg(long, default_value = "USD")]
        currency: String,

        /// Tone for responses: friendly, formal, concise
        #[arg(long, default_value = "friendly")]
        tone: String,
    },

    /// Create an organization populated with demo data
    SeedDemo {
        /// Organization name
        #[arg(long, default_value = "Demo Traders")]
        name: String,
    },

    /// List organizations
    Orgs,

    /// Run one decision cycle
    Cycle {
        /// Run for every organization
        #[arg(long)]
        all: bool,
    },

    /// Generate forecasts
    Predict,

    /// Show the current state
    State,

    /// Ask a question or request an action
    Chat {
        /// Message text
        #[arg(required = true, trailing_var_arg = true)]
        message: Vec<String>,

        /// Attach extracted document text (e.g. a bank statement)
        #[arg(long)]
        attach: Option<PathBuf>,
    },

    /// List and manage insights
    Insights {
        #[command(subcommand)]
        action: Option<InsightsAction>,
    },

    /// List and manage actions
    Actions {
        #[command(subcommand)]
        action: Option<ActionsAction>,
    },

    /// Action types this user usually accepts
    Suggestions,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable API key authentication (for local development only)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
pub enum InsightsAction {
    /// List insights
    List {
        /// Status filter: active, dismissed, completed, expired
        #[arg(long)]
        status: Option<String>,

        /// Maximum rows
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
    /// Dismiss an active insight
    Dismiss { id: i64 },
    /// Mark an active insight completed
    Complete { id: i64 },
}

#[derive(Subcommand)]
pub enum ActionsAction {
    /// List actions
    List {
        /// Status filter: pending, confirmed, executing, executed, failed, cancelled
        #[arg(long)]
        status: Option<String>,

        /// Maximum rows
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
    /// Show one action with its preview and result
    Show { id: i64 },
    /// Confirm a pending action
    Confirm { id: i64 },
    /// Execute a confirmed action
    Execute { id: i64 },
    /// Cancel a pending action
    Cancel { id: i64 },
    /// Rate an executed action from 1 to 5
    Rate { id: i64, rating: i64 },
}
