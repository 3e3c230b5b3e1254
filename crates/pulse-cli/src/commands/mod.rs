//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init, demo data, organizations and shared utilities (open_db)
//! - `engine` - Decision cycles, forecasts and state
//! - `chat` - One chat turn through the responder
//! - `insights` - Insight listing and lifecycle
//! - `actions` - Action lifecycle and suggestions
//! - `serve` - Web server command

pub mod actions;
pub mod chat;
pub mod core;
pub mod engine;
pub mod insights;
pub mod serve;

// Re-export command functions for main.rs
pub use actions::*;
pub use chat::*;
pub use core::*;
pub use engine::*;
pub use insights::*;
pub use serve::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
