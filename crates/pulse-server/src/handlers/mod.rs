//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod actions;
pub mod chat;
pub mod insights;
pub mod predictions;
pub mod state;

// Re-export all handlers for use in router
pub use actions::*;
pub use chat::*;
pub use insights::*;
pub use predictions::*;
pub use state::*;
