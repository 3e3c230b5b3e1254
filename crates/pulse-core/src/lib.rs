//! Pulse Core Library
//!
//! Business-state reasoning for small organizations:
//! - Domain agents that perceive money, sales, people and inventory
//! - Decision core fusing perceptions into a state and reconciled insights
//! - Predictive engine for cash flow, budget burn and sales
//! - Deterministic intent parser and transaction categorizer
//! - Action pipeline with previews, confirmation and pattern learning
//! - Responder that renders computed facts through an optional LLM
//! - Encrypted SQLite persistence, organization-scoped

pub mod actions;
pub mod agents;
pub mod ai;
pub mod categorizer;
pub mod config;
pub mod context;
pub mod db;
pub mod decision;
pub mod error;
pub mod intent;
pub mod models;
pub mod period;
pub mod personalization;
pub mod predict;
pub mod responder;

/// Test utilities including a mock LLM server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use actions::{ActionHandler, ActionParams, ActionPipeline, ActionRegistry, Preview, Suggestion};
pub use agents::{Agent, Perception};
pub use ai::{AIBackend, AIClient, ChatTurn, MockBackend, OllamaBackend, OpenAICompatibleBackend};
pub use categorizer::Categorizer;
pub use config::EngineConfig;
pub use context::{Clock, FixedClock, OrgContext, Permission, SystemClock};
pub use db::Database;
pub use decision::DecisionCore;
pub use error::{Error, Result};
pub use intent::{Intent, IntentKind, IntentParser};
pub use period::ReportPeriod;
pub use personalization::{Personalization, Tone};
pub use predict::PredictiveEngine;
pub use responder::{ChatAction, ChatResponse, Responder};
