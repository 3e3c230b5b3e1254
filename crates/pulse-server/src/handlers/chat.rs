//! Chat handler

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::{AppError, AppState, Org};
use pulse_core::{ChatResponse, ChatTurn};

/// Maximum message length accepted from clients
const MAX_MESSAGE_CHARS: usize = 4_000;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Prior turns, oldest first
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    /// Text extracted from uploaded documents
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// POST /api/chat - Answer a question or propose an action
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Org(ctx): Org,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = body.message.trim();
    if message.is_empty() {
        return Err(AppError::bad_request("Message is required"));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::bad_request("Message is too long"));
    }

    let response = state
        .responder
        .respond(&ctx, message, &body.history, &body.attachments)
        .await?;
    Ok(Json(response))
}
