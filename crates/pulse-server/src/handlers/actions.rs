//! Action lifecycle handlers
//!
//! Actions are prepared by the chat route; these endpoints move them through
//! confirm, execute, cancel and rate. The pipeline writes the audit entries.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{AppError, AppState, Org, MAX_PAGE_LIMIT};
use pulse_core::models::{Action, ActionStatus};
use pulse_core::Suggestion;

#[derive(Debug, Deserialize)]
pub struct ActionQuery {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub rating: i64,
}

/// GET /api/actions - List actions, newest first
pub async fn list_actions(
    State(state): State<Arc<AppState>>,
    Org(ctx): Org,
    Query(params): Query<ActionQuery>,
) -> Result<Json<Vec<Action>>, AppError> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<ActionStatus>)
        .transpose()
        .map_err(|e| AppError::bad_request(&e))?;
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);

    Ok(Json(state.pipeline.list(&ctx, status, limit)?))
}

/// GET /api/actions/:id
pub async fn get_action(
    State(state): State<Arc<AppState>>,
    Org(ctx): Org,
    Path(id): Path<i64>,
) -> Result<Json<Action>, AppError> {
    Ok(Json(state.pipeline.get(&ctx, id)?))
}

/// POST /api/actions/:id/confirm
pub async fn confirm_action(
    State(state): State<Arc<AppState>>,
    Org(ctx): Org,
    Path(id): Path<i64>,
) -> Result<Json<Action>, AppError> {
    Ok(Json(state.pipeline.confirm(&ctx, id)?))
}

/// POST /api/actions/:id/execute - Run a confirmed action exactly once
pub async fn execute_action(
    State(state): State<Arc<AppState>>,
    Org(ctx): Org,
    Path(id): Path<i64>,
) -> Result<Json<Action>, AppError> {
    Ok(Json(state.pipeline.execute(&ctx, id)?))
}

/// POST /api/actions/:id/cancel
pub async fn cancel_action(
    State(state): State<Arc<AppState>>,
    Org(ctx): Org,
    Path(id): Path<i64>,
) -> Result<Json<Action>, AppError> {
    Ok(Json(state.pipeline.cancel(&ctx, id)?))
}

/// POST /api/actions/:id/rate - Rate an executed action from 1 to 5
pub async fn rate_action(
    State(state): State<Arc<AppState>>,
    Org(ctx): Org,
    Path(id): Path<i64>,
    Json(body): Json<RateRequest>,
) -> Result<Json<Action>, AppError> {
    Ok(Json(state.pipeline.rate(&ctx, id, body.rating)?))
}

/// GET /api/suggestions - Action types the user usually accepts
pub async fn list_suggestions(
    State(state): State<Arc<AppState>>,
    Org(ctx): Org,
) -> Result<Json<Vec<Suggestion>>, AppError> {
    Ok(Json(state.pipeline.suggestions(&ctx)?))
}
