//! Insight handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{AppError, AppState, Org, MAX_PAGE_LIMIT};
use pulse_core::models::{Insight, InsightStatus};

/// Query parameters for listing insights
#[derive(Debug, Deserialize)]
pub struct InsightQuery {
    /// Filter by status (active, dismissed, completed, expired)
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// GET /api/insights - List insights, highest priority first
pub async fn list_insights(
    State(state): State<Arc<AppState>>,
    Org(ctx): Org,
    Query(params): Query<InsightQuery>,
) -> Result<Json<Vec<Insight>>, AppError> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<InsightStatus>)
        .transpose()
        .map_err(|e| AppError::bad_request(&e))?;
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);

    let insights = state.db.list_insights(ctx.organization_id, status, limit)?;
    Ok(Json(insights))
}

/// POST /api/insights/:id/dismiss
pub async fn dismiss_insight(
    State(state): State<Arc<AppState>>,
    Org(ctx): Org,
    Path(id): Path<i64>,
) -> Result<Json<Insight>, AppError> {
    close(&state, &ctx, id, InsightStatus::Dismissed)
}

/// POST /api/insights/:id/complete
pub async fn complete_insight(
    State(state): State<Arc<AppState>>,
    Org(ctx): Org,
    Path(id): Path<i64>,
) -> Result<Json<Insight>, AppError> {
    close(&state, &ctx, id, InsightStatus::Completed)
}

fn close(
    state: &AppState,
    ctx: &pulse_core::OrgContext,
    id: i64,
    status: InsightStatus,
) -> Result<Json<Insight>, AppError> {
    let insight = state
        .db
        .close_insight(ctx.organization_id, id, status, ctx.now())?;

    state.db.log_audit(
        ctx.organization_id,
        Some(ctx.user_id),
        status.as_str(),
        "insight",
        Some(id),
        Some(&insight.title),
    )?;

    Ok(Json(insight))
}
