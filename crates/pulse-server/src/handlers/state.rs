//! State and decision cycle handlers

use std::sync::Arc;

use axum::{extract::State, Json};
use pulse_core::models::State as BusinessState;

use crate::{AppError, AppState, Org};

/// GET /api/state - Current state, neutral before the first cycle
pub async fn get_state(
    State(state): State<Arc<AppState>>,
    Org(ctx): Org,
) -> Result<Json<BusinessState>, AppError> {
    let current = state.core.current_state(&ctx)?;
    Ok(Json(current))
}

/// POST /api/cycle - Run one decision cycle for the organization
pub async fn run_cycle(
    State(state): State<Arc<AppState>>,
    Org(ctx): Org,
) -> Result<Json<BusinessState>, AppError> {
    let updated = state.core.run_cycle(&ctx)?;

    state.db.log_audit(
        ctx.organization_id,
        Some(ctx.user_id),
        "cycle",
        "state",
        Some(updated.id),
        Some(&format!("focus={}, urgency={:.2}", updated.focus_area, updated.urgency)),
    )?;

    Ok(Json(updated))
}
