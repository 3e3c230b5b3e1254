//! Forecast handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{AppError, AppState, Org, MAX_PAGE_LIMIT};
use pulse_core::models::{Prediction, PredictionType};

#[derive(Debug, Deserialize)]
pub struct PredictionQuery {
    /// cash_flow, budget_burn, sales_revenue or inventory_needs
    #[serde(rename = "type")]
    pub prediction_type: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
pub struct ActualRequest {
    pub actual: f64,
}

/// GET /api/predictions - Stored predictions, newest run first
pub async fn list_predictions(
    State(state): State<Arc<AppState>>,
    Org(ctx): Org,
    Query(params): Query<PredictionQuery>,
) -> Result<Json<Vec<Prediction>>, AppError> {
    let prediction_type = params
        .prediction_type
        .as_deref()
        .map(str::parse::<PredictionType>)
        .transpose()
        .map_err(|e| AppError::bad_request(&e))?;
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);

    let predictions = state
        .db
        .list_predictions(ctx.organization_id, prediction_type, limit)?;
    Ok(Json(predictions))
}

/// POST /api/predictions/generate - Run every forecast family
pub async fn generate_predictions(
    State(state): State<Arc<AppState>>,
    Org(ctx): Org,
) -> Result<Json<Vec<Prediction>>, AppError> {
    let predictions = state.predictor.generate(&ctx)?;
    Ok(Json(predictions))
}

/// POST /api/predictions/:id/actual - Backfill the observed value
pub async fn record_actual(
    State(state): State<Arc<AppState>>,
    Org(ctx): Org,
    Path(id): Path<i64>,
    Json(body): Json<ActualRequest>,
) -> Result<Json<Prediction>, AppError> {
    let prediction = state.predictor.record_actual(&ctx, id, body.actual)?;
    Ok(Json(prediction))
}
