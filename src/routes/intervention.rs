use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::error::{AppError, AppResult};
use crate::intervention::InterventionRecord;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreateParams {
    pub(crate) reason: Option<String>,
}

pub(crate) async fn create_handler(
    State(state): State<AppState>,
    Query(params): Query<CreateParams>,
) -> AppResult<Json<InterventionRecord>> {
    let reason = params
        .reason
        .filter(|reason| !reason.trim().is_empty())
        .unwrap_or_else(|| "operator override".to_string());
    let record = state
        .intervention
        .assert_with_reason(&reason)
        .map_err(AppError::internal)?;
    tracing::info!(reason = %record.reason, "human intervention asserted");
    Ok(Json(record))
}

pub(crate) async fn remove_handler(State(state): State<AppState>) -> AppResult<Json<JsonValue>> {
    state.intervention.clear().map_err(AppError::internal)?;
    tracing::info!("human intervention cleared");
    Ok(Json(json!({ "removed": true })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/human-intervention/create", get(create_handler))
        .route("/human-intervention/remove", get(remove_handler))
}
