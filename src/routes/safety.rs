use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::config::DEFAULT_PROJECT;
use crate::error::{AppError, AppResult};
use crate::sensor::SafetyResponse;
use crate::state::AppState;

pub(crate) async fn is_safe_default(
    State(state): State<AppState>,
) -> AppResult<Json<SafetyResponse>> {
    project_safety(&state, DEFAULT_PROJECT)
}

pub(crate) async fn is_safe_project(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> AppResult<Json<SafetyResponse>> {
    project_safety(&state, &project)
}

fn project_safety(state: &AppState, project: &str) -> AppResult<Json<SafetyResponse>> {
    state
        .registry
        .is_safe(project)
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("unknown project '{project}'")))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/is_safe", get(is_safe_default))
        .route("/{project}/is_safe", get(is_safe_project))
}
