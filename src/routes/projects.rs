use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub(crate) async fn projects_handler(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.registry.projects().to_vec())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/projects", get(projects_handler))
}
