use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value as JsonValue;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Current configuration, as loaded at startup. The database password is
/// redacted before it goes on the wire.
pub(crate) async fn config_handler(State(state): State<AppState>) -> AppResult<Json<JsonValue>> {
    let mut snapshot = serde_json::to_value(state.config.as_ref()).map_err(AppError::internal)?;
    if let Some(password) = snapshot.pointer_mut("/database/password") {
        *password = JsonValue::String("***".to_string());
    }
    Ok(Json(snapshot))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/config", get(config_handler))
}
