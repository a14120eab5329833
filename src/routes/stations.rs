use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;

use super::iso;
use crate::config::StationSettings;
use crate::error::{AppError, AppResult};
use crate::reading::{DatumValue, Reading};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct StationsResponse {
    pub(crate) known: Vec<String>,
    pub(crate) enabled: Vec<String>,
    pub(crate) in_use: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ReadingView {
    pub(crate) tstamp: String,
    pub(crate) datums: BTreeMap<String, DatumValue>,
}

impl From<Reading> for ReadingView {
    fn from(reading: Reading) -> Self {
        Self {
            tstamp: iso(reading.tstamp),
            datums: reading.datums,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct StationDetail {
    pub(crate) settings: StationSettings,
    pub(crate) datums: Vec<String>,
    pub(crate) in_use: bool,
    pub(crate) readings: Vec<ReadingView>,
}

pub(crate) async fn stations_handler(State(state): State<AppState>) -> Json<StationsResponse> {
    Json(StationsResponse {
        known: state.config.stations.keys().cloned().collect(),
        enabled: state.config.enabled_stations(),
        in_use: state.registry.station_names(),
    })
}

pub(crate) async fn station_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<StationDetail>> {
    let settings = state
        .config
        .stations
        .get(&name)
        .ok_or_else(|| AppError::not_found(format!("unknown station '{name}'")))?
        .clone();

    let (in_use, readings) = match state.registry.station(&name) {
        Some(station) => (
            true,
            station
                .snapshot_readings()
                .into_iter()
                .map(ReadingView::from)
                .collect(),
        ),
        None => (false, Vec::new()),
    };

    Ok(Json(StationDetail {
        datums: settings
            .model
            .datums()
            .iter()
            .map(|d| d.to_string())
            .collect(),
        settings,
        in_use,
        readings,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stations", get(stations_handler))
        .route("/stations/{name}", get(station_handler))
}
