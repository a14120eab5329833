use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use super::iso;
use crate::error::{AppError, AppResult};
use crate::reading::DatumValue;
use crate::sensor::SensorSettings;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SensorView {
    pub(crate) name: String,
    pub(crate) source: String,
    pub(crate) safe: bool,
    pub(crate) reasons: Vec<String>,
    pub(crate) settings: SensorSettings,
    /// Latest values the sensor evaluates, oldest first; empty until enough
    /// readings have accumulated.
    pub(crate) latest: Vec<DatumValue>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SensorDetail {
    #[serde(flatten)]
    pub(crate) view: SensorView,
    pub(crate) station_interval_seconds: u64,
    /// Timestamps of the station's current history, newest last.
    pub(crate) reading_tstamps: Vec<String>,
}

pub(crate) async fn sensors_handler(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> AppResult<Json<Vec<SensorView>>> {
    if !state.registry.has_project(&project) {
        return Err(AppError::not_found(format!("unknown project '{project}'")));
    }

    let views = state
        .registry
        .project_sensors(&project)
        .into_iter()
        .map(|(station, sensor)| {
            let latest = station
                .latest_readings(&sensor.settings.datum, sensor.settings.nreadings())
                .unwrap_or_default();
            SensorView {
                name: sensor.name,
                source: sensor.settings.source(),
                safe: sensor.safe,
                reasons: sensor.reasons,
                settings: sensor.settings,
                latest,
            }
        })
        .collect();
    Ok(Json(views))
}

pub(crate) async fn sensor_handler(
    State(state): State<AppState>,
    Path((project, name)): Path<(String, String)>,
) -> AppResult<Json<SensorDetail>> {
    if !state.registry.has_project(&project) {
        return Err(AppError::not_found(format!("unknown project '{project}'")));
    }

    let (station, sensor) = state
        .registry
        .project_sensors(&project)
        .into_iter()
        .find(|(_, sensor)| sensor.name == name)
        .ok_or_else(|| {
            AppError::not_found(format!("unknown sensor '{name}' in project '{project}'"))
        })?;

    let latest = station
        .latest_readings(&sensor.settings.datum, sensor.settings.nreadings())
        .unwrap_or_default();
    let reading_tstamps = station
        .snapshot_readings()
        .into_iter()
        .map(|reading| iso(reading.tstamp))
        .collect();

    Ok(Json(SensorDetail {
        view: SensorView {
            name: sensor.name,
            source: sensor.settings.source(),
            safe: sensor.safe,
            reasons: sensor.reasons,
            settings: sensor.settings,
            latest,
        },
        station_interval_seconds: station.settings.interval_seconds,
        reading_tstamps,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{project}/sensors", get(sensors_handler))
        .route("/{project}/sensor/{name}", get(sensor_handler))
}
