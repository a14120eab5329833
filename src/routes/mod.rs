pub mod config;
pub mod health;
pub mod intervention;
pub mod projects;
pub mod safety;
pub mod sensors;
pub mod stations;

use axum::Router;
use chrono::{DateTime, SecondsFormat, Utc};
use tower_http::cors::CorsLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(config::router())
        .merge(stations::router())
        .merge(projects::router())
        .merge(intervention::router())
        .merge(safety::router())
        .merge(sensors::router())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Wire timestamp format: ISO-8601 UTC with a trailing `Z`.
pub(crate) fn iso(tstamp: DateTime<Utc>) -> String {
    tstamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_are_utc_with_a_trailing_z() {
        let tstamp = Utc.with_ymd_and_hms(2026, 8, 1, 18, 30, 5).single().unwrap();
        assert_eq!(iso(tstamp), "2026-08-01T18:30:05Z");
    }
}
