//! Process-wide wiring: stations by name, projects, per-project aggregation.
//!
//! The registry is an explicitly constructed root value. It owns the station
//! map (stations own their sensors and fifos) and answers the per-project
//! `is_safe` aggregate; there are no hidden globals.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Db;
use crate::intervention::HumanIntervention;
use crate::sensor::{SafetyResponse, Sensor, SensorKind};
use crate::station::Station;

pub struct Registry {
    stations: BTreeMap<String, Arc<Station>>,
    projects: Vec<String>,
}

impl Registry {
    /// Construct the stations in use and bind their sensors. Only stations
    /// referenced by at least one enabled sensor are built; their fifo
    /// capacities are finalized here, before any loop starts.
    pub fn build(config: &Config) -> Result<Registry> {
        let mut stations = BTreeMap::new();
        for name in config.stations_in_use() {
            let settings = config
                .stations
                .get(&name)
                .with_context(|| format!("sensor references unknown station '{name}'"))?
                .clone();
            if !settings.enabled {
                continue;
            }

            let sensors: Vec<Sensor> = config
                .project_sensors
                .values()
                .flat_map(|sensors| sensors.iter())
                .filter(|(_, s)| s.enabled && s.station == name)
                .map(|(sensor_name, s)| Sensor::new(sensor_name.clone(), s.clone()))
                .collect();

            let station = Station::new(settings, sensors, &config.location)?;
            stations.insert(name, station);
        }

        Ok(Registry {
            stations,
            projects: config.projects.clone(),
        })
    }

    pub fn station(&self, name: &str) -> Option<&Arc<Station>> {
        self.stations.get(name)
    }

    pub fn stations(&self) -> impl Iterator<Item = &Arc<Station>> {
        self.stations.values()
    }

    pub fn station_names(&self) -> Vec<String> {
        self.stations.keys().cloned().collect()
    }

    pub fn projects(&self) -> &[String] {
        &self.projects
    }

    pub fn has_project(&self, project: &str) -> bool {
        self.projects.iter().any(|p| p == project)
    }

    pub fn start_all(&self, db: Option<Db>) {
        for station in self.stations.values() {
            station.start(db.clone());
        }
    }

    pub fn stop_all(&self) {
        for station in self.stations.values() {
            station.stop();
        }
    }

    /// All sensors of a project, paired with their owning station.
    pub fn project_sensors(&self, project: &str) -> Vec<(Arc<Station>, Sensor)> {
        let mut out = Vec::new();
        for station in self.stations.values() {
            for sensor in station.sensors_snapshot() {
                if sensor.settings.project == project {
                    out.push((Arc::clone(station), sensor));
                }
            }
        }
        out
    }

    /// Per-project aggregate: unsafe iff any enabled sensor of the project is
    /// unsafe, with every sensor's reasons collected. `None` for an unknown
    /// project.
    pub fn is_safe(&self, project: &str) -> Option<SafetyResponse> {
        if !self.has_project(project) {
            return None;
        }

        let mut reasons = Vec::new();
        for station in self.stations.values() {
            for sensor in station.sensors_snapshot() {
                if sensor.settings.project != project || !sensor.settings.enabled {
                    continue;
                }
                let verdict = match &sensor.settings.kind {
                    // Checked live so an override file created mid-tick flips
                    // the very next response.
                    SensorKind::HumanIntervention { file } => {
                        let intervention = HumanIntervention::new(file.clone());
                        let asserted = intervention.is_asserted();
                        let mut live = sensor.clone();
                        live.evaluate_intervention(asserted, intervention.record());
                        live.verdict()
                    }
                    _ => sensor.verdict(),
                };
                if !verdict.safe {
                    let name = &sensor.name;
                    reasons.extend(
                        verdict
                            .reasons
                            .into_iter()
                            .map(|reason| format!("{name}: {reason}")),
                    );
                }
            }
        }

        Some(if reasons.is_empty() {
            SafetyResponse::safe()
        } else {
            SafetyResponse::unsafe_because(reasons)
        })
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{DatumValue, Reading};
    use chrono::Utc;
    use std::path::Path;

    fn test_config(intervention_dir: &Path) -> Config {
        let toml = format!(
            r#"
            [location]
            latitude = 30.597
            longitude = 34.762
            elevation = 876.0

            [server]
            host = "127.0.0.1"
            port = 8001

            [stations.davis]
            enabled = true
            interval = 60
            baud = 19200

            [stations.internal]
            enabled = true
            interval = 30
            human-intervention-file = "{}"

            [sensors.wind]
            source = "davis:wind_speed"
            min = 0.0
            max = 40.0
            nreadings = 3

            [sensors.human-intervention]
            source = "internal:human-intervention"

            [global]
            projects = ["last"]

            [last.sensors.wind]
            max = 30.0
            "#,
            intervention_dir.join("human_intervention.json").display()
        );
        Config::from_toml(&toml, intervention_dir).expect("config")
    }

    fn push_wind(registry: &Registry, values: &[f64]) {
        let station = registry.station("davis").expect("davis");
        for value in values {
            let mut reading = Reading::new(Utc::now());
            reading.set("wind_speed", DatumValue::Float(*value));
            station.push_reading(reading);
        }
        station.evaluate_sensors();
    }

    #[test]
    fn builds_only_stations_in_use_with_final_capacities() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Registry::build(&test_config(dir.path())).expect("registry");

        assert_eq!(registry.station_names(), vec!["davis", "internal"]);
        assert_eq!(
            registry.station("davis").expect("davis").fifo_capacity(),
            3
        );
    }

    #[test]
    fn aggregate_is_the_conjunction_of_sensor_verdicts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Registry::build(&test_config(dir.path())).expect("registry");

        // No readings yet: fail closed, with a reason per failing sensor.
        let verdict = registry.is_safe("default").expect("default project");
        assert!(!verdict.safe);
        assert!(!verdict.reasons.is_empty());

        push_wind(&registry, &[45.0, 45.0, 45.0]);
        let verdict = registry.is_safe("default").expect("default project");
        assert!(!verdict.safe);
        assert!(verdict.reasons.iter().any(|r| r.starts_with("wind:")));

        push_wind(&registry, &[20.0, 20.0, 20.0]);
        let verdict = registry.is_safe("default").expect("default project");
        assert!(verdict.safe, "reasons: {:?}", verdict.reasons);
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn project_override_diverges_from_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Registry::build(&test_config(dir.path())).expect("registry");

        // 35 km/h: over the `last` override (30), under the default max (40).
        push_wind(&registry, &[35.0, 35.0, 35.0]);

        let default = registry.is_safe("default").expect("default project");
        let last = registry.is_safe("last").expect("last project");
        assert!(default.safe, "reasons: {:?}", default.reasons);
        assert!(!last.safe);
    }

    #[test]
    fn intervention_file_flips_the_next_response() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Registry::build(&test_config(dir.path())).expect("registry");
        push_wind(&registry, &[10.0, 10.0, 10.0]);

        assert!(registry.is_safe("default").expect("project").safe);

        // Created mid-tick, observed by the very next aggregate call.
        let intervention =
            HumanIntervention::new(dir.path().join("human_intervention.json"));
        intervention.assert_with_reason("dome painter on the roof").expect("assert");
        let verdict = registry.is_safe("default").expect("project");
        assert!(!verdict.safe);
        assert!(verdict
            .reasons
            .iter()
            .any(|r| r.contains("human intervention asserted")));

        intervention.clear().expect("clear");
        assert!(registry.is_safe("default").expect("project").safe);
    }

    #[test]
    fn unknown_project_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Registry::build(&test_config(dir.path())).expect("registry");
        assert!(registry.is_safe("nonexistent").is_none());
    }
}
