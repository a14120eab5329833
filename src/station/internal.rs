//! The internal station: locally computed quantities, no transport.

use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;

use super::Backend;
use crate::config::LocationConfig;
use crate::intervention::HumanIntervention;
use crate::reading::{DatumValue, Reading};
use crate::solar;

pub const SUN_ELEVATION: &str = "sun-elevation";
pub const HUMAN_INTERVENTION: &str = "human-intervention";
pub const DATUMS: &[&str] = &[SUN_ELEVATION, HUMAN_INTERVENTION];

pub struct InternalBackend {
    latitude: f64,
    longitude: f64,
    elevation: f64,
    intervention: HumanIntervention,
}

impl InternalBackend {
    pub fn new(location: &LocationConfig, intervention_file: PathBuf) -> Self {
        Self {
            latitude: location.latitude,
            longitude: location.longitude,
            elevation: location.elevation,
            intervention: HumanIntervention::new(intervention_file),
        }
    }
}

impl Backend for InternalBackend {
    fn datums(&self) -> &'static [&'static str] {
        DATUMS
    }

    fn fetch(&mut self) -> Result<Reading> {
        let now = Utc::now();
        let mut reading = Reading::new(now);
        reading.set(
            SUN_ELEVATION,
            DatumValue::Float(solar::sun_elevation_degrees(
                now,
                self.latitude,
                self.longitude,
                self.elevation,
            )),
        );
        reading.set(
            HUMAN_INTERVENTION,
            DatumValue::Bool(self.intervention.is_asserted()),
        );
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_produces_both_virtual_datums() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let location = LocationConfig {
            latitude: 30.597,
            longitude: 34.762,
            elevation: 876.0,
        };
        let mut backend =
            InternalBackend::new(&location, dir.path().join("human_intervention.json"));

        let reading = backend.fetch()?;
        let elevation = reading.datums[SUN_ELEVATION].as_f64();
        assert!((-90.0..=90.0).contains(&elevation));
        assert_eq!(reading.datums[HUMAN_INTERVENTION], DatumValue::Bool(false));

        HumanIntervention::new(dir.path().join("human_intervention.json"))
            .assert_with_reason("test")?;
        let reading = backend.fetch()?;
        assert_eq!(reading.datums[HUMAN_INTERVENTION], DatumValue::Bool(true));
        Ok(())
    }
}
