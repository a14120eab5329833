//! Per-project safety sensors.
//!
//! A sensor consumes one datum of one station and holds a rolling verdict.
//! Verdicts are recomputed by the owning station's evaluator after every
//! acquisition tick; the functions here are pure over (values, now, hour) so
//! the settling state machine is testable without wall-clock sleeps.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

use crate::intervention::InterventionRecord;

/// Aggregated or per-sensor verdict. `safe` implies `reasons` is empty.
#[derive(Debug, Clone, Serialize)]
pub struct SafetyResponse {
    pub safe: bool,
    pub reasons: Vec<String>,
}

impl SafetyResponse {
    pub fn safe() -> Self {
        Self {
            safe: true,
            reasons: Vec::new(),
        }
    }

    pub fn unsafe_because(reasons: Vec<String>) -> Self {
        Self {
            safe: false,
            reasons,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SensorKind {
    /// Values are safe in `[min, max)`; the right endpoint is exclusive.
    MinMax {
        min: f64,
        max: f64,
        /// Debounce in seconds after readings come back in range.
        settling: f64,
        nreadings: usize,
    },
    /// Day/night rule on the sun's elevation, thresholds in degrees.
    SunElevation { dawn: f64, dusk: f64 },
    /// Operator override backed by a file on disk.
    HumanIntervention { file: PathBuf },
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorSettings {
    pub project: String,
    pub station: String,
    pub datum: String,
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: SensorKind,
}

impl SensorSettings {
    pub fn nreadings(&self) -> usize {
        match &self.kind {
            SensorKind::MinMax { nreadings, .. } => (*nreadings).max(1),
            SensorKind::SunElevation { .. } | SensorKind::HumanIntervention { .. } => 1,
        }
    }

    pub fn source(&self) -> String {
        format!("{}:{}", self.station, self.datum)
    }
}

#[derive(Debug, Clone)]
pub struct Sensor {
    pub name: String,
    pub settings: SensorSettings,
    pub safe: bool,
    pub reasons: Vec<String>,
    pub started_settling: Option<Instant>,
}

impl Sensor {
    pub fn new(name: impl Into<String>, settings: SensorSettings) -> Self {
        let station = settings.station.clone();
        Self {
            name: name.into(),
            settings,
            safe: false,
            reasons: vec![format!("station '{station}' has no readings yet")],
            started_settling: None,
        }
    }

    pub fn verdict(&self) -> SafetyResponse {
        if self.safe {
            SafetyResponse::safe()
        } else {
            SafetyResponse::unsafe_because(self.reasons.clone())
        }
    }

    fn set_safe(&mut self) {
        self.safe = true;
        self.reasons.clear();
    }

    fn set_unsafe(&mut self, reasons: Vec<String>) {
        self.safe = false;
        self.reasons = reasons;
    }

    /// Min/max evaluation over the latest `nreadings` values, oldest first.
    pub fn evaluate_min_max(&mut self, values: &[f64], now: Instant) {
        let (min, max, settling) = match self.settings.kind {
            SensorKind::MinMax {
                min, max, settling, ..
            } => (min, max, settling),
            _ => return,
        };

        let bad = values.iter().filter(|v| **v < min || **v >= max).count();
        if bad > 0 {
            self.started_settling = None;
            self.set_unsafe(vec![format!(
                "{bad} of {} readings out of range [{min}, {max}): {values:?}",
                values.len()
            )]);
            return;
        }

        if self.safe {
            return;
        }
        if settling <= 0.0 {
            self.set_safe();
            return;
        }

        let started = *self.started_settling.get_or_insert(now);
        let elapsed = now.duration_since(started).as_secs_f64();
        if elapsed >= settling {
            self.started_settling = None;
            self.set_safe();
        } else {
            self.set_unsafe(vec![format!(
                "settling for {:.1} more seconds",
                settling - elapsed
            )]);
        }
    }

    /// The fifo holds fewer readings than the sensor needs. Not a settling
    /// condition: the timer is cleared and re-armed on the next transition.
    pub fn evaluate_unavailable(&mut self, available: usize, wanted: usize) {
        self.started_settling = None;
        self.set_unsafe(vec![format!(
            "station '{}': only {available} of {wanted} readings available",
            self.settings.station
        )]);
    }

    /// Day/night rule. Mornings compare against `dawn`, afternoons and
    /// evenings against `dusk`; equality with the threshold is safe.
    pub fn evaluate_sun(&mut self, elevation: f64, local_hour: u32) {
        let (dawn, dusk) = match self.settings.kind {
            SensorKind::SunElevation { dawn, dusk } => (dawn, dusk),
            _ => return,
        };

        let (limit, label) = if local_hour >= 12 {
            (dusk, "dusk")
        } else {
            (dawn, "dawn")
        };
        if elevation > limit {
            self.set_unsafe(vec![format!(
                "sun elevation {elevation:.2} deg is above the {label} limit ({limit:.2} deg)"
            )]);
        } else {
            self.set_safe();
        }
    }

    pub fn evaluate_intervention(&mut self, asserted: bool, record: Option<InterventionRecord>) {
        if !matches!(self.settings.kind, SensorKind::HumanIntervention { .. }) {
            return;
        }
        if asserted {
            let mut reason = "human intervention asserted".to_string();
            if let Some(record) = record {
                reason.push_str(&format!(
                    " ({} at {})",
                    record.reason,
                    record.tstamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
                ));
            }
            self.set_unsafe(vec![reason]);
        } else {
            self.set_safe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn min_max_sensor(min: f64, max: f64, settling: f64, nreadings: usize) -> Sensor {
        Sensor::new(
            "wind",
            SensorSettings {
                project: "default".to_string(),
                station: "davis".to_string(),
                datum: "wind_speed".to_string(),
                enabled: true,
                kind: SensorKind::MinMax {
                    min,
                    max,
                    settling,
                    nreadings,
                },
            },
        )
    }

    fn sun_sensor(dawn: f64, dusk: f64) -> Sensor {
        Sensor::new(
            "sun",
            SensorSettings {
                project: "default".to_string(),
                station: "internal".to_string(),
                datum: "sun-elevation".to_string(),
                enabled: true,
                kind: SensorKind::SunElevation { dawn, dusk },
            },
        )
    }

    #[test]
    fn new_sensor_fails_closed() {
        let sensor = min_max_sensor(0.0, 40.0, 0.0, 3);
        assert!(!sensor.safe);
        assert!(!sensor.reasons.is_empty());
    }

    #[test]
    fn right_endpoint_is_exclusive() {
        let now = Instant::now();

        let mut at_min = min_max_sensor(0.0, 40.0, 0.0, 1);
        at_min.evaluate_min_max(&[0.0], now);
        assert!(at_min.safe, "v = min must be safe");

        let mut at_max = min_max_sensor(0.0, 40.0, 0.0, 1);
        at_max.evaluate_min_max(&[40.0], now);
        assert!(!at_max.safe, "v = max must be unsafe");
    }

    #[test]
    fn unsafe_reason_lists_count_range_and_values() {
        let mut sensor = min_max_sensor(0.0, 40.0, 0.0, 3);
        sensor.evaluate_min_max(&[50.0, 50.0, 30.0], Instant::now());
        assert!(!sensor.safe);
        let reason = &sensor.reasons[0];
        assert!(reason.contains("2 of 3"), "reason: {reason}");
        assert!(reason.contains("[0, 40)"), "reason: {reason}");
        assert!(reason.contains("50.0"), "reason: {reason}");
    }

    #[test]
    fn settling_arms_holds_expires_and_clears() {
        let mut sensor = min_max_sensor(0.0, 40.0, 30.0, 3);
        let t0 = Instant::now();

        sensor.evaluate_min_max(&[50.0, 50.0, 30.0], t0);
        assert!(!sensor.safe);
        assert!(sensor.started_settling.is_none());

        // Back in range: settling arms and the sensor stays unsafe.
        sensor.evaluate_min_max(&[30.0, 30.0, 30.0], t0 + Duration::from_secs(1));
        assert!(!sensor.safe);
        assert!(sensor.reasons[0].contains("settling"));
        assert!(sensor.started_settling.is_some());

        // Still inside the settling window.
        sensor.evaluate_min_max(&[30.0, 30.0, 30.0], t0 + Duration::from_secs(20));
        assert!(!sensor.safe);

        // Window elapsed without re-entering unsafe.
        sensor.evaluate_min_max(&[30.0, 30.0, 30.0], t0 + Duration::from_secs(32));
        assert!(sensor.safe);
        assert!(sensor.reasons.is_empty());

        // Re-entering unsafe clears the timer.
        sensor.evaluate_min_max(&[50.0, 30.0, 30.0], t0 + Duration::from_secs(40));
        assert!(!sensor.safe);
        assert!(sensor.started_settling.is_none());

        // Coming back in range re-arms from scratch.
        sensor.evaluate_min_max(&[30.0, 30.0, 30.0], t0 + Duration::from_secs(41));
        assert!(!sensor.safe);
        assert!(sensor.reasons[0].contains("settling"));
    }

    #[test]
    fn settling_window_holds_for_its_whole_duration() {
        let mut sensor = min_max_sensor(0.0, 40.0, 30.0, 1);
        let t0 = Instant::now();
        sensor.evaluate_min_max(&[50.0], t0);
        sensor.evaluate_min_max(&[30.0], t0 + Duration::from_secs(1));
        for offset in [2u64, 10, 29, 30] {
            sensor.evaluate_min_max(&[30.0], t0 + Duration::from_secs(1) + Duration::from_secs(offset));
            let expect_safe = offset >= 30;
            assert_eq!(sensor.safe, expect_safe, "offset={offset}");
        }
    }

    #[test]
    fn min_max_settles_even_with_a_single_reading() {
        let mut sensor = min_max_sensor(0.0, 40.0, 10.0, 1);
        let t0 = Instant::now();
        sensor.evaluate_min_max(&[50.0], t0);
        sensor.evaluate_min_max(&[30.0], t0 + Duration::from_secs(1));
        assert!(!sensor.safe, "single-reading min/max still settles");
    }

    #[test]
    fn unavailable_readings_are_not_a_settling_condition() {
        let mut sensor = min_max_sensor(0.0, 40.0, 30.0, 3);
        let t0 = Instant::now();
        sensor.evaluate_min_max(&[50.0, 50.0, 50.0], t0);
        sensor.evaluate_min_max(&[30.0, 30.0, 30.0], t0 + Duration::from_secs(1));
        assert!(sensor.started_settling.is_some());

        sensor.evaluate_unavailable(1, 3);
        assert!(!sensor.safe);
        assert!(sensor.reasons[0].contains("only 1 of 3"));
        assert!(sensor.started_settling.is_none());
    }

    #[test]
    fn sun_rule_is_strict_above_the_threshold() {
        let mut sensor = sun_sensor(0.0, -5.0);

        // Morning: compare against dawn.
        sensor.evaluate_sun(0.5, 8);
        assert!(!sensor.safe);
        assert!(sensor.reasons[0].contains("dawn"));

        sensor.evaluate_sun(0.0, 8);
        assert!(sensor.safe, "equality with the threshold is safe");

        // Evening: compare against dusk.
        sensor.evaluate_sun(0.5, 20);
        assert!(!sensor.safe);
        assert!(sensor.reasons[0].contains("dusk"));

        sensor.evaluate_sun(-5.0, 20);
        assert!(sensor.safe);

        sensor.evaluate_sun(-4.9, 20);
        assert!(!sensor.safe);
    }

    #[test]
    fn intervention_verdict_follows_the_file() {
        let mut sensor = Sensor::new(
            "human-intervention",
            SensorSettings {
                project: "default".to_string(),
                station: "internal".to_string(),
                datum: "human-intervention".to_string(),
                enabled: true,
                kind: SensorKind::HumanIntervention {
                    file: PathBuf::from("/tmp/override.json"),
                },
            },
        );

        sensor.evaluate_intervention(true, None);
        assert!(!sensor.safe);
        assert_eq!(sensor.reasons, vec!["human intervention asserted"]);

        sensor.evaluate_intervention(false, None);
        assert!(sensor.safe);
    }
}
