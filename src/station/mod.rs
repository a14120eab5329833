//! Stations: periodically polled data sources.
//!
//! A station owns its transport, a bounded readings fifo and the sensors
//! bound to it. One tokio task per station runs the acquisition loop;
//! blocking transport I/O is confined to `spawn_blocking` and always bounded
//! by the configured timeout. Errors inside a tick are logged and never
//! abort the loop.

pub mod arduino;
pub mod cyclope;
pub mod detect;
pub mod fifo;
pub mod internal;
pub mod tessw;
pub mod vantage;

use anyhow::{bail, Result};
use chrono::Timelike;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::{LocationConfig, StationModel, StationSettings, Transport};
use crate::db::Db;
use crate::intervention::HumanIntervention;
use crate::reading::{DatumValue, Reading};
use crate::sensor::{Sensor, SensorKind};
use fifo::{FifoError, ReadingsFifo};

const IP_TIMEOUT: Duration = Duration::from_secs(10);

/// Blocking acquisition backend: one `fetch` per tick over the station's
/// transport. Serial backends additionally support the detection probe.
pub trait Backend: Send {
    fn datums(&self) -> &'static [&'static str];
    fn fetch(&mut self) -> Result<Reading>;

    /// Whether readings of this station go to the database.
    fn persists(&self) -> bool {
        false
    }

    fn probe_port(&self, _port_name: &str) -> bool {
        false
    }
    fn assign_port(&mut self, _port_name: String) {}
    fn configured_port(&self) -> Option<String> {
        None
    }
}

pub struct Station {
    pub settings: StationSettings,
    readings: Mutex<ReadingsFifo>,
    sensors: Mutex<Vec<Sensor>>,
    backend: Mutex<Option<Box<dyn Backend>>>,
    started: AtomicBool,
    stop: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Station {
    pub fn new(
        settings: StationSettings,
        sensors: Vec<Sensor>,
        location: &LocationConfig,
    ) -> Result<Arc<Station>> {
        let backend = build_backend(&settings, location)?;
        Ok(Self::from_parts(settings, sensors, backend))
    }

    pub(crate) fn from_parts(
        settings: StationSettings,
        sensors: Vec<Sensor>,
        backend: Box<dyn Backend>,
    ) -> Arc<Station> {
        // Fifo depth: the largest history any bound sensor needs, with the
        // station's own nreadings key as an extra floor.
        let capacity = sensors
            .iter()
            .map(|sensor| sensor.settings.nreadings())
            .max()
            .unwrap_or(1)
            .max(settings.nreadings)
            .max(1);
        Arc::new(Station {
            readings: Mutex::new(ReadingsFifo::new(capacity)),
            sensors: Mutex::new(sensors),
            backend: Mutex::new(Some(backend)),
            started: AtomicBool::new(false),
            stop: CancellationToken::new(),
            settings,
        })
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn fifo_capacity(&self) -> usize {
        lock(&self.readings).capacity()
    }

    /// Idempotent: the acquisition loop is spawned at most once.
    pub fn start(self: &Arc<Self>, db: Option<Db>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let station = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(station.settings.interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = station.stop.cancelled() => break,
                    _ = ticker.tick() => station.tick(db.as_ref()).await,
                }
            }
            tracing::info!(station = %station.name(), "acquisition loop stopped");
        });
    }

    /// Cooperative: observed at the top of the loop. Transports are opened
    /// per tick, so no port stays held across the shutdown.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    async fn tick(&self, db: Option<&Db>) {
        let Some(mut backend) = lock(&self.backend).take() else {
            return;
        };
        let outcome = match tokio::task::spawn_blocking(move || {
            let outcome = backend.fetch();
            (backend, outcome)
        })
        .await
        {
            Ok((backend, outcome)) => {
                let persists = backend.persists();
                *lock(&self.backend) = Some(backend);
                outcome.map(|reading| (reading, persists))
            }
            Err(err) => {
                tracing::error!(station = %self.name(), error = %err, "acquisition task panicked");
                self.evaluate_sensors();
                return;
            }
        };

        match outcome {
            Ok((reading, persists)) => {
                lock(&self.readings).push(reading.clone());
                if persists {
                    if let Some(db) = db {
                        if let Err(err) = db.save_reading(self.name(), &reading).await {
                            tracing::warn!(
                                station = %self.name(),
                                error = %format!("{err:#}"),
                                "failed to persist reading"
                            );
                        }
                    }
                }
            }
            Err(err) => {
                tracing::warn!(
                    station = %self.name(),
                    error = %format!("{err:#}"),
                    "acquisition tick failed"
                );
            }
        }

        self.evaluate_sensors();
    }

    /// Recompute the verdict of every enabled sensor bound to this station.
    /// Runs in the station task after each tick; the only writer of the
    /// sensors' mutable state.
    pub(crate) fn evaluate_sensors(&self) {
        let now = Instant::now();
        let hour = chrono::Local::now().hour();
        let readings = lock(&self.readings);
        let mut sensors = lock(&self.sensors);
        for sensor in sensors.iter_mut().filter(|s| s.settings.enabled) {
            let kind = sensor.settings.kind.clone();
            let datum = sensor.settings.datum.clone();
            match kind {
                SensorKind::MinMax { nreadings, .. } => {
                    match readings.latest(&datum, nreadings.max(1)) {
                        Ok(values) => {
                            let values: Vec<f64> =
                                values.iter().map(DatumValue::as_f64).collect();
                            sensor.evaluate_min_max(&values, now);
                        }
                        Err(FifoError::NotEnough { available, wanted }) => {
                            sensor.evaluate_unavailable(available, wanted);
                        }
                    }
                }
                SensorKind::SunElevation { .. } => match readings.latest(&datum, 1) {
                    Ok(values) => sensor.evaluate_sun(values[0].as_f64(), hour),
                    Err(FifoError::NotEnough { available, wanted }) => {
                        sensor.evaluate_unavailable(available, wanted);
                    }
                },
                SensorKind::HumanIntervention { file } => {
                    let intervention = HumanIntervention::new(file);
                    let asserted = intervention.is_asserted();
                    let record = if asserted { intervention.record() } else { None };
                    sensor.evaluate_intervention(asserted, record);
                }
            }
        }
    }

    pub fn latest_readings(&self, datum: &str, n: usize) -> Result<Vec<DatumValue>, FifoError> {
        lock(&self.readings).latest(datum, n)
    }

    pub fn snapshot_readings(&self) -> Vec<Reading> {
        lock(&self.readings).snapshot()
    }

    pub fn sensors_snapshot(&self) -> Vec<Sensor> {
        lock(&self.sensors).clone()
    }

    pub fn datums(&self) -> &'static [&'static str] {
        self.settings.model.datums()
    }

    pub fn is_serial(&self) -> bool {
        matches!(self.settings.transport, Transport::Serial { .. })
    }

    pub(crate) fn configured_serial_port(&self) -> Option<String> {
        lock(&self.backend)
            .as_ref()
            .and_then(|backend| backend.configured_port())
    }

    pub(crate) fn probe_serial_port(&self, port_name: &str) -> bool {
        lock(&self.backend)
            .as_ref()
            .map(|backend| backend.probe_port(port_name))
            .unwrap_or(false)
    }

    pub(crate) fn assign_serial_port(&self, port_name: String) {
        if let Some(backend) = lock(&self.backend).as_mut() {
            backend.assign_port(port_name);
        }
    }

    #[cfg(test)]
    pub(crate) fn push_reading(&self, reading: Reading) {
        lock(&self.readings).push(reading);
    }
}

fn build_backend(
    settings: &StationSettings,
    location: &LocationConfig,
) -> Result<Box<dyn Backend>> {
    let backend: Box<dyn Backend> = match (settings.model, &settings.transport) {
        (
            StationModel::VantagePro,
            Transport::Serial {
                interface,
                baud,
                timeout_seconds,
            },
        ) => Box::new(vantage::VantageBackend::new(
            interface.clone(),
            *baud,
            Duration::from_secs_f64(*timeout_seconds),
        )),
        (
            StationModel::InsideArduino,
            Transport::Serial {
                interface,
                baud,
                timeout_seconds,
            },
        ) => Box::new(arduino::ArduinoBackend::inside(
            interface.clone(),
            *baud,
            Duration::from_secs_f64(*timeout_seconds),
        )),
        (
            StationModel::OutsideArduino,
            Transport::Serial {
                interface,
                baud,
                timeout_seconds,
            },
        ) => Box::new(arduino::ArduinoBackend::outside(
            interface.clone(),
            *baud,
            Duration::from_secs_f64(*timeout_seconds),
        )),
        (StationModel::Cyclope, Transport::Ip { host, port, .. }) => Box::new(
            cyclope::CyclopeBackend::new(host.clone(), *port, IP_TIMEOUT),
        ),
        (
            StationModel::Tessw,
            Transport::Ip {
                host,
                port,
                ssid,
                wifi_interface,
            },
        ) => Box::new(tessw::TesswBackend::new(
            host.clone(),
            *port,
            ssid.clone(),
            wifi_interface.clone(),
            IP_TIMEOUT,
        )),
        (
            StationModel::Internal,
            Transport::Internal {
                human_intervention_file,
            },
        ) => Box::new(internal::InternalBackend::new(
            location,
            human_intervention_file.clone(),
        )),
        (model, _) => bail!(
            "station '{}': model {model:?} does not match its transport",
            settings.name
        ),
    };
    Ok(backend)
}

/// Read bytes until a newline, the length cap, EOF or a timeout. Partial
/// lines are returned rather than discarded so probes can inspect them.
pub(crate) fn read_line<R: io::Read + ?Sized>(reader: &mut R, max_len: usize) -> io::Result<String> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    while buf.len() < max_len {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                buf.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::TimedOut => break,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::io::{self, Read, Write};

    /// In-memory peer with a scripted reply stream.
    pub(crate) struct ScriptedPort {
        pub(crate) replies: io::Cursor<Vec<u8>>,
        pub(crate) written: Vec<u8>,
    }

    impl ScriptedPort {
        pub(crate) fn new(replies: impl Into<Vec<u8>>) -> Self {
            Self {
                replies: io::Cursor::new(replies.into()),
                written: Vec::new(),
            }
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.replies.read(buf)
        }
    }

    impl Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
