//! TessW sky-quality sensor behind its own WiFi access point.
//!
//! The sensor serves a single web page. Because it lives on its own SSID,
//! every tick first guards the association of the local wireless interface:
//! bring the interface up if it is down, re-associate if it drifted to
//! another network. Either step failing aborts the tick.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::process::Command;
use std::time::Duration;

use super::Backend;
use crate::parser::tessw as decoder;
use crate::reading::{DatumValue, Reading};

pub const DATUMS: &[&str] = &[
    "cover",
    "sky_temperature",
    "ambient_temperature",
    "magnitude",
    "frequency",
];

pub struct TesswBackend {
    host: String,
    port: u16,
    ssid: Option<String>,
    wifi_interface: Option<String>,
    timeout: Duration,
}

impl TesswBackend {
    pub fn new(
        host: String,
        port: u16,
        ssid: Option<String>,
        wifi_interface: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            host,
            port,
            ssid,
            wifi_interface,
            timeout,
        }
    }
}

impl Backend for TesswBackend {
    fn datums(&self) -> &'static [&'static str] {
        DATUMS
    }

    fn fetch(&mut self) -> Result<Reading> {
        if let Some(interface) = &self.wifi_interface {
            ensure_wifi(interface, self.ssid.as_deref())?;
        }

        let url = format!("http://{}:{}/", self.host, self.port);
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .context("failed to build the HTTP client")?;
        let body = client
            .get(&url)
            .send()
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {url} returned an error status"))?
            .text()
            .context("failed to read the device page")?;

        let report = decoder::parse(&body)?;
        let mut reading = Reading::new(Utc::now());
        reading.set("cover", DatumValue::Float(report.cover()));
        reading.set("sky_temperature", DatumValue::Float(report.sky_temperature));
        reading.set(
            "ambient_temperature",
            DatumValue::Float(report.ambient_temperature),
        );
        reading.set("magnitude", DatumValue::Float(report.magnitude));
        reading.set("frequency", DatumValue::Float(report.frequency));
        Ok(reading)
    }
}

fn ensure_wifi(interface: &str, expected_ssid: Option<&str>) -> Result<()> {
    let operstate = std::fs::read_to_string(format!("/sys/class/net/{interface}/operstate"))
        .unwrap_or_default();
    if operstate.trim() != "up" {
        run_checked(Command::new("ip").args(["link", "set", interface, "up"]))
            .with_context(|| format!("failed to bring up {interface}"))?;
    }

    let Some(expected) = expected_ssid else {
        return Ok(());
    };
    let current = Command::new("iwgetid")
        .args(["-r", interface])
        .output()
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .unwrap_or_default();
    if current != expected {
        run_checked(Command::new("nmcli").args([
            "device",
            "wifi",
            "connect",
            expected,
            "ifname",
            interface,
        ]))
        .with_context(|| format!("failed to associate {interface} with '{expected}'"))?;
    }
    Ok(())
}

fn run_checked(command: &mut Command) -> Result<()> {
    let status = command
        .status()
        .with_context(|| format!("failed to spawn {command:?}"))?;
    if !status.success() {
        bail!("{command:?} exited with {status}");
    }
    Ok(())
}
