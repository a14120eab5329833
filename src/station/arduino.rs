//! Query-driven weather Arduinos (indoor and outdoor sketches).
//!
//! Each datum group is fetched with a `<name>?\r\n` query; the sketch needs a
//! short settle delay before its one-line reply, which is decoded by the text
//! template parser. Detection probe: `id?\r` answered by a line naming the
//! sketch file.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::io::{Read, Write};
use std::time::Duration;

use super::{read_line, Backend};
use crate::parser::template::{self, Value};
use crate::reading::{DatumValue, Reading};

pub const INSIDE_SKETCH: &str = "Indoor_multiQuery";
pub const OUTSIDE_SKETCH: &str = "Outdoor_multiQuery";

pub const INSIDE_DATUMS: &[&str] = &[
    "temperature_in",
    "pressure_in",
    "visible_lux_in",
    "presence",
    "flame",
    "co2",
    "voc",
    "raw_h2",
    "raw_ethanol",
];

pub const OUTSIDE_DATUMS: &[&str] = &[
    "temperature_out",
    "humidity_out",
    "humidity_out_compensated",
    "dew_point",
    "pressure_out",
    "visible_lux_out",
    "ir_luminosity",
    "wind_speed",
    "wind_direction",
];

struct Query {
    name: &'static str,
    settle: Duration,
    template: &'static str,
    datums: &'static [&'static str],
}

const INSIDE_QUERIES: &[Query] = &[
    Query {
        name: "pressure",
        settle: Duration::from_millis(100),
        template: "Pressure: {f} hPa",
        datums: &["pressure_in"],
    },
    Query {
        name: "temp",
        settle: Duration::from_millis(100),
        template: "Temperature: {f}°C",
        datums: &["temperature_in"],
    },
    Query {
        name: "light",
        settle: Duration::from_millis(80),
        template: "light (Lux): {f}",
        datums: &["visible_lux_in"],
    },
    Query {
        name: "gas",
        settle: Duration::from_millis(70),
        template: "CO2: {i} ppm\tTVOC: {i} ppb\tRaw H2: {i} \tRaw Ethanol: {i}",
        datums: &["co2", "voc", "raw_h2", "raw_ethanol"],
    },
    Query {
        name: "flame",
        settle: Duration::from_millis(50),
        template: "IR reading: {i}",
        datums: &["flame"],
    },
    Query {
        name: "presence",
        settle: Duration::from_millis(50),
        template: "Presence: {i}",
        datums: &["presence"],
    },
];

const OUTSIDE_QUERIES: &[Query] = &[
    Query {
        name: "wind",
        settle: Duration::from_millis(50),
        template: "v={f} m/s  dir. {f}°",
        datums: &["wind_speed", "wind_direction"],
    },
    Query {
        name: "light",
        settle: Duration::from_millis(80),
        template: "TSL vis(Lux) IR(luminosity): {i} {i}",
        datums: &["visible_lux_out", "ir_luminosity"],
    },
    Query {
        name: "pht",
        settle: Duration::from_millis(80),
        template: "P:{f}hPa T:{f}°C RH:{f}% comp RH:{f}% dew point:{f}°C",
        datums: &[
            "pressure_out",
            "temperature_out",
            "humidity_out",
            "humidity_out_compensated",
            "dew_point",
        ],
    },
];

pub struct ArduinoBackend {
    sketch: &'static str,
    queries: &'static [Query],
    datums: &'static [&'static str],
    port_name: Option<String>,
    baud: u32,
    timeout: Duration,
}

impl ArduinoBackend {
    pub fn inside(port_name: Option<String>, baud: u32, timeout: Duration) -> Self {
        Self {
            sketch: INSIDE_SKETCH,
            queries: INSIDE_QUERIES,
            datums: INSIDE_DATUMS,
            port_name,
            baud,
            timeout,
        }
    }

    pub fn outside(port_name: Option<String>, baud: u32, timeout: Duration) -> Self {
        Self {
            sketch: OUTSIDE_SKETCH,
            queries: OUTSIDE_QUERIES,
            datums: OUTSIDE_DATUMS,
            port_name,
            baud,
            timeout,
        }
    }
}

impl Backend for ArduinoBackend {
    fn datums(&self) -> &'static [&'static str] {
        self.datums
    }

    fn fetch(&mut self) -> Result<Reading> {
        let port_name = self
            .port_name
            .as_deref()
            .context("no serial port assigned")?;
        let mut port = serialport::new(port_name, self.baud)
            .timeout(self.timeout)
            .open()
            .with_context(|| format!("failed to open serial port {port_name}"))?;

        let mut reading = Reading::new(Utc::now());
        for query in self.queries {
            let values = run_query(&mut *port, query)?;
            store(&mut reading, query, &values)?;
        }
        reading.tstamp = Utc::now();
        Ok(reading)
    }

    fn persists(&self) -> bool {
        true
    }

    fn probe_port(&self, port_name: &str) -> bool {
        let Ok(mut port) = serialport::new(port_name, self.baud)
            .timeout(self.timeout)
            .open()
        else {
            return false;
        };
        id_probe(&mut *port, self.sketch)
    }

    fn assign_port(&mut self, port_name: String) {
        self.port_name = Some(port_name);
    }

    fn configured_port(&self) -> Option<String> {
        self.port_name.clone()
    }
}

fn run_query<P: Read + Write + ?Sized>(port: &mut P, query: &Query) -> Result<Vec<Value>> {
    port.write_all(format!("{}?\r\n", query.name).as_bytes())
        .with_context(|| format!("failed to send '{}?'", query.name))?;
    std::thread::sleep(query.settle);

    let mut line = read_line(port, 256)?;
    // The sketch echoes the request before answering; skip that line.
    if line.trim_start().starts_with(&format!("{}?", query.name)) {
        line = read_line(port, 256)?;
    }

    template::parse(query.template, &line)
        .with_context(|| format!("reply to '{}?' did not parse: {line:?}", query.name))
}

fn store(reading: &mut Reading, query: &Query, values: &[Value]) -> Result<()> {
    if values.len() != query.datums.len() {
        bail!(
            "reply to '{}?' produced {} values, expected {}",
            query.name,
            values.len(),
            query.datums.len()
        );
    }
    for (datum, value) in query.datums.iter().zip(values) {
        match value {
            Value::Int(v) => reading.set(datum, DatumValue::Int(*v)),
            Value::Float(v) => reading.set(datum, DatumValue::Float(*v)),
            Value::Str(_) => {}
        }
    }
    Ok(())
}

fn id_probe<P: Read + Write + ?Sized>(port: &mut P, sketch: &str) -> bool {
    if port.write_all(b"id?\r").is_err() {
        return false;
    }
    std::thread::sleep(Duration::from_millis(50));
    for _ in 0..2 {
        match read_line(port, 128) {
            Ok(line) if line.contains(sketch) => return true,
            Ok(line) if line.is_empty() => return false,
            Ok(_) => continue,
            Err(_) => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::testutil::ScriptedPort;

    #[test]
    fn query_parses_a_reply_line() {
        let mut port = ScriptedPort::new(b"Pressure: 1007.32 hPa\r\n".to_vec());
        let values = run_query(&mut port, &INSIDE_QUERIES[0]).expect("query");
        assert_eq!(values, vec![Value::Float(1007.32)]);
        assert_eq!(port.written, b"pressure?\r\n");
    }

    #[test]
    fn query_drains_the_request_echo() {
        let mut port =
            ScriptedPort::new("wind?\r\nv=3.25 m/s  dir. 270.0°\n".as_bytes().to_vec());
        let values = run_query(&mut port, &OUTSIDE_QUERIES[0]).expect("query");
        assert_eq!(values, vec![Value::Float(3.25), Value::Float(270.0)]);
    }

    #[test]
    fn garbled_reply_fails_the_query() {
        let mut port = ScriptedPort::new(b"Pressure: n/a hPa\n".to_vec());
        assert!(run_query(&mut port, &INSIDE_QUERIES[0]).is_err());
    }

    #[test]
    fn gas_reply_maps_to_four_datums() {
        let mut port = ScriptedPort::new(
            b"CO2: 412 ppm\tTVOC: 9 ppb\tRaw H2: 13013 \tRaw Ethanol: 1755\r\n".to_vec(),
        );
        let query = &INSIDE_QUERIES[3];
        let values = run_query(&mut port, query).expect("query");
        let mut reading = Reading::new(chrono::Utc::now());
        store(&mut reading, query, &values).expect("store");
        assert_eq!(reading.datums["co2"], DatumValue::Int(412));
        assert_eq!(reading.datums["voc"], DatumValue::Int(9));
        assert_eq!(reading.datums["raw_h2"], DatumValue::Int(13013));
        assert_eq!(reading.datums["raw_ethanol"], DatumValue::Int(1755));
    }

    #[test]
    fn id_probe_matches_the_sketch_name() {
        let mut port = ScriptedPort::new(b"id?\rInfo: Indoor_multiQuery.ino v2\n".to_vec());
        assert!(id_probe(&mut port, INSIDE_SKETCH));
        assert_eq!(port.written, b"id?\r");

        let mut other = ScriptedPort::new(b"Info: Outdoor_multiQuery.ino\n".to_vec());
        assert!(!id_probe(&mut other, INSIDE_SKETCH));
    }
}
