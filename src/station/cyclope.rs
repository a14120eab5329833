//! Cyclope seeing monitor over its TCP text protocol.
//!
//! The server greets with a `200` line. Commands are `SysRequest <GetData>`
//! and `SysRequest <SysStatus>`; successful replies begin with `201\n` and
//! carry `<Key=Value>` fields.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::Backend;
use crate::reading::{DatumValue, Reading};

pub const DATUMS: &[&str] = &["seeing_zenith", "r0"];

pub struct CyclopeBackend {
    host: String,
    port: u16,
    timeout: Duration,
}

impl CyclopeBackend {
    pub fn new(host: String, port: u16, timeout: Duration) -> Self {
        Self {
            host,
            port,
            timeout,
        }
    }
}

impl Backend for CyclopeBackend {
    fn datums(&self) -> &'static [&'static str] {
        DATUMS
    }

    fn fetch(&mut self) -> Result<Reading> {
        let address = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("cannot resolve {}:{}", self.host, self.port))?
            .next()
            .with_context(|| format!("no address for {}:{}", self.host, self.port))?;
        let mut stream = TcpStream::connect_timeout(&address, self.timeout)
            .with_context(|| format!("failed to connect to {address}"))?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        exchange(&mut stream)
    }
}

fn exchange<S: Read + Write>(stream: &mut S) -> Result<Reading> {
    let greeting = read_chunk(stream)?;
    if !greeting.starts_with("200") {
        bail!(
            "expected a 200 greeting, got {:?}",
            greeting.lines().next().unwrap_or_default()
        );
    }

    let data = command(stream, "SysRequest <GetData>")?;
    let fields = parse_fields(&data);
    if fields.get("IS_Valid").map(String::as_str) == Some("False") {
        bail!("monitor reports no valid measurement");
    }
    let seeing = field_f64(&fields, "Last_ZenithArcsec")?;
    // The device spells the Fried-parameter key 'Arcsed'.
    let r0 = field_f64(&fields, "Last_R0Arcsed")?;

    let status = command(stream, "SysRequest <SysStatus>")?;
    if let Some(state) = parse_fields(&status).get("State") {
        tracing::debug!(state = %state, "cyclope status");
    }

    let mut reading = Reading::new(Utc::now());
    reading.set("seeing_zenith", DatumValue::Float(seeing));
    reading.set("r0", DatumValue::Float(r0));
    Ok(reading)
}

fn command<S: Read + Write>(stream: &mut S, request: &str) -> Result<String> {
    stream
        .write_all(request.as_bytes())
        .with_context(|| format!("failed to send '{request}'"))?;
    let response = read_chunk(stream)?;
    let Some(body) = response.strip_prefix("201\n") else {
        bail!(
            "sent '{request}', expected a 201 reply, got {:?}",
            response.lines().next().unwrap_or_default()
        );
    };
    Ok(body.to_string())
}

fn read_chunk<S: Read>(stream: &mut S) -> Result<String> {
    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf).context("read failed")?;
    if n == 0 {
        bail!("connection closed by peer");
    }
    Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
}

/// Collect `<Key=Value>` fields from a reply body.
fn parse_fields(body: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    let mut rest = body;
    while let Some(open) = rest.find('<') {
        let Some(close) = rest[open..].find('>') else {
            break;
        };
        let segment = &rest[open + 1..open + close];
        if let Some((key, value)) = segment.split_once('=') {
            fields.insert(key.trim().to_string(), value.trim().to_string());
        }
        rest = &rest[open + close + 1..];
    }
    fields
}

fn field_f64(fields: &BTreeMap<String, String>, key: &str) -> Result<f64> {
    fields
        .get(key)
        .with_context(|| format!("reply is missing <{key}=...>"))?
        .parse::<f64>()
        .with_context(|| format!("<{key}> is not a number"))
}
