//! Davis VantagePro weather console over a serial line.
//!
//! Wire protocol per tick: wake the console (`\n` answered by LF CR, up to
//! three attempts), then `LOOP 1\n` answered by one ACK byte and a 99-byte
//! LOOP frame. Detection probe: wakeup followed by `TEST\n`, answered by a
//! `\rTEST\n` line.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::io::{Read, Write};
use std::time::Duration;

use super::{read_line, Backend};
use crate::parser::loop_packet::{self, LOOP_PACKET_LEN};
use crate::reading::Reading;

const WAKEUP_ATTEMPTS: usize = 3;
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct VantageBackend {
    port_name: Option<String>,
    baud: u32,
    timeout: Duration,
}

impl VantageBackend {
    pub fn new(port_name: Option<String>, baud: u32, timeout: Duration) -> Self {
        Self {
            port_name,
            baud,
            timeout,
        }
    }
}

impl Backend for VantageBackend {
    fn datums(&self) -> &'static [&'static str] {
        loop_packet::DATUMS
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
        wakeup(&mut *port)?;
        fetch_loop_packet(&mut *port)
    }

    fn persists(&self) -> bool {
        true
    }

    fn probe_port(&self, port_name: &str) -> bool {
        let Ok(mut port) = serialport::new(port_name, self.baud)
            .timeout(PROBE_TIMEOUT)
            .open()
        else {
            return false;
        };
        if wakeup(&mut *port).is_err() {
            return false;
        }
        let _ = port.clear(serialport::ClearBuffer::Input);
        probe_handshake(&mut *port)
    }

    fn assign_port(&mut self, port_name: String) {
        self.port_name = Some(port_name);
    }

    fn configured_port(&self) -> Option<String> {
        self.port_name.clone()
    }
}

/// Send a bare newline until the console answers with LF CR.
fn wakeup<P: Read + Write + ?Sized>(port: &mut P) -> Result<()> {
    for _ in 0..WAKEUP_ATTEMPTS {
        port.write_all(b"\n").context("failed to send wakeup")?;
        let mut reply = [0u8; 2];
        if port.read_exact(&mut reply).is_ok() && reply == [0x0a, 0x0d] {
            return Ok(());
        }
    }
    bail!("console did not acknowledge wakeup");
}

fn fetch_loop_packet<P: Read + Write + ?Sized>(port: &mut P) -> Result<Reading> {
    port.write_all(b"LOOP 1\n")
        .context("failed to send 'LOOP 1'")?;
    let mut ack = [0u8; 1];
    port.read_exact(&mut ack).context("no ACK after 'LOOP 1'")?;
    let mut frame = [0u8; LOOP_PACKET_LEN];
    port.read_exact(&mut frame)
        .context("short read of the LOOP frame")?;
    Ok(loop_packet::parse(&frame, Utc::now())?)
}

/// `TEST\n` is answered by a blank line and then `\rTEST\n`.
fn probe_handshake<P: Read + Write + ?Sized>(port: &mut P) -> bool {
    if port.write_all(b"TEST\n").is_err() {
        return false;
    }
    for _ in 0..3 {
        match read_line(port, 64) {
            Ok(line) if line == "\rTEST\n" => return true,
            Ok(line) if line.is_empty() => return false,
            Ok(_) => continue,
            Err(_) => return false,
        }
    }
    false
}
