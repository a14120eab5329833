//! Davis VantagePro LOOP telemetry frame decoder.
//!
//! A LOOP frame is exactly 99 bytes: the `LOO` identifier, fixed-offset
//! little-endian fields, and a CRC-16/XMODEM trailer. The CRC (polynomial
//! 0x1021, zero init, no reflection, no final xor) is computed over all 99
//! bytes and must come out zero for the frame to be accepted.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::reading::{DatumValue, Reading};

pub const LOOP_PACKET_LEN: usize = 99;

/// Datums a VantagePro console reports, named per the Davis serial protocol
/// (lower-cased, spaces replaced by underscores).
pub const DATUMS: &[&str] = &[
    "barometer",
    "inside_temperature",
    "inside_humidity",
    "outside_temperature",
    "wind_speed",
    "wind_direction",
    "outside_humidity",
    "rain_rate",
    "uv",
    "solar_radiation",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoopError {
    #[error("expected a {LOOP_PACKET_LEN}-byte LOOP frame, got {0} bytes")]
    BadLength(usize),
    #[error("frame does not carry the LOO identifier")]
    BadIdentifier,
    #[error("LOOP frame failed the CRC check")]
    BadCrc,
}

const fn build_crc_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut index = 0;
    while index < 256 {
        let mut crc = (index as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[index] = crc;
        index += 1;
    }
    table
}

const CRC_TABLE: [u16; 256] = build_crc_table();

/// Running CRC-16/XMODEM. Over a frame with its trailer included the result
/// is zero iff the frame is intact.
pub fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc = CRC_TABLE[(((crc >> 8) ^ byte as u16) & 0xff) as usize] ^ (crc << 8);
    }
    crc
}

pub fn parse(packet: &[u8], tstamp: DateTime<Utc>) -> Result<Reading, LoopError> {
    if packet.len() != LOOP_PACKET_LEN {
        return Err(LoopError::BadLength(packet.len()));
    }
    if &packet[0..3] != b"LOO" {
        return Err(LoopError::BadIdentifier);
    }
    if crc16_xmodem(packet) != 0 {
        return Err(LoopError::BadCrc);
    }

    let mut reading = Reading::new(tstamp);
    // Raw barometer is thousandths of inHg; x0.0338639 lands on millibar scale.
    reading.set(
        "barometer",
        DatumValue::Float(u16_le(packet, 7) as f64 * 0.0338639),
    );
    reading.set(
        "inside_temperature",
        DatumValue::Float(fahrenheit_to_celsius(u16_le(packet, 9) as f64 / 10.0)),
    );
    reading.set("inside_humidity", DatumValue::Int(packet[11] as i64));
    reading.set(
        "outside_temperature",
        DatumValue::Float(fahrenheit_to_celsius(u16_le(packet, 12) as f64 / 10.0)),
    );
    reading.set(
        "wind_speed",
        DatumValue::Float(mph_to_kph(packet[14] as f64)),
    );
    reading.set("wind_direction", DatumValue::Int(u16_le(packet, 16) as i64));
    reading.set("outside_humidity", DatumValue::Int(packet[33] as i64));
    // Rain-rate counter ticks are 0.01 inch/hour.
    reading.set("rain_rate", DatumValue::Float(packet[41] as f64 * 0.254));
    reading.set("uv", DatumValue::Int(packet[43] as i64));
    reading.set(
        "solar_radiation",
        DatumValue::Int(u16_le(packet, 44) as i64),
    );
    Ok(reading)
}

fn u16_le(packet: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([packet[offset], packet[offset + 1]])
}

fn fahrenheit_to_celsius(degrees_f: f64) -> f64 {
    (degrees_f - 32.0) * (5.0 / 9.0)
}

fn mph_to_kph(speed_mph: f64) -> f64 {
    speed_mph * 1.60934
}
