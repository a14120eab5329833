//! TessW sky-quality sensor page decoder.
//!
//! The device serves a small HTML page whose `<h4>` paragraph carries the
//! sky temperature, ambient temperature, magnitude and frequency:
//! `T. IR : -12.3 ... T. Sens: 18.4 ... Mag. : 20.1 ... f : 48.0`.

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct TesswReport {
    pub sky_temperature: f64,
    pub ambient_temperature: f64,
    pub magnitude: f64,
    pub frequency: f64,
}

impl TesswReport {
    /// Cloud cover estimate in percent, clamped at zero. A sky much colder
    /// than the ambient sensor means clear sky.
    pub fn cover(&self) -> f64 {
        (100.0 - 3.0 * (self.ambient_temperature - self.sky_temperature)).max(0.0)
    }
}

#[derive(Debug, Error)]
pub enum TesswError {
    #[error("device page does not match the TessW report format")]
    NoMatch,
    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

pub fn parse(body: &str) -> Result<TesswReport, TesswError> {
    let pattern = Regex::new(
        r"(?s)T\.\s*IR\s*:\s*(-?\d+(?:\.\d+)?).*?T\.\s*Sens\s*:\s*(-?\d+(?:\.\d+)?).*?Mag\.\s*:\s*(-?\d+(?:\.\d+)?).*?f\s*:\s*(-?\d+(?:\.\d+)?)",
    )?;
    let captures = pattern.captures(body).ok_or(TesswError::NoMatch)?;

    let field = |index: usize| -> Result<f64, TesswError> {
        captures
            .get(index)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .ok_or(TesswError::NoMatch)
    };

    Ok(TesswReport {
        sky_temperature: field(1)?,
        ambient_temperature: field(2)?,
        magnitude: field(3)?,
        frequency: field(4)?,
    })
}
