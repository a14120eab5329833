use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// One acquisition snapshot: every datum a station produced in a single tick.
///
/// The timestamp is taken when the acquisition completes, not when the reading
/// is handed to persistence or served over HTTP.
#[derive(Debug, Clone)]
pub struct Reading {
    pub tstamp: DateTime<Utc>,
    pub datums: BTreeMap<String, DatumValue>,
}

impl Reading {
    pub fn new(tstamp: DateTime<Utc>) -> Self {
        Self {
            tstamp,
            datums: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, name: &str, value: DatumValue) {
        self.datums.insert(name.to_string(), value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DatumValue {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl DatumValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            DatumValue::Int(v) => *v as f64,
            DatumValue::Float(v) => *v,
            DatumValue::Bool(v) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}
