//! File-backed operator override.
//!
//! Presence of the file is authoritative: while it exists every project's
//! aggregate verdict is unsafe. The JSON body (`tstamp`, `reason`) is
//! advisory and surfaced in the unsafe reason when readable.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionRecord {
    pub tstamp: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct HumanIntervention {
    path: PathBuf,
}

impl HumanIntervention {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_asserted(&self) -> bool {
        self.path.exists()
    }

    pub fn assert_with_reason(&self, reason: &str) -> Result<InterventionRecord> {
        let record = InterventionRecord {
            tstamp: Utc::now(),
            reason: reason.to_string(),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.display())
            })?;
        }
        let body = serde_json::to_string_pretty(&record)?;
        std::fs::write(&self.path, body)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(record)
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove {}", self.path.display()))
            }
        }
    }

    /// Advisory record from the file body, if present and parseable.
    pub fn record(&self) -> Option<InterventionRecord> {
        let body = std::fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&body).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assert_then_clear_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let intervention = HumanIntervention::new(dir.path().join("human_intervention.json"));

        assert!(!intervention.is_asserted());
        intervention.assert_with_reason("dome maintenance")?;
        assert!(intervention.is_asserted());

        let record = intervention.record().expect("record");
        assert_eq!(record.reason, "dome maintenance");

        intervention.clear()?;
        assert!(!intervention.is_asserted());
        Ok(())
    }

    #[test]
    fn clearing_an_absent_file_is_not_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let intervention = HumanIntervention::new(dir.path().join("missing.json"));
        intervention.clear()?;
        Ok(())
    }

    #[test]
    fn presence_alone_is_authoritative() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("override.json");
        std::fs::write(&path, "not json at all")?;

        let intervention = HumanIntervention::new(&path);
        assert!(intervention.is_asserted());
        assert!(intervention.record().is_none());
        Ok(())
    }
}
