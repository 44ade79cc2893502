// src/config.rs

use crate::bucket::OutOfRange;
use crate::error::{PanelError, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};
use tracing::debug;

/// Column names, exclusions and test settings for one panel run.
///
/// Every field has a default, so a YAML file only needs what differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub baseline: PathBuf,
    pub followup: PathBuf,
    /// Respondent identifier shared by both waves.
    pub id_column: String,
    pub outcome_column: String,
    /// Baseline outcomes (values or labels) removed before joining.
    pub excluded_outcomes: Vec<String>,
    /// Follow-up fields that must all be present for a reinterview.
    pub timestamp_fields: Vec<String>,
    /// Parse text timestamps into typed columns before deriving flags.
    pub coerce_timestamps: bool,
    pub age_column: String,
    pub age_group_column: String,
    pub age_below_range: OutOfRange,
    /// Columns tested against reinterview status.
    pub factors: Vec<String>,
    pub alpha: f64,
    pub yates: bool,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            baseline: PathBuf::from("data/baseline.csv"),
            followup: PathBuf::from("data/followup.csv"),
            id_column: "caseid".into(),
            outcome_column: "outcome".into(),
            excluded_outcomes: vec!["Incomplete (callback)".into()],
            timestamp_fields: vec!["start".into(), "end".into(), "submissiondate".into()],
            coerce_timestamps: false,
            age_column: "age".into(),
            age_group_column: "age_group".into(),
            age_below_range: OutOfRange::Undefined,
            factors: vec![
                "sex".into(),
                "age_group".into(),
                "electricity".into(),
                "water_source".into(),
                "urban_rural".into(),
                "hh_size".into(),
            ],
            alpha: 0.05,
            yates: false,
        }
    }
}

impl PanelConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: PanelConfig = serde_yaml::from_str(&text)?;
        config.validate()?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(PanelError::Config(format!(
                "alpha must be in (0, 1), got {}",
                self.alpha
            )));
        }
        if self.id_column.trim().is_empty() {
            return Err(PanelError::Config("id_column is empty".into()));
        }
        if self.timestamp_fields.is_empty() {
            return Err(PanelError::Config("timestamp_fields is empty".into()));
        }
        if self.age_column.trim().is_empty() || self.age_group_column.trim().is_empty() {
            return Err(PanelError::Config("age columns must be named".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_partial_yaml_keeps_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("panel.yaml");
        fs::write(
            &path,
            "id_column: hhid\nalpha: 0.01\nfactors: [sex, age_group]\nage_below_range: error\n",
        )?;
        let cfg = PanelConfig::from_file(&path)?;
        assert_eq!(cfg.id_column, "hhid");
        assert_eq!(cfg.alpha, 0.01);
        assert_eq!(cfg.factors, vec!["sex", "age_group"]);
        assert_eq!(cfg.age_below_range, OutOfRange::Error);
        assert_eq!(cfg.outcome_column, "outcome");
        assert_eq!(cfg.timestamp_fields.len(), 3);
        Ok(())
    }

    #[test]
    fn test_invalid_alpha_rejected() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("panel.yaml");
        fs::write(&path, "alpha: 1.5\n")?;
        let err = PanelConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, PanelError::Config(_)));
        Ok(())
    }

    #[test]
    fn test_empty_timestamp_fields_rejected() {
        let cfg = PanelConfig {
            timestamp_fields: vec![],
            ..PanelConfig::default()
        };
        assert!(cfg.validate().is_err());
        assert!(PanelConfig::default().validate().is_ok());
    }
}
