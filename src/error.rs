use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by panelwave.
#[derive(Error, Debug)]
pub enum PanelError {
    /// A source file could not be parsed into a rectangular table.
    #[error("Failed to parse {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    /// A named column (join key, flag field, factor) is not in the table.
    #[error("Column `{column}` not found in table `{table}`")]
    MissingColumn { table: String, column: String },

    /// A contingency table cannot be tested (zero marginal, too small).
    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    /// A value fell outside the bucket range and the policy forbids it.
    #[error("Value {value} is outside bucket range [{lower}, {upper}]")]
    OutOfRange { value: f64, lower: f64, upper: f64 },

    /// Breakpoints or labels do not describe a valid set of buckets.
    #[error("Invalid buckets: {0}")]
    InvalidBuckets(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PanelError {
    pub fn format(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        PanelError::Format {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn missing_column(table: &str, column: &str) -> Self {
        PanelError::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PanelError>;

/// Non-fatal: a key column holds repeated values, so joins on it fan out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateKeyWarning {
    pub table: String,
    pub column: String,
    pub keys: Vec<String>,
}

impl fmt::Display for DuplicateKeyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const SHOWN: usize = 5;
        let sample: Vec<&str> = self.keys.iter().take(SHOWN).map(String::as_str).collect();
        write!(
            f,
            "{} duplicate value(s) in `{}`.`{}`: {}",
            self.keys.len(),
            self.table,
            self.column,
            sample.join(", ")
        )?;
        if self.keys.len() > SHOWN {
            write!(f, ", ...")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_missing_column() {
        let err = PanelError::missing_column("baseline", "caseid");
        assert_eq!(err.to_string(), "Column `caseid` not found in table `baseline`");
    }

    #[test]
    fn test_error_display_format() {
        let err = PanelError::format("/data/pre.sav", "unknown extension");
        let msg = err.to_string();
        assert!(msg.contains("/data/pre.sav"));
        assert!(msg.contains("unknown extension"));
    }

    #[test]
    fn test_error_display_out_of_range() {
        let err = PanelError::OutOfRange {
            value: 17.0,
            lower: 18.0,
            upper: f64::INFINITY,
        };
        assert_eq!(err.to_string(), "Value 17 is outside bucket range [18, inf]");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PanelError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_duplicate_warning_truncates_sample() {
        let warning = DuplicateKeyWarning {
            table: "followup".into(),
            column: "caseid".into(),
            keys: (1..=7).map(|k| k.to_string()).collect(),
        };
        assert_eq!(
            warning.to_string(),
            "7 duplicate value(s) in `followup`.`caseid`: 1, 2, 3, 4, 5, ..."
        );
    }
}
