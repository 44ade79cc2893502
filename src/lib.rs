//! Attrition analysis for a two-wave household survey panel.
//!
//! Stages are plain functions over immutable [`table::Table`] values:
//! load → clean → derive flags → join → bucketize → cross-tabulate/test.
//! [`pipeline::run`] composes them for the baseline/follow-up case.

pub mod bucket;
pub mod clean;
pub mod config;
pub mod error;
pub mod flags;
pub mod join;
pub mod pipeline;
pub mod stats;
pub mod table;

pub use error::{DuplicateKeyWarning, PanelError, Result};
pub use table::{Labeled, Table, ValueLabels};
