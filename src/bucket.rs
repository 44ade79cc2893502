// src/bucket.rs

use crate::error::{PanelError, Result};
use crate::table::{Table, ValueLabels};
use arrow::array::Int64Array;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// What to do with a value outside the first or last breakpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfRange {
    /// Leave the bucket null; the count is logged.
    #[default]
    Undefined,
    /// Put the value in the nearest end bucket.
    Clamp,
    /// Fail with `PanelError::OutOfRange`.
    Error,
}

/// Fixed breakpoints mapping a numeric value to an ordered, 1-based bucket.
///
/// Buckets are `[b[i], b[i+1])`, or `(b[i], b[i+1]]` when right-inclusive.
/// A final breakpoint of `+∞` makes the last bucket open-ended.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucketizer {
    breakpoints: Vec<f64>,
    labels: Vec<String>,
    right_inclusive: bool,
    below: OutOfRange,
    above: OutOfRange,
}

impl Bucketizer {
    pub fn new<S: Into<String>>(
        breakpoints: Vec<f64>,
        labels: Vec<S>,
        right_inclusive: bool,
    ) -> Result<Self> {
        if breakpoints.len() < 2 {
            return Err(PanelError::InvalidBuckets(
                "need at least two breakpoints".into(),
            ));
        }
        if breakpoints.iter().any(|b| b.is_nan()) {
            return Err(PanelError::InvalidBuckets("breakpoint is NaN".into()));
        }
        if breakpoints.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PanelError::InvalidBuckets(format!(
                "breakpoints must be strictly increasing: {:?}",
                breakpoints
            )));
        }
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.len() != breakpoints.len() - 1 {
            return Err(PanelError::InvalidBuckets(format!(
                "{} breakpoints need {} labels, got {}",
                breakpoints.len(),
                breakpoints.len() - 1,
                labels.len()
            )));
        }
        Ok(Self {
            breakpoints,
            labels,
            right_inclusive,
            below: OutOfRange::default(),
            above: OutOfRange::default(),
        })
    }

    /// Adult age groups: 18-24, 25-34, 35-44, 45-54, 55-64, 65+.
    ///
    /// Ages under 18 fall below the first breakpoint and stay undefined.
    pub fn age_groups() -> Self {
        Self {
            breakpoints: vec![18.0, 25.0, 35.0, 45.0, 55.0, 65.0, f64::INFINITY],
            labels: ["18-24", "25-34", "35-44", "45-54", "55-64", "65+"]
                .into_iter()
                .map(String::from)
                .collect(),
            right_inclusive: false,
            below: OutOfRange::Undefined,
            above: OutOfRange::Undefined,
        }
    }

    pub fn with_below(mut self, policy: OutOfRange) -> Self {
        self.below = policy;
        self
    }

    pub fn with_above(mut self, policy: OutOfRange) -> Self {
        self.above = policy;
        self
    }

    pub fn breakpoints(&self) -> &[f64] {
        &self.breakpoints
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Bucket codes (1-based) → labels.
    pub fn value_labels(&self) -> ValueLabels {
        self.labels
            .iter()
            .enumerate()
            .map(|(i, l)| (i as i64 + 1, l.clone()))
            .collect()
    }

    /// 1-based bucket of `value`, or `None` when undefined.
    pub fn bucket_of(&self, value: f64) -> Result<Option<usize>> {
        if value.is_nan() {
            return Ok(None);
        }
        let lower = self.breakpoints[0];
        let upper = self.breakpoints[self.breakpoints.len() - 1];

        // an infinite end is open: nothing lies beyond it
        let (is_below, is_above) = if self.right_inclusive {
            (value <= lower && lower.is_finite(), value > upper)
        } else {
            (value < lower, value >= upper && upper.is_finite())
        };

        if is_below || is_above {
            let (policy, end) = if is_below {
                (self.below, 1)
            } else {
                (self.above, self.len())
            };
            return match policy {
                OutOfRange::Undefined => Ok(None),
                OutOfRange::Clamp => Ok(Some(end)),
                OutOfRange::Error => Err(PanelError::OutOfRange {
                    value,
                    lower,
                    upper,
                }),
            };
        }

        let idx = if self.right_inclusive {
            self.breakpoints.partition_point(|b| *b < value)
        } else {
            self.breakpoints.partition_point(|b| *b <= value)
        };
        Ok(Some(idx.clamp(1, self.len())))
    }

    pub fn bucketize(&self, values: &[Option<f64>]) -> Result<Vec<Option<usize>>> {
        values
            .iter()
            .map(|v| match v {
                Some(x) => self.bucket_of(*x),
                None => Ok(None),
            })
            .collect()
    }
}

/// One-shot form: build a bucketizer with default policies and apply it.
pub fn bucketize<S: Into<String>>(
    values: &[Option<f64>],
    breakpoints: Vec<f64>,
    labels: Vec<S>,
    right_inclusive: bool,
) -> Result<Vec<Option<usize>>> {
    Bucketizer::new(breakpoints, labels, right_inclusive)?.bucketize(values)
}

/// Add `target` as a labeled Int64 bucket-code column derived from `source`.
pub fn bucketize_column(
    table: &Table,
    source: &str,
    target: &str,
    bucketizer: &Bucketizer,
) -> Result<Table> {
    let values = table.numeric(source)?;
    let buckets = bucketizer.bucketize(&values)?;

    let undefined = values
        .iter()
        .zip(&buckets)
        .filter(|(v, b)| v.is_some() && b.is_none())
        .count();
    if undefined > 0 {
        warn!(
            table = table.name(),
            column = source,
            undefined,
            "values outside bucket range left undefined"
        );
    }
    info!(
        table = table.name(),
        source,
        target,
        buckets = bucketizer.len(),
        "bucketized"
    );

    let codes: Int64Array = buckets.iter().map(|b| b.map(|i| i as i64)).collect();
    table.with_column(target, Arc::new(codes), Some(bucketizer.value_labels()))
}
