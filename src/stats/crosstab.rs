use super::chi_square::{chi_square_independence, chi_square_independence_yates, ChiSquare};
use crate::error::{PanelError, Result};
use crate::table::{Category, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Which totals a percentage view divides by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Normalize {
    /// Each row sums to 100.
    Rows,
    /// Each column sums to 100.
    Columns,
    /// The whole table sums to 100.
    All,
}

/// Count matrix cross-tabulating two categorical variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contingency {
    pub row_variable: String,
    pub col_variable: String,
    pub row_labels: Vec<String>,
    pub col_labels: Vec<String>,
    pub counts: Vec<Vec<u64>>,
}

impl Contingency {
    /// Build from raw counts with positional labels. Rows must be equal length.
    pub fn from_counts(counts: Vec<Vec<u64>>) -> Result<Self> {
        let ncols = counts.first().map_or(0, Vec::len);
        if counts.iter().any(|r| r.len() != ncols) {
            return Err(PanelError::DegenerateInput(
                "contingency rows differ in length".into(),
            ));
        }
        Ok(Self {
            row_variable: "row".into(),
            col_variable: "column".into(),
            row_labels: (0..counts.len()).map(|i| i.to_string()).collect(),
            col_labels: (0..ncols).map(|j| j.to_string()).collect(),
            counts,
        })
    }

    pub fn nrows(&self) -> usize {
        self.row_labels.len()
    }

    pub fn ncols(&self) -> usize {
        self.col_labels.len()
    }

    pub fn row_totals(&self) -> Vec<u64> {
        self.counts.iter().map(|r| r.iter().sum()).collect()
    }

    pub fn col_totals(&self) -> Vec<u64> {
        (0..self.ncols())
            .map(|j| self.counts.iter().map(|r| r[j]).sum())
            .collect()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    /// Percentage view. A group whose total is zero shows zeros.
    pub fn percentages(&self, normalize: Normalize) -> Vec<Vec<f64>> {
        let rows = self.row_totals();
        let cols = self.col_totals();
        let total = self.total();
        let pct = |count: u64, denom: u64| {
            if denom == 0 {
                0.0
            } else {
                100.0 * count as f64 / denom as f64
            }
        };

        self.counts
            .iter()
            .enumerate()
            .map(|(i, row)| {
                row.iter()
                    .enumerate()
                    .map(|(j, &c)| match normalize {
                        Normalize::Rows => pct(c, rows[i]),
                        Normalize::Columns => pct(c, cols[j]),
                        Normalize::All => pct(c, total),
                    })
                    .collect()
            })
            .collect()
    }

    pub fn chi_square(&self) -> Result<ChiSquare> {
        chi_square_independence(&self.counts)
    }

    pub fn chi_square_yates(&self) -> Result<ChiSquare> {
        chi_square_independence_yates(&self.counts)
    }
}

/// Cross-tabulate two columns. Rows with a null in either column are skipped.
///
/// Categories are ordered by code for numeric/labeled columns and
/// lexicographically for text; labels are shown where they exist.
pub fn crosstab(table: &Table, row_column: &str, col_column: &str) -> Result<Contingency> {
    let row_cats = table.categories(row_column)?;
    let col_cats = table.categories(col_column)?;

    let mut pairs: BTreeMap<(Category, Category), u64> = BTreeMap::new();
    let mut row_set: BTreeMap<Category, usize> = BTreeMap::new();
    let mut col_set: BTreeMap<Category, usize> = BTreeMap::new();
    let mut skipped = 0usize;

    for (r, c) in row_cats.into_iter().zip(col_cats) {
        match (r, c) {
            (Some(r), Some(c)) => {
                row_set.entry(r.clone()).or_default();
                col_set.entry(c.clone()).or_default();
                *pairs.entry((r, c)).or_default() += 1;
            }
            _ => skipped += 1,
        }
    }

    // assign positions in sorted order
    for (i, pos) in row_set.values_mut().enumerate() {
        *pos = i;
    }
    for (j, pos) in col_set.values_mut().enumerate() {
        *pos = j;
    }

    let mut counts = vec![vec![0u64; col_set.len()]; row_set.len()];
    for ((r, c), n) in pairs {
        counts[row_set[&r]][col_set[&c]] = n;
    }

    debug!(
        row = row_column,
        col = col_column,
        rows = row_set.len(),
        cols = col_set.len(),
        skipped,
        "crosstab"
    );

    Ok(Contingency {
        row_variable: row_column.to_string(),
        col_variable: col_column.to_string(),
        row_labels: row_set.keys().map(|c| c.display().to_string()).collect(),
        col_labels: col_set.keys().map(|c| c.display().to_string()).collect(),
        counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::sample_table;
    use anyhow::Result;

    #[test]
    fn test_crosstab_orders_by_code_and_uses_labels() -> Result<()> {
        let t = sample_table();
        let ct = crosstab(&t, "sex", "village")?;
        // one row lacks a village, another lacks a sex: both skipped
        assert_eq!(ct.row_labels, vec!["Male", "Female"]);
        assert_eq!(ct.col_labels, vec!["Kalapara"]);
        assert_eq!(ct.counts, vec![vec![1], vec![1]]);
        assert_eq!(ct.total(), 2);
        Ok(())
    }

    #[test]
    fn test_percentages() -> Result<()> {
        let ct = Contingency::from_counts(vec![vec![50, 50], vec![10, 90], vec![0, 0]])?;
        let rows = ct.percentages(Normalize::Rows);
        assert_eq!(rows[0], vec![50.0, 50.0]);
        assert_eq!(rows[1], vec![10.0, 90.0]);
        assert_eq!(rows[2], vec![0.0, 0.0]);

        let cols = ct.percentages(Normalize::Columns);
        assert!((cols[0][0] - 100.0 * 50.0 / 60.0).abs() < 1e-9);
        assert!((cols[1][1] - 100.0 * 90.0 / 140.0).abs() < 1e-9);

        let all: f64 = ct.percentages(Normalize::All).iter().flatten().sum();
        assert!((all - 100.0).abs() < 1e-9);

        assert_eq!(ct.row_totals(), vec![100, 100, 0]);
        assert_eq!(ct.col_totals(), vec![60, 140]);
        Ok(())
    }

    #[test]
    fn test_ragged_counts_rejected() {
        assert!(Contingency::from_counts(vec![vec![1, 2], vec![3]]).is_err());
    }
}
