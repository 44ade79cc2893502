use crate::error::{PanelError, Result};
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Outcome of a chi-square test of independence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChiSquare {
    pub statistic: f64,
    pub dof: usize,
    pub p_value: f64,
}

impl ChiSquare {
    /// Reject independence at significance level `alpha`.
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

/// Pearson's chi-square test on an observed count matrix.
///
/// `dof = (rows - 1) * (cols - 1)`. Fails when any expected count is not
/// positive (a zero row or column total), or the table is smaller than 2×2.
pub fn chi_square_independence(counts: &[Vec<u64>]) -> Result<ChiSquare> {
    chi_square(counts, false)
}

/// As [`chi_square_independence`], with Yates' continuity correction applied
/// when `dof == 1`.
pub fn chi_square_independence_yates(counts: &[Vec<u64>]) -> Result<ChiSquare> {
    chi_square(counts, true)
}

fn chi_square(counts: &[Vec<u64>], yates: bool) -> Result<ChiSquare> {
    let nrows = counts.len();
    let ncols = counts.first().map_or(0, Vec::len);
    if nrows < 2 || ncols < 2 {
        return Err(PanelError::DegenerateInput(format!(
            "need at least a 2x2 table, got {}x{}",
            nrows, ncols
        )));
    }
    if counts.iter().any(|r| r.len() != ncols) {
        return Err(PanelError::DegenerateInput(
            "contingency rows differ in length".into(),
        ));
    }

    let row_totals: Vec<f64> = counts
        .iter()
        .map(|r| r.iter().sum::<u64>() as f64)
        .collect();
    let col_totals: Vec<f64> = (0..ncols)
        .map(|j| counts.iter().map(|r| r[j]).sum::<u64>() as f64)
        .collect();
    let total: f64 = row_totals.iter().sum();

    if let Some(i) = row_totals.iter().position(|&t| t <= 0.0) {
        return Err(PanelError::DegenerateInput(format!(
            "row {} has a zero total",
            i
        )));
    }
    if let Some(j) = col_totals.iter().position(|&t| t <= 0.0) {
        return Err(PanelError::DegenerateInput(format!(
            "column {} has a zero total",
            j
        )));
    }

    let dof = (nrows - 1) * (ncols - 1);
    let correct = yates && dof == 1;

    let mut statistic = 0.0;
    for (i, row) in counts.iter().enumerate() {
        for (j, &observed) in row.iter().enumerate() {
            let expected = row_totals[i] * col_totals[j] / total;
            if expected <= 0.0 {
                return Err(PanelError::DegenerateInput(format!(
                    "expected count at ({}, {}) is not positive",
                    i, j
                )));
            }
            let mut diff = (observed as f64 - expected).abs();
            if correct {
                diff -= diff.min(0.5);
            }
            statistic += diff * diff / expected;
        }
    }

    let dist = ChiSquared::new(dof as f64)
        .map_err(|e| PanelError::DegenerateInput(format!("chi-square distribution: {}", e)))?;
    let p_value = dist.sf(statistic);

    Ok(ChiSquare {
        statistic,
        dof,
        p_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_strong_association() -> Result<()> {
        let r = chi_square_independence(&[vec![50, 50], vec![10, 90]])?;
        assert!(r.statistic > 0.0);
        assert!((r.statistic - 38.095238).abs() < 1e-4);
        assert_eq!(r.dof, 1);
        assert!(r.p_value < 0.001);
        assert!(r.is_significant(0.05));
        Ok(())
    }

    #[test]
    fn test_proportional_table_has_no_association() -> Result<()> {
        let r = chi_square_independence(&[vec![50, 50], vec![50, 50]])?;
        assert_eq!(r.statistic, 0.0);
        assert!((r.p_value - 1.0).abs() < 1e-9);
        assert!(!r.is_significant(0.05));
        Ok(())
    }

    #[test]
    fn test_known_p_values() -> Result<()> {
        let plain = chi_square_independence(&[vec![10, 20], vec![20, 10]])?;
        assert!((plain.statistic - 6.666_667).abs() < 1e-4);
        assert!((plain.p_value - 0.009_82).abs() < 1e-4);

        let yates = chi_square_independence_yates(&[vec![10, 20], vec![20, 10]])?;
        assert!((yates.statistic - 5.4).abs() < 1e-9);
        assert!((yates.p_value - 0.020_14).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_dof_for_larger_table() -> Result<()> {
        let r = chi_square_independence(&[vec![5, 10, 15], vec![10, 10, 10], vec![15, 10, 5]])?;
        assert_eq!(r.dof, 4);
        // yates only applies at one degree of freedom
        let y = chi_square_independence_yates(&[vec![5, 10, 15], vec![10, 10, 10], vec![15, 10, 5]])?;
        assert_eq!(r, y);
        Ok(())
    }

    #[test]
    fn test_zero_marginal_is_degenerate() {
        for counts in [
            vec![vec![0, 0], vec![10, 90]],
            vec![vec![0, 50], vec![0, 90]],
            vec![vec![1, 2]],
            vec![],
        ] {
            assert!(matches!(
                chi_square_independence(&counts),
                Err(PanelError::DegenerateInput(_))
            ));
        }
    }
}
