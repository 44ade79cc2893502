// src/pipeline.rs

use crate::bucket::{bucketize_column, Bucketizer};
use crate::clean::{check_key_subset, check_unique_key, drop_rows_matching, missing_values};
use crate::config::PanelConfig;
use crate::error::{DuplicateKeyWarning, PanelError, Result};
use crate::flags::{
    coerce_timestamps, derive_completion, derive_reinterview, COMPLETION_COLUMN,
    REINTERVIEW_STATUS,
};
use crate::join::{inner_join, left_join, LEFT_SUFFIX, RIGHT_SUFFIX};
use crate::stats::{crosstab, frequencies, ChiSquare, Contingency, Frequencies};
use crate::table::{load_table, Table};
use serde::Serialize;
use tracing::info;

/// One factor tested against reinterview status.
#[derive(Debug, Clone, Serialize)]
pub struct FactorTest {
    pub factor: String,
    pub contingency: Contingency,
    pub chi_square: ChiSquare,
    pub significant: bool,
}

/// Everything a presentation layer needs from one run.
#[derive(Debug, Clone, Serialize)]
pub struct AttritionReport {
    pub baseline_rows: usize,
    pub removed_outcomes: usize,
    pub cleaned_rows: usize,
    pub followup_rows: usize,
    /// Respondents present in both waves.
    pub matched: usize,
    /// Distinct follow-up ids with no row in the cleaned baseline.
    pub unmatched_followup: usize,
    pub warnings: Vec<DuplicateKeyWarning>,
    /// Nulls per factor column of the merged table.
    pub missing: Vec<(String, usize)>,
    pub completion: Frequencies,
    pub reinterview: Frequencies,
    pub age_groups: Frequencies,
    pub alpha: f64,
    pub tests: Vec<FactorTest>,
    #[serde(skip)]
    pub merged: Table,
}

impl AttritionReport {
    pub fn significant_factors(&self) -> impl Iterator<Item = &FactorTest> {
        self.tests.iter().filter(|t| t.significant)
    }
}

/// Load both waves named by `config`, then [`run`].
pub fn load_and_run(config: &PanelConfig) -> Result<AttritionReport> {
    let baseline = load_table(&config.baseline)?.renamed("baseline");
    let followup = load_table(&config.followup)?.renamed("followup");
    run(config, &baseline, &followup)
}

/// Clean, join, derive and test. Every stage returns a new table.
pub fn run(config: &PanelConfig, baseline: &Table, followup: &Table) -> Result<AttritionReport> {
    config.validate()?;
    let key = config.id_column.as_str();

    // 1) key invariants, before any join
    let warnings: Vec<DuplicateKeyWarning> = [
        check_unique_key(baseline, key)?,
        check_unique_key(followup, key)?,
    ]
    .into_iter()
    .flatten()
    .collect();

    // 2) baseline cleaning
    let (cleaned, removed_outcomes) =
        drop_rows_matching(baseline, &config.outcome_column, &config.excluded_outcomes)?;

    // follow-up ids should all come from the cleaned baseline
    let unmatched_followup = check_key_subset(followup, &cleaned, key)?;

    // 3) follow-up completion
    let followup = if config.coerce_timestamps {
        coerce_timestamps(followup, &config.timestamp_fields)?
    } else {
        followup.clone()
    };
    let followup = derive_completion(&followup, &config.timestamp_fields)?;
    let completion = frequencies(&followup, COMPLETION_COLUMN)?;

    // 4) joins; duplicates were already reported in step 1
    let matched = inner_join(&cleaned, &followup, key)?.table.num_rows();
    let merged = left_join(&cleaned, &followup, key)?.table.renamed("merged");

    // 5) derived columns on the merged table
    let right_fields = config
        .timestamp_fields
        .iter()
        .map(|f| resolve_side(&merged, &followup, f, RIGHT_SUFFIX))
        .collect::<Result<Vec<_>>>()?;
    let merged = derive_reinterview(&merged, &right_fields)?;
    let reinterview = frequencies(&merged, REINTERVIEW_STATUS)?;

    let age_column = resolve_side(&merged, &cleaned, &config.age_column, LEFT_SUFFIX)?;
    let bucketizer = Bucketizer::age_groups().with_below(config.age_below_range);
    let merged = bucketize_column(&merged, &age_column, &config.age_group_column, &bucketizer)?;
    let age_groups = frequencies(&merged, &config.age_group_column)?;

    // 6) one test per factor
    let mut tests = Vec::with_capacity(config.factors.len());
    let mut factor_columns = Vec::with_capacity(config.factors.len());
    for factor in &config.factors {
        let column = resolve(&merged, factor, LEFT_SUFFIX)?;
        let contingency = crosstab(&merged, &column, REINTERVIEW_STATUS)?;
        let chi_square = if config.yates {
            contingency.chi_square_yates()
        } else {
            contingency.chi_square()
        }
        .map_err(|e| match e {
            PanelError::DegenerateInput(msg) => {
                PanelError::DegenerateInput(format!("factor `{}`: {}", factor, msg))
            }
            other => other,
        })?;

        let significant = chi_square.is_significant(config.alpha);
        info!(
            factor = factor.as_str(),
            statistic = chi_square.statistic,
            dof = chi_square.dof,
            p_value = chi_square.p_value,
            significant,
            "chi-square"
        );
        factor_columns.push(column);
        tests.push(FactorTest {
            factor: factor.clone(),
            contingency,
            chi_square,
            significant,
        });
    }

    let missing = missing_values(&merged)
        .into_iter()
        .filter(|(name, _)| factor_columns.contains(name))
        .collect();

    info!(
        baseline = baseline.num_rows(),
        cleaned = cleaned.num_rows(),
        followup = followup.num_rows(),
        matched,
        unmatched_followup,
        reinterviewed = merged_count(&reinterview),
        "pipeline finished"
    );

    Ok(AttritionReport {
        baseline_rows: baseline.num_rows(),
        removed_outcomes,
        cleaned_rows: cleaned.num_rows(),
        followup_rows: followup.num_rows(),
        matched,
        unmatched_followup,
        warnings,
        missing,
        completion,
        reinterview,
        age_groups,
        alpha: config.alpha,
        tests,
        merged,
    })
}

fn merged_count(reinterview: &Frequencies) -> u64 {
    reinterview.count_of(crate::flags::REINTERVIEWED)
}

/// Name `column` of `side` carries in the merged table. Fails when `side`
/// never had the column, so a same-named column of the other wave is not
/// picked up by accident.
fn resolve_side(merged: &Table, side: &Table, name: &str, suffix: &str) -> Result<String> {
    if !side.has_column(name) {
        return Err(PanelError::missing_column(side.name(), name));
    }
    resolve(merged, name, suffix)
}

/// A column keeps its name after a join unless both sides had it; then it
/// carries the side's suffix.
///
/// Factors go through this directly: they may name a baseline, follow-up or
/// derived column, and on a name clash the baseline copy wins.
fn resolve(table: &Table, name: &str, suffix: &str) -> Result<String> {
    if table.has_column(name) {
        return Ok(name.to_string());
    }
    let suffixed = format!("{}{}", name, suffix);
    if table.has_column(&suffixed) {
        Ok(suffixed)
    } else {
        Err(PanelError::missing_column(table.name(), name))
    }
}
