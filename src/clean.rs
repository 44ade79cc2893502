// src/clean.rs

use crate::error::{DuplicateKeyWarning, Result};
use crate::table::Table;
use arrow::array::BooleanArray;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Remove rows whose `column` value (or its label) is one of `excluded`.
///
/// Returns the new table and the number of rows removed. Null cells never
/// match, so re-applying the same exclusion is a no-op.
pub fn drop_rows_matching<S: AsRef<str>>(
    table: &Table,
    column: &str,
    excluded: &[S],
) -> Result<(Table, usize)> {
    let categories = table.categories(column)?;
    let keep: BooleanArray = categories
        .iter()
        .map(|cat| {
            let hit = cat
                .as_ref()
                .is_some_and(|c| excluded.iter().any(|v| c.matches(v.as_ref())));
            Some(!hit)
        })
        .collect();

    let removed = keep.false_count();
    let out = table.filter(&keep)?;
    info!(
        table = table.name(),
        column,
        removed,
        remaining = out.num_rows(),
        "dropped matching rows"
    );
    Ok((out, removed))
}

/// Key values that occur more than once, each yielded once in the order the
/// duplicate first appears. Null keys are ignored.
///
/// An empty iterator means the key is unique.
pub fn find_duplicate_keys(table: &Table, key: &str) -> Result<impl Iterator<Item = String>> {
    let keys = table.texts(key)?;
    let mut counts: HashMap<String, usize> = HashMap::with_capacity(keys.len());
    for k in keys.iter().flatten() {
        *counts.entry(k.clone()).or_default() += 1;
    }
    let mut reported = HashSet::new();
    Ok(keys
        .into_iter()
        .flatten()
        .filter(move |k| counts.get(k).copied().unwrap_or(0) > 1 && reported.insert(k.clone())))
}

/// Verify the unique-key invariant, surfacing a warning when it fails.
pub fn check_unique_key(table: &Table, key: &str) -> Result<Option<DuplicateKeyWarning>> {
    let keys: Vec<String> = find_duplicate_keys(table, key)?.collect();
    if keys.is_empty() {
        debug!(table = table.name(), key, "key is unique");
        return Ok(None);
    }
    let warning = DuplicateKeyWarning {
        table: table.name().to_string(),
        column: key.to_string(),
        keys,
    };
    warn!("{}", warning);
    Ok(Some(warning))
}

/// Key values of `table` that never occur in `reference`, each yielded once
/// in first-seen order. Null keys are ignored.
pub fn find_orphan_keys(
    table: &Table,
    reference: &Table,
    key: &str,
) -> Result<impl Iterator<Item = String>> {
    let known: HashSet<String> = reference.texts(key)?.into_iter().flatten().collect();
    let mut reported = HashSet::new();
    Ok(table
        .texts(key)?
        .into_iter()
        .flatten()
        .filter(move |k| !known.contains(k) && reported.insert(k.clone())))
}

/// Verify that every key of `table` also occurs in `reference`.
///
/// Returns the number of distinct orphan keys and warns when it is non-zero.
pub fn check_key_subset(table: &Table, reference: &Table, key: &str) -> Result<usize> {
    let orphans: Vec<String> = find_orphan_keys(table, reference, key)?.collect();
    if orphans.is_empty() {
        debug!(table = table.name(), reference = reference.name(), key, "keys are a subset");
    } else {
        warn!(
            table = table.name(),
            reference = reference.name(),
            key,
            count = orphans.len(),
            sample = ?&orphans[..orphans.len().min(5)],
            "keys absent from reference table"
        );
    }
    Ok(orphans.len())
}

/// Keep the first row for every key value; rows with a null key are kept.
pub fn dedup_by_key(table: &Table, key: &str) -> Result<(Table, usize)> {
    let keys = table.texts(key)?;
    let mut seen = HashSet::with_capacity(keys.len());
    let keep: BooleanArray = keys
        .into_iter()
        .map(|k| Some(k.map_or(true, |k| seen.insert(k))))
        .collect();

    let removed = keep.false_count();
    if removed > 0 {
        info!(table = table.name(), key, removed, "removed duplicate keys");
    }
    Ok((table.filter(&keep)?, removed))
}

/// Null count per column, in column order.
pub fn missing_values(table: &Table) -> Vec<(String, usize)> {
    table
        .schema()
        .fields()
        .iter()
        .zip(table.batch().columns())
        .map(|(f, c)| (f.name().clone(), c.null_count()))
        .collect()
}
