use crate::error::Result;
use crate::table::{Category, Table};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frequency {
    pub category: String,
    pub count: u64,
    /// Share of the non-missing rows.
    pub percent: f64,
}

/// Value counts for one column, in category order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frequencies {
    pub column: String,
    pub rows: Vec<Frequency>,
    pub missing: usize,
    pub total: usize,
}

impl Frequencies {
    pub fn count_of(&self, category: &str) -> u64 {
        self.rows
            .iter()
            .find(|f| f.category == category)
            .map_or(0, |f| f.count)
    }
}

pub fn frequencies(table: &Table, column: &str) -> Result<Frequencies> {
    let cats = table.categories(column)?;
    let total = cats.len();
    let mut counts: BTreeMap<Category, u64> = BTreeMap::new();
    let mut missing = 0;
    for cat in cats {
        match cat {
            Some(c) => *counts.entry(c).or_default() += 1,
            None => missing += 1,
        }
    }

    let present = (total - missing) as f64;
    let rows = counts
        .into_iter()
        .map(|(cat, count)| Frequency {
            category: cat.display().to_string(),
            count,
            percent: if present > 0.0 {
                100.0 * count as f64 / present
            } else {
                0.0
            },
        })
        .collect();

    Ok(Frequencies {
        column: column.to_string(),
        rows,
        missing,
        total,
    })
}
