// src/join.rs

use crate::clean::check_unique_key;
use crate::error::{DuplicateKeyWarning, Result};
use crate::table::{Table, ValueLabels};
use arrow::{
    array::{ArrayRef, UInt32Array},
    datatypes::Field,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::info;

/// Suffixes for non-key columns present on both sides.
pub const LEFT_SUFFIX: &str = "_x";
pub const RIGHT_SUFFIX: &str = "_y";

/// Result of a join: the table plus any duplicate-key warnings found on
/// either input. A warning means the row count fanned out.
#[derive(Debug, Clone)]
pub struct Joined {
    pub table: Table,
    pub warnings: Vec<DuplicateKeyWarning>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum JoinKind {
    Inner,
    Left,
}

/// Rows whose key appears in both tables.
pub fn inner_join(a: &Table, b: &Table, key: &str) -> Result<Joined> {
    join(a, b, key, JoinKind::Inner)
}

/// Every row of `a`; columns of `b` are null where the key is absent from `b`.
pub fn left_join(a: &Table, b: &Table, key: &str) -> Result<Joined> {
    join(a, b, key, JoinKind::Left)
}

fn join(a: &Table, b: &Table, key: &str, kind: JoinKind) -> Result<Joined> {
    // both sides must carry the key before anything else happens
    a.column(key)?;
    b.column(key)?;

    let warnings: Vec<DuplicateKeyWarning> = [check_unique_key(a, key)?, check_unique_key(b, key)?]
        .into_iter()
        .flatten()
        .collect();

    let mut index: HashMap<String, Vec<u32>> = HashMap::new();
    for (j, k) in b.texts(key)?.into_iter().enumerate() {
        if let Some(k) = k {
            index.entry(k).or_default().push(j as u32);
        }
    }

    let mut left_rows: Vec<u32> = Vec::with_capacity(a.num_rows());
    let mut right_rows: Vec<Option<u32>> = Vec::with_capacity(a.num_rows());
    for (i, k) in a.texts(key)?.into_iter().enumerate() {
        match k.as_ref().and_then(|k| index.get(k)) {
            Some(matches) => {
                for &j in matches {
                    left_rows.push(i as u32);
                    right_rows.push(Some(j));
                }
            }
            None if kind == JoinKind::Left => {
                left_rows.push(i as u32);
                right_rows.push(None);
            }
            None => {}
        }
    }

    let left = a.take(&UInt32Array::from(left_rows))?;
    let right = b.take(&UInt32Array::from(right_rows))?;

    let left_names: HashSet<String> = a.column_names().into_iter().collect();
    let right_names: HashSet<String> = b.column_names().into_iter().collect();
    let clash = |name: &str| name != key && left_names.contains(name) && right_names.contains(name);

    let mut fields: Vec<Field> = Vec::with_capacity(left.num_columns() + right.num_columns());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(fields.capacity());
    let mut labels: BTreeMap<String, ValueLabels> = BTreeMap::new();

    for (side, suffix, skip_key) in [(&left, LEFT_SUFFIX, false), (&right, RIGHT_SUFFIX, true)] {
        let schema = side.schema();
        for (field, column) in schema.fields().iter().zip(side.batch().columns()) {
            let name = field.name();
            if skip_key && name == key {
                continue;
            }
            let out_name = if clash(name) {
                format!("{}{}", name, suffix)
            } else {
                name.clone()
            };
            if let Some(vl) = side.labels(name) {
                labels.insert(out_name.clone(), vl.clone());
            }
            fields.push(field.as_ref().clone().with_name(out_name));
            columns.push(column.clone());
        }
    }

    let table = Table::from_parts(format!("{}_{}", a.name(), b.name()), fields, columns, labels)?;
    info!(
        kind = if kind == JoinKind::Inner { "inner" } else { "left" },
        left = a.num_rows(),
        right = b.num_rows(),
        rows = table.num_rows(),
        "joined"
    );
    Ok(Joined { table, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PanelError;
    use crate::table::tests::sample_table;
    use anyhow::Result;
    use arrow::{
        array::{Int64Array, StringArray},
        datatypes::{DataType, Schema},
        record_batch::RecordBatch,
    };
    use std::sync::Arc;

    fn followup(ids: Vec<&str>, starts: Vec<Option<&str>>) -> Table {
        let schema = Arc::new(Schema::new(vec![
            Field::new("caseid", DataType::Utf8, false),
            Field::new("start", DataType::Utf8, true),
            Field::new("village", DataType::Utf8, true),
        ]));
        let villages = vec![Some("Barguna"); ids.len()];
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(starts)),
                Arc::new(StringArray::from(villages)),
            ],
        )
        .unwrap();
        Table::new("followup", batch)
    }

    #[test]
    fn test_self_inner_join_returns_each_row_once() -> Result<()> {
        let t = sample_table();
        let joined = inner_join(&t, &t, "caseid")?;
        assert!(joined.warnings.is_empty());
        let out = joined.table;
        assert_eq!(out.num_rows(), t.num_rows());
        assert_eq!(
            out.column_names(),
            vec!["caseid", "sex_x", "village_x", "sex_y", "village_y"]
        );
        for col in ["sex", "village"] {
            assert_eq!(out.texts(&format!("{col}_x"))?, t.texts(col)?);
            assert_eq!(out.texts(&format!("{col}_y"))?, t.texts(col)?);
        }
        // labels follow the renamed columns
        assert!(out.labels("sex_x").is_some());
        assert!(out.labels("sex_y").is_some());
        Ok(())
    }

    #[test]
    fn test_left_join_keeps_every_left_row() -> Result<()> {
        let pre = sample_table();
        // Int64 keys on the left, text keys on the right
        let post = followup(
            vec!["104", "101", "999"],
            vec![Some("2020-06-01"), None, Some("2020-06-02")],
        );
        let joined = left_join(&pre, &post, "caseid")?;
        let out = joined.table;
        assert_eq!(out.num_rows(), pre.num_rows());
        assert_eq!(
            out.column_names(),
            vec!["caseid", "sex", "village_x", "start", "village_y"]
        );
        assert_eq!(
            out.texts("start")?,
            vec![None, None, None, Some("2020-06-01".into())]
        );
        assert_eq!(
            out.texts("village_y")?,
            vec![Some("Barguna".into()), None, None, Some("Barguna".into())]
        );
        Ok(())
    }

    #[test]
    fn test_inner_join_drops_unmatched() -> Result<()> {
        let pre = sample_table();
        let post = followup(vec!["104", "101", "999"], vec![None, None, None]);
        let out = inner_join(&pre, &post, "caseid")?.table;
        assert_eq!(out.num_rows(), 2);
        assert_eq!(out.texts("caseid")?, vec![Some("101".into()), Some("104".into())]);
        Ok(())
    }

    #[test]
    fn test_duplicate_right_key_fans_out_with_warning() -> Result<()> {
        let pre = sample_table();
        let post = followup(vec!["101", "101"], vec![Some("a"), Some("b")]);
        let joined = left_join(&pre, &post, "caseid")?;
        assert_eq!(joined.warnings.len(), 1);
        assert_eq!(joined.warnings[0].keys, vec!["101"]);
        assert_eq!(joined.table.num_rows(), pre.num_rows() + 1);
        Ok(())
    }

    #[test]
    fn test_missing_key_is_key_error() {
        let pre = sample_table();
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1]))]).unwrap();
        let post = Table::new("followup", batch);
        for result in [left_join(&pre, &post, "caseid"), inner_join(&post, &pre, "caseid")] {
            assert!(matches!(
                result.unwrap_err(),
                PanelError::MissingColumn { ref table, .. } if table == "followup"
            ));
        }
    }
}
