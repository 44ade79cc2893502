// src/flags/mod.rs

pub mod timestamps;

pub use timestamps::parse_timestamp_millis;

use crate::error::{PanelError, Result};
use crate::table::{Table, ValueLabels};
use arrow::{
    array::{
        Array, ArrayRef, Float64Array, Int64Array, LargeStringArray, StringArray,
        TimestampMillisecondArray,
    },
    compute::cast,
    datatypes::{DataType, TimeUnit},
};
use std::sync::Arc;
use tracing::{debug, info};

pub const COMPLETION_COLUMN: &str = "completion_status";
pub const COMPLETED: &str = "Completed";
pub const INCOMPLETE: &str = "Incomplete";

pub const REINTERVIEW_FLAG: &str = "reinterviewed";
pub const REINTERVIEW_STATUS: &str = "reinterview_status";
pub const REINTERVIEWED: &str = "Reinterviewed";
pub const NOT_REINTERVIEWED: &str = "Not Reinterviewed";

/// Mark each row "Incomplete" if ANY of `fields` is missing, else "Completed".
pub fn derive_completion<S: AsRef<str>>(table: &Table, fields: &[S]) -> Result<Table> {
    let present = all_present(table, fields)?;
    let status: StringArray = present
        .iter()
        .map(|&ok| Some(if ok { COMPLETED } else { INCOMPLETE }))
        .collect();

    let completed = present.iter().filter(|&&ok| ok).count();
    info!(
        table = table.name(),
        completed,
        incomplete = present.len() - completed,
        "derived completion"
    );
    table.with_column(COMPLETION_COLUMN, Arc::new(status), None)
}

/// After a left join, flag rows where ALL of `right_fields` are present.
///
/// Adds `reinterviewed` (1/0, labeled) and `reinterview_status` (text).
pub fn derive_reinterview<S: AsRef<str>>(table: &Table, right_fields: &[S]) -> Result<Table> {
    let present = all_present(table, right_fields)?;
    let flag: Int64Array = present.iter().map(|&ok| Some(ok as i64)).collect();
    let status: StringArray = present
        .iter()
        .map(|&ok| Some(if ok { REINTERVIEWED } else { NOT_REINTERVIEWED }))
        .collect();

    let yes = present.iter().filter(|&&ok| ok).count();
    info!(
        table = table.name(),
        reinterviewed = yes,
        not_reinterviewed = present.len() - yes,
        "derived reinterview flag"
    );

    let labels = ValueLabels::from_iter([(0, NOT_REINTERVIEWED), (1, REINTERVIEWED)]);
    table
        .with_column(REINTERVIEW_FLAG, Arc::new(flag), Some(labels))?
        .with_column(REINTERVIEW_STATUS, Arc::new(status), None)
}

/// Per row: true when every field is present. Null and blank text count as missing.
fn all_present<S: AsRef<str>>(table: &Table, fields: &[S]) -> Result<Vec<bool>> {
    if fields.is_empty() {
        return Err(PanelError::Config("at least one field is required".into()));
    }
    let columns = fields
        .iter()
        .map(|f| table.column(f.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    Ok((0..table.num_rows())
        .map(|row| columns.iter().all(|c| !is_missing(c.as_ref(), row)))
        .collect())
}

fn is_missing(array: &dyn Array, row: usize) -> bool {
    if array.is_null(row) {
        return true;
    }
    match array.data_type() {
        DataType::Utf8 => array
            .as_any()
            .downcast_ref::<StringArray>()
            .is_some_and(|a| a.value(row).trim().is_empty()),
        DataType::LargeUtf8 => array
            .as_any()
            .downcast_ref::<LargeStringArray>()
            .is_some_and(|a| a.value(row).trim().is_empty()),
        _ => false,
    }
}

/// Replace each text timestamp column with a `Timestamp(ms)` column.
///
/// Temporal columns are cast; blank text becomes null; any other text that
/// does not parse is a format error naming the row.
pub fn coerce_timestamps<S: AsRef<str>>(table: &Table, fields: &[S]) -> Result<Table> {
    let mut out = table.clone();
    for field in fields {
        let name = field.as_ref();
        let millis = timestamp_millis(table, name)?;
        let array = TimestampMillisecondArray::from(millis);
        out = out.with_column(name, Arc::new(array) as ArrayRef, None)?;
        debug!(column = name, "coerced timestamps");
    }
    Ok(out)
}

/// Minutes from `start` to `end`, stored in `target`; null if either is missing.
pub fn derive_duration_minutes(
    table: &Table,
    start: &str,
    end: &str,
    target: &str,
) -> Result<Table> {
    let starts = timestamp_millis(table, start)?;
    let ends = timestamp_millis(table, end)?;
    let minutes: Float64Array = starts
        .into_iter()
        .zip(ends)
        .map(|(s, e)| Some((e? - s?) as f64 / 60_000.0))
        .collect();
    table.with_column(target, Arc::new(minutes), None)
}

fn timestamp_millis(table: &Table, column: &str) -> Result<Vec<Option<i64>>> {
    let array = table.column(column)?;
    match array.data_type() {
        DataType::Utf8 | DataType::LargeUtf8 => {
            let texts = table.texts(column)?;
            texts
                .into_iter()
                .enumerate()
                .map(|(row, text)| match text {
                    None => Ok(None),
                    Some(t) if t.trim().is_empty() => Ok(None),
                    Some(t) => parse_timestamp_millis(&t).map(Some).ok_or_else(|| {
                        PanelError::format(
                            table.name(),
                            format!("row {} of `{}`: cannot parse timestamp `{}`", row, column, t),
                        )
                    }),
                })
                .collect()
        }
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64 => {
            let ts = cast(
                array.as_ref(),
                &DataType::Timestamp(TimeUnit::Millisecond, None),
            )?;
            let ts = cast(ts.as_ref(), &DataType::Int64)?;
            let ints = ts
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| PanelError::format(table.name(), "timestamp cast failed"))?;
            Ok(ints.iter().collect())
        }
        other => Err(PanelError::format(
            table.name(),
            format!("column `{}` of type {} is not a timestamp", column, other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use arrow::{
        datatypes::{Field, Schema},
        record_batch::RecordBatch,
    };

    fn followup() -> Table {
        let schema = Arc::new(Schema::new(vec![
            Field::new("caseid", DataType::Int64, false),
            Field::new("start", DataType::Utf8, true),
            Field::new("end", DataType::Utf8, true),
            Field::new("submissiondate", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3, 4])),
                Arc::new(StringArray::from(vec![
                    Some("2020-06-01 09:00:00"),
                    Some("2020-06-01 09:00:00"),
                    None,
                    Some("2020-06-02 11:00:00"),
                ])),
                Arc::new(StringArray::from(vec![
                    Some("2020-06-01 09:45:00"),
                    None,
                    Some("2020-06-01 10:00:00"),
                    Some("2020-06-02 11:30:00"),
                ])),
                Arc::new(StringArray::from(vec![
                    Some("2020-06-03 00:00:00"),
                    Some("2020-06-03 00:00:00"),
                    Some("2020-06-03 00:00:00"),
                    Some("  "),
                ])),
            ],
        )
        .unwrap();
        Table::new("followup", batch)
    }

    const FIELDS: [&str; 3] = ["start", "end", "submissiondate"];

    #[test]
    fn test_completion_fails_on_any_missing() -> Result<()> {
        let out = derive_completion(&followup(), &FIELDS)?;
        assert_eq!(
            out.texts(COMPLETION_COLUMN)?,
            vec![
                Some(COMPLETED.to_string()),
                Some(INCOMPLETE.to_string()),
                Some(INCOMPLETE.to_string()),
                Some(INCOMPLETE.to_string()),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_reinterview_requires_all_fields() -> Result<()> {
        let out = derive_reinterview(&followup(), &FIELDS)?;
        assert_eq!(out.codes(REINTERVIEW_FLAG)?, vec![Some(1), Some(0), Some(0), Some(0)]);
        assert_eq!(out.texts(REINTERVIEW_STATUS)?[0].as_deref(), Some(REINTERVIEWED));
        assert_eq!(
            out.labeled(REINTERVIEW_FLAG, 1)?.and_then(|l| l.label).as_deref(),
            Some(NOT_REINTERVIEWED)
        );

        // only two of the fields: row 4 now counts
        let partial = derive_reinterview(&followup(), &["start", "end"])?;
        assert_eq!(partial.codes(REINTERVIEW_FLAG)?, vec![Some(1), Some(0), Some(0), Some(1)]);
        Ok(())
    }

    #[test]
    fn test_derivations_are_idempotent() -> Result<()> {
        let once = derive_reinterview(&followup(), &FIELDS)?;
        let twice = derive_reinterview(&once, &FIELDS)?;
        assert_eq!(once.num_columns(), twice.num_columns());
        assert_eq!(once.codes(REINTERVIEW_FLAG)?, twice.codes(REINTERVIEW_FLAG)?);
        Ok(())
    }

    #[test]
    fn test_missing_field_is_key_error() {
        let err = derive_completion(&followup(), &["start", "duration"]).unwrap_err();
        assert!(matches!(err, PanelError::MissingColumn { .. }));
        let none: [&str; 0] = [];
        assert!(derive_reinterview(&followup(), &none).is_err());
    }

    #[test]
    fn test_coerce_and_duration() -> Result<()> {
        let coerced = coerce_timestamps(&followup(), &FIELDS)?;
        assert!(matches!(
            coerced.column("start")?.data_type(),
            DataType::Timestamp(TimeUnit::Millisecond, None)
        ));
        // blank submission became null
        assert!(coerced.column("submissiondate")?.is_null(3));

        let with_minutes = derive_duration_minutes(&coerced, "start", "end", "minutes")?;
        assert_eq!(
            with_minutes.numeric("minutes")?,
            vec![Some(45.0), None, None, Some(30.0)]
        );

        // coercing twice goes through the temporal branch
        let again = coerce_timestamps(&coerced, &FIELDS)?;
        assert_eq!(again.column("start")?.null_count(), 1);
        Ok(())
    }

    #[test]
    fn test_coerce_rejects_unparseable() {
        let schema = Arc::new(Schema::new(vec![Field::new("start", DataType::Utf8, true)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(StringArray::from(vec!["2020-06-01 09:00:00", "soon"]))],
        )
        .unwrap();
        let err = coerce_timestamps(&Table::new("followup", batch), &["start"]).unwrap_err();
        assert!(err.to_string().contains("soon"));
    }
}
