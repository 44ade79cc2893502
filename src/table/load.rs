// src/table/load.rs

use super::{Table, ValueLabels, VALUE_LABELS_KEY};
use crate::error::{PanelError, Result};
use arrow::{
    compute::concat_batches,
    csv::{reader::Format, ReaderBuilder},
    datatypes::{Field, Schema},
    error::ArrowError,
    record_batch::RecordBatch,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::{
    collections::{BTreeMap, HashMap},
    fs::{self, File},
    io::Cursor,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info};

const CSV_BATCH_ROWS: usize = 8_192;

/// Load a tagged statistical table, picking the reader by file extension.
///
/// - `.parquet` / `.pq`: labels from field metadata
/// - `.csv`: labels from `<stem>.labels.yaml` next to the file, if present
#[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_table<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "csv" => {
            let sidecar = sidecar_path(path);
            if sidecar.is_file() {
                load_csv(path, Some(&sidecar))
            } else {
                load_csv(path, None)
            }
        }
        other => Err(PanelError::format(
            path,
            format!("unsupported file extension `{}`", other),
        )),
    }
}

/// `data/pre.csv` → `data/pre.labels.yaml`
pub fn sidecar_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!("{}.labels.yaml", stem))
}

fn table_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "table".into())
}

/// Read a whole Parquet file into one table.
pub fn load_parquet(path: &Path) -> Result<Table> {
    let file = File::open(path)?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| PanelError::format(path, e))?;
    let schema = builder.schema().clone();
    let reader = builder.build().map_err(|e| PanelError::format(path, e))?;
    let batches = reader
        .collect::<std::result::Result<Vec<RecordBatch>, ArrowError>>()
        .map_err(|e| PanelError::format(path, e))?;
    let batch = concat_batches(&schema, &batches)?;

    // pull labels out of field metadata so the table holds one copy of them
    let mut labels = BTreeMap::new();
    let mut fields = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let mut metadata: HashMap<String, String> = field.metadata().clone();
        if let Some(raw) = metadata.remove(VALUE_LABELS_KEY) {
            let vl: ValueLabels = serde_json::from_str(&raw).map_err(|e| {
                PanelError::format(
                    path,
                    format!("bad value labels on column `{}`: {}", field.name(), e),
                )
            })?;
            labels.insert(field.name().clone(), vl);
        }
        fields.push(field.as_ref().clone().with_metadata(metadata));
    }
    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), batch.columns().to_vec())?;

    info!(
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        labeled = labels.len(),
        "loaded parquet table"
    );
    Ok(Table::new(table_name(path), batch).with_labels(labels))
}

/// Read a CSV file (header row required) into one table.
///
/// Column types are inferred from the data; empty fields are null.
pub fn load_csv(path: &Path, labels_path: Option<&Path>) -> Result<Table> {
    let data = fs::read(path)?;

    let format = Format::default().with_header(true);
    let (schema, scanned) = format
        .infer_schema(Cursor::new(&data), None)
        .map_err(|e| PanelError::format(path, e))?;
    if schema.fields().is_empty() {
        return Err(PanelError::format(path, "no header row"));
    }
    debug!(records = scanned, columns = schema.fields().len(), "inferred csv schema");

    let schema = Arc::new(schema);
    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_batch_size(CSV_BATCH_ROWS)
        .build(Cursor::new(&data))
        .map_err(|e| PanelError::format(path, e))?;
    let batches = reader
        .collect::<std::result::Result<Vec<RecordBatch>, ArrowError>>()
        .map_err(|e| PanelError::format(path, e))?;
    let batch = concat_batches(&schema, &batches)?;

    let labels = match labels_path {
        Some(p) => load_sidecar(p)?,
        None => BTreeMap::new(),
    };

    info!(
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        labeled = labels.len(),
        "loaded csv table"
    );
    Ok(Table::new(table_name(path), batch).with_labels(labels))
}

fn load_sidecar(path: &Path) -> Result<BTreeMap<String, ValueLabels>> {
    let text = fs::read_to_string(path)?;
    serde_yaml::from_str(&text).map_err(|e| PanelError::format(path, e))
}

/// Fields with every value-label entry stripped; used by the writer too.
pub(crate) fn plain_field(field: &Field) -> Field {
    let mut metadata = field.metadata().clone();
    metadata.remove(VALUE_LABELS_KEY);
    field.clone().with_metadata(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::init_test_logging;
    use anyhow::Result;
    use std::io::Write;
    use tempfile::tempdir;

    const PRE_CSV: &str = "caseid,outcome,sex,age
1001,1,1,34
1002,2,2,
1003,3,1,71
";

    const PRE_LABELS: &str = "outcome:
  1: Completed interview
  2: Partially complete (no callback)
  3: Incomplete (callback)
sex:
  1: Male
  2: Female
";

    #[test]
    fn test_load_csv_with_sidecar_labels() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let csv = dir.path().join("pre.csv");
        fs::write(&csv, PRE_CSV)?;
        fs::write(dir.path().join("pre.labels.yaml"), PRE_LABELS)?;

        let table = load_table(&csv)?;
        assert_eq!(table.name(), "pre");
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.column_names(), vec!["caseid", "outcome", "sex", "age"]);

        let outcome = table.labeled("outcome", 2)?.expect("labeled outcome");
        assert_eq!(outcome.code, 3);
        assert_eq!(outcome.label.as_deref(), Some("Incomplete (callback)"));

        // empty field is null
        assert_eq!(table.numeric("age")?[1], None);
        Ok(())
    }

    #[test]
    fn test_load_csv_without_sidecar_has_no_labels() -> Result<()> {
        let dir = tempdir()?;
        let csv = dir.path().join("post.csv");
        fs::write(&csv, PRE_CSV)?;
        let table = load_table(&csv)?;
        assert!(table.all_labels().is_empty());
        assert_eq!(table.labeled("sex", 0)?.and_then(|l| l.label), None);
        Ok(())
    }

    #[test]
    fn test_ragged_csv_is_format_error() -> Result<()> {
        let dir = tempdir()?;
        let csv = dir.path().join("bad.csv");
        let mut f = File::create(&csv)?;
        writeln!(f, "caseid,age")?;
        writeln!(f, "1,20")?;
        writeln!(f, "2,30,extra")?;
        drop(f);

        let err = load_table(&csv).unwrap_err();
        assert!(matches!(err, PanelError::Format { .. }), "got {err:?}");
        Ok(())
    }

    #[test]
    fn test_unknown_extension_is_format_error() {
        let err = load_table("survey.sav").unwrap_err();
        assert!(matches!(err, PanelError::Format { .. }));
    }

    #[test]
    fn test_bad_sidecar_is_format_error() -> Result<()> {
        let dir = tempdir()?;
        let csv = dir.path().join("pre.csv");
        fs::write(&csv, PRE_CSV)?;
        fs::write(dir.path().join("pre.labels.yaml"), "outcome: [not, a, map")?;
        let err = load_table(&csv).unwrap_err();
        assert!(matches!(err, PanelError::Format { .. }));
        Ok(())
    }

    #[test]
    fn test_garbage_parquet_is_format_error() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.parquet");
        fs::write(&path, b"definitely not parquet")?;
        let err = load_table(&path).unwrap_err();
        assert!(matches!(err, PanelError::Format { .. }));
        Ok(())
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/data/merged.csv")),
            PathBuf::from("/data/merged.labels.yaml")
        );
    }
}
