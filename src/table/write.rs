// src/table/write.rs

use super::{load::plain_field, sidecar_path, Table, VALUE_LABELS_KEY};
use crate::error::{PanelError, Result};
use arrow::{csv::WriterBuilder, datatypes::Schema, record_batch::RecordBatch};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{fs, fs::File, path::Path, sync::Arc};
use tracing::info;

/// Export by file extension: `.parquet`/`.pq` or `.csv`.
pub fn write_table(table: &Table, path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "parquet" | "pq" => write_parquet(table, path),
        "csv" => write_csv(table, path),
        other => Err(PanelError::Config(format!(
            "cannot export to `{}`: unsupported extension `{}`",
            path.display(),
            other
        ))),
    }
}

/// Snappy Parquet with value labels embedded as field metadata.
pub fn write_parquet(table: &Table, path: &Path) -> Result<()> {
    let mut fields = Vec::with_capacity(table.num_columns());
    for field in table.schema().fields() {
        let mut field = plain_field(field);
        if let Some(vl) = table.labels(field.name()) {
            let mut metadata = field.metadata().clone();
            metadata.insert(VALUE_LABELS_KEY.to_string(), serde_json::to_string(vl)?);
            field = field.with_metadata(metadata);
        }
        fields.push(field);
    }
    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), table.batch().columns().to_vec())?;

    let file = File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    info!(path = %path.display(), rows = batch.num_rows(), "wrote parquet");
    Ok(())
}

/// CSV with header; labels (if any) go to a `<stem>.labels.yaml` sidecar.
pub fn write_csv(table: &Table, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer.write(table.batch())?;
    drop(writer);

    if !table.all_labels().is_empty() {
        let sidecar = sidecar_path(path);
        fs::write(&sidecar, serde_yaml::to_string(table.all_labels())?)?;
        info!(path = %sidecar.display(), "wrote label sidecar");
    }

    info!(path = %path.display(), rows = table.num_rows(), "wrote csv");
    Ok(())
}
