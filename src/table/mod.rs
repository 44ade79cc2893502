// src/table/mod.rs

pub mod load;
pub mod write;

pub use load::{load_csv, load_parquet, load_table, sidecar_path};
pub use write::{write_csv, write_parquet, write_table};

use crate::error::{PanelError, Result};
use arrow::{
    array::{Array, ArrayRef, BooleanArray, UInt32Array},
    compute::{cast, filter_record_batch, take},
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
    util::display::{ArrayFormatter, FormatOptions},
};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeMap, fmt, sync::Arc};

/// Field metadata key holding a column's value labels as a JSON object.
pub const VALUE_LABELS_KEY: &str = "value_labels";

/// Integer code → human-readable label for one categorical column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueLabels(BTreeMap<i64, String>);

impl ValueLabels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: i64, label: impl Into<String>) {
        self.0.insert(code, label.into());
    }

    pub fn get(&self, code: i64) -> Option<&str> {
        self.0.get(&code).map(String::as_str)
    }

    /// Reverse lookup, used when a caller names a category by its label.
    pub fn code_of(&self, label: &str) -> Option<i64> {
        self.0
            .iter()
            .find_map(|(code, l)| (l == label).then_some(*code))
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &str)> {
        self.0.iter().map(|(c, l)| (*c, l.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(i64, S)> for ValueLabels {
    fn from_iter<I: IntoIterator<Item = (i64, S)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(c, l)| (c, l.into())).collect())
    }
}

/// A categorical cell: its numeric encoding plus the attached label, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labeled {
    pub code: i64,
    pub label: Option<String>,
}

impl fmt::Display for Labeled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => f.write_str(label),
            None => write!(f, "{}", self.code),
        }
    }
}

/// One non-null cell seen as a category.
///
/// Numeric cells carry their value in `code` and sort by it; text cells sort
/// lexicographically after all numeric ones.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub code: Option<f64>,
    pub text: String,
    pub label: Option<String>,
}

impl Category {
    /// Label when one exists, else the formatted value.
    pub fn display(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.text)
    }

    /// True when `value` names this category by its value or its label.
    pub fn matches(&self, value: &str) -> bool {
        self.text == value || self.label.as_deref() == Some(value)
    }
}

impl Eq for Category {}

impl PartialOrd for Category {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Category {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.code, other.code) {
            // + 0.0 folds -0.0 into 0.0, which prints the same
            (Some(a), Some(b)) => (a + 0.0)
                .total_cmp(&(b + 0.0))
                .then_with(|| self.text.cmp(&other.text)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.text.cmp(&other.text),
        }
    }
}

/// An immutable in-memory table: an Arrow batch plus per-column value labels.
///
/// Every transformation returns a new `Table`; nothing mutates in place.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    batch: RecordBatch,
    labels: BTreeMap<String, ValueLabels>,
}

impl Table {
    pub fn new(name: impl Into<String>, batch: RecordBatch) -> Self {
        Self {
            name: name.into(),
            batch,
            labels: BTreeMap::new(),
        }
    }

    /// Attach value labels; entries for columns the table lacks are dropped.
    pub fn with_labels(mut self, labels: BTreeMap<String, ValueLabels>) -> Self {
        let schema = self.batch.schema();
        self.labels = labels
            .into_iter()
            .filter(|(col, vl)| !vl.is_empty() && schema.column_with_name(col).is_some())
            .collect();
        self
    }

    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.batch.column_by_name(name).is_some()
    }

    pub fn column(&self, name: &str) -> Result<&ArrayRef> {
        self.batch
            .column_by_name(name)
            .ok_or_else(|| PanelError::missing_column(&self.name, name))
    }

    pub fn labels(&self, column: &str) -> Option<&ValueLabels> {
        self.labels.get(column)
    }

    pub fn all_labels(&self) -> &BTreeMap<String, ValueLabels> {
        &self.labels
    }

    /// Display text of every cell, `None` for nulls.
    ///
    /// Integral floats print without a fraction so that `1.0` and `1` agree,
    /// which keeps join keys comparable across numeric encodings.
    pub fn texts(&self, column: &str) -> Result<Vec<Option<String>>> {
        let array = self.column(column)?;
        column_texts(array.as_ref())
    }

    /// Integral numeric cells as codes; non-numeric columns give all `None`.
    pub fn codes(&self, column: &str) -> Result<Vec<Option<i64>>> {
        let array = self.column(column)?;
        if !is_numeric(array.data_type()) {
            return Ok(vec![None; array.len()]);
        }
        Ok(self
            .numeric(column)?
            .into_iter()
            .map(|v| v.and_then(integral))
            .collect())
    }

    /// Tagged view of one cell. `None` for nulls and non-integral values.
    pub fn labeled(&self, column: &str, row: usize) -> Result<Option<Labeled>> {
        let array = self.column(column)?;
        if row >= array.len() || array.is_null(row) || !is_numeric(array.data_type()) {
            return Ok(None);
        }
        let as_f64 = cast(array.slice(row, 1).as_ref(), &DataType::Float64)?;
        let value = as_f64
            .as_any()
            .downcast_ref::<arrow::array::Float64Array>()
            .and_then(|a| (!a.is_null(0)).then(|| a.value(0)))
            .and_then(integral);
        Ok(value.map(|code| Labeled {
            code,
            label: self
                .labels(column)
                .and_then(|vl| vl.get(code))
                .map(str::to_string),
        }))
    }

    /// Display text of one cell: its label when one exists, else the
    /// formatted value. `None` for nulls and rows past the end.
    pub fn category(&self, column: &str, row: usize) -> Result<Option<String>> {
        let array = self.column(column)?;
        if row >= array.len() || array.is_null(row) {
            return Ok(None);
        }
        if let Some(Labeled {
            label: Some(label), ..
        }) = self.labeled(column, row)?
        {
            return Ok(Some(label));
        }
        Ok(column_texts(array.slice(row, 1).as_ref())?.pop().flatten())
    }

    /// Every cell as a `Category`, `None` for nulls.
    pub fn categories(&self, column: &str) -> Result<Vec<Option<Category>>> {
        let texts = self.texts(column)?;
        let array = self.column(column)?;
        let numbers = if is_numeric(array.data_type()) {
            self.numeric(column)?
        } else {
            vec![None; texts.len()]
        };
        let labels = self.labels(column);

        Ok(texts
            .into_iter()
            .zip(numbers)
            .map(|(text, code)| {
                text.map(|text| Category {
                    label: code
                        .and_then(integral)
                        .and_then(|c| labels.and_then(|vl| vl.get(c)))
                        .map(str::to_string),
                    code: code.map(|c| c + 0.0),
                    text,
                })
            })
            .collect())
    }

    /// Column cast to f64; unparseable text and NaN become `None`.
    pub fn numeric(&self, column: &str) -> Result<Vec<Option<f64>>> {
        let array = self.column(column)?;
        let cast_arr = cast(array.as_ref(), &DataType::Float64)?;
        let floats = cast_arr
            .as_any()
            .downcast_ref::<arrow::array::Float64Array>()
            .ok_or_else(|| {
                PanelError::format(
                    self.name.as_str(),
                    format!("column `{}` did not cast to Float64", column),
                )
            })?;
        Ok(floats
            .iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect())
    }

    /// New table with `array` as column `name`, replacing a same-named column.
    pub fn with_column(
        &self,
        name: &str,
        array: ArrayRef,
        labels: Option<ValueLabels>,
    ) -> Result<Table> {
        let schema = self.batch.schema();
        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        let mut columns: Vec<ArrayRef> = self.batch.columns().to_vec();
        let field = Field::new(name, array.data_type().clone(), true);

        match schema.index_of(name) {
            Ok(idx) => {
                fields[idx] = field;
                columns[idx] = array;
            }
            Err(_) => {
                fields.push(field);
                columns.push(array);
            }
        }

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        let mut all_labels = self.labels.clone();
        match labels {
            Some(vl) if !vl.is_empty() => {
                all_labels.insert(name.to_string(), vl);
            }
            _ => {
                all_labels.remove(name);
            }
        }
        Ok(Table {
            name: self.name.clone(),
            batch,
            labels: all_labels,
        })
    }

    /// Keep rows where `mask` is true.
    pub fn filter(&self, mask: &BooleanArray) -> Result<Table> {
        let batch = filter_record_batch(&self.batch, mask)?;
        Ok(Table {
            name: self.name.clone(),
            batch,
            labels: self.labels.clone(),
        })
    }

    /// Gather rows by index. A null index yields an all-null row.
    pub fn take(&self, indices: &UInt32Array) -> Result<Table> {
        let columns = self
            .batch
            .columns()
            .iter()
            .map(|c| take(c.as_ref(), indices, None))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let fields: Vec<Field> = self
            .batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.as_ref().clone().with_nullable(true))
            .collect();
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        Ok(Table {
            name: self.name.clone(),
            batch,
            labels: self.labels.clone(),
        })
    }

    /// Assemble a table from explicit parts. Used by joins.
    pub(crate) fn from_parts(
        name: impl Into<String>,
        fields: Vec<Field>,
        columns: Vec<ArrayRef>,
        labels: BTreeMap<String, ValueLabels>,
    ) -> Result<Table> {
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        Ok(Table::new(name, batch).with_labels(labels))
    }
}

pub(crate) fn is_numeric(dt: &DataType) -> bool {
    matches!(
        dt,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float16
            | DataType::Float32
            | DataType::Float64
    )
}

fn integral(v: f64) -> Option<i64> {
    (v.is_finite() && v.fract() == 0.0 && v.abs() < 9.0e15).then_some(v as i64)
}

fn column_texts(array: &dyn Array) -> Result<Vec<Option<String>>> {
    if matches!(
        array.data_type(),
        DataType::Float16 | DataType::Float32 | DataType::Float64
    ) {
        let floats = cast(array, &DataType::Float64)?;
        let floats = floats
            .as_any()
            .downcast_ref::<arrow::array::Float64Array>()
            .ok_or_else(|| {
                arrow::error::ArrowError::CastError("float column did not cast".into())
            })?;
        return Ok(floats
            .iter()
            .map(|v| {
                v.filter(|x| !x.is_nan()).map(|x| match integral(x) {
                    Some(i) => i.to_string(),
                    None => x.to_string(),
                })
            })
            .collect());
    }

    let options = FormatOptions::default();
    let formatter = ArrayFormatter::try_new(array, &options)?;
    Ok((0..array.len())
        .map(|i| (!array.is_null(i)).then(|| formatter.value(i).to_string()))
        .collect())
}
