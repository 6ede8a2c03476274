//! Tabular model for external data

use std::sync::Arc;
use arrow::array::{Array, Float64Array};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;

use crate::DataError;

/// Header given to columns that have no name
pub const ANONYMOUS_COLUMN: &str = "?";

/// One named column of values
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<f64>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Number of rows actually holding values
    pub fn row_count(&self) -> usize {
        self.values.len()
    }
}

/// A two-column series: an x-axis column and a y-axis column.
///
/// The two columns may have different row counts when the source was ragged.
/// Columns are shared between datasets that plot against the same axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub x: Arc<Column>,
    pub y: Arc<Column>,
}

impl Dataset {
    pub fn new(x: Column, y: Column) -> Self {
        Self::from_shared(Arc::new(x), Arc::new(y))
    }

    pub fn from_shared(x: Arc<Column>, y: Arc<Column>) -> Self {
        Self { x, y }
    }

    pub fn x_column_name(&self) -> &str {
        &self.x.name
    }

    pub fn y_column_name(&self) -> &str {
        &self.y.name
    }
}

/// An ordered collection of datasets from one source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    pub name: String,
    pub datasets: Vec<Dataset>,
}

impl DataTable {
    pub fn new(name: impl Into<String>, datasets: Vec<Dataset>) -> Self {
        Self {
            name: name.into(),
            datasets,
        }
    }

    /// Build datasets `(column0, columnN)` for every N >= 1, the way a data
    /// tool shows a table. A lone column is plotted against its row number.
    pub fn from_columns(name: impl Into<String>, columns: Vec<Column>) -> Self {
        let mut columns = columns.into_iter();
        let datasets = match columns.next() {
            None => Vec::new(),
            Some(first) => {
                let rest: Vec<Column> = columns.collect();
                if rest.is_empty() {
                    let rows = (0..first.row_count()).map(|i| i as f64).collect();
                    vec![Dataset::new(Column::new("row", rows), first)]
                } else {
                    let first = Arc::new(first);
                    rest.into_iter()
                        .map(|column| Dataset::from_shared(first.clone(), Arc::new(column)))
                        .collect()
                }
            }
        };
        Self::new(name, datasets)
    }

    /// Build a table from a record batch, casting every column to `Float64`.
    /// Nulls and unparseable cells become NaN, so every column keeps the
    /// batch's row count.
    pub fn from_record_batch(name: impl Into<String>, batch: &RecordBatch) -> Result<Self, DataError> {
        let schema = batch.schema();
        let mut columns = Vec::with_capacity(batch.num_columns());
        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            let floats = cast(array, &DataType::Float64)?;
            let floats = floats
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| DataError::Other(format!("column {} is not numeric", field.name())))?;
            let values = (0..batch.num_rows())
                .map(|i| if floats.is_null(i) { f64::NAN } else { floats.value(i) })
                .collect();
            columns.push(Column::new(field.name().clone(), values));
        }
        Ok(Self::from_columns(name, columns))
    }

    /// True if there is nothing to read
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Every column in scan order: each dataset's x column, then its y column.
    /// A shared column appears once per dataset.
    pub fn columns(&self) -> impl Iterator<Item = &Arc<Column>> {
        self.datasets.iter().flat_map(|d| [&d.x, &d.y])
    }
}

/// Parallel x, y and optional t arrays for one tracked point.
///
/// Construction guarantees `x.len() == y.len()` and, when present,
/// `t.len() == x.len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalDataSeries {
    x: Arc<[f64]>,
    y: Arc<[f64]>,
    t: Option<Arc<[f64]>>,
}

impl ExternalDataSeries {
    pub fn new(x: Vec<f64>, y: Vec<f64>, t: Option<Vec<f64>>) -> Result<Self, DataError> {
        if x.len() != y.len() {
            return Err(DataError::format("X and Y data have different array lengths"));
        }
        if let Some(t) = &t {
            if t.len() != x.len() {
                return Err(DataError::format("Time data has incorrect array length"));
            }
        }
        Ok(Self {
            x: x.into(),
            y: y.into(),
            t: t.map(Into::into),
        })
    }

    /// A one-point series at the origin, used before any data is assigned
    pub fn placeholder() -> Self {
        Self {
            x: Arc::from(vec![0.0]),
            y: Arc::from(vec![0.0]),
            t: None,
        }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn t(&self) -> Option<&[f64]> {
        self.t.as_deref()
    }

    /// Position at a data row, `None` outside the series
    pub fn point(&self, index: usize) -> Option<(f64, f64)> {
        Some((*self.x.get(index)?, *self.y.get(index)?))
    }

    /// Time at a data row in seconds, `None` without time data or outside it
    pub fn time(&self, index: usize) -> Option<f64> {
        self.t.as_ref().and_then(|t| t.get(index).copied())
    }

    /// Keep the first `len()` rows of this series and take the rest from a
    /// longer series. Time is kept only if both series carry it.
    pub fn extended_by(&self, newer: &ExternalDataSeries) -> Result<Self, DataError> {
        let n = self.len();
        if newer.len() <= n {
            return Err(DataError::format("no new rows to append"));
        }
        let splice = |old: &[f64], new: &[f64]| -> Vec<f64> {
            old.iter().chain(new[n..].iter()).copied().collect()
        };
        let t = match (self.t(), newer.t()) {
            (Some(old), Some(new)) => Some(splice(old, new)),
            (None, Some(new)) => Some(new.to_vec()),
            _ => None,
        };
        Self::new(splice(self.x(), newer.x()), splice(self.y(), newer.y()), t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};

    #[test]
    fn test_from_columns_pairs_against_first_column() {
        let table = DataTable::from_columns(
            "run",
            vec![
                Column::new("t", vec![0.0, 0.1]),
                Column::new("x", vec![1.0, 2.0]),
                Column::new("y", vec![3.0, 4.0]),
            ],
        );
        assert_eq!(table.datasets.len(), 2);
        assert_eq!(table.datasets[0].x_column_name(), "t");
        assert_eq!(table.datasets[1].y_column_name(), "y");
        let names: Vec<&str> = table.columns().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["t", "x", "t", "y"]);
    }

    #[test]
    fn test_from_record_batch_casts_and_nans() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("frame", DataType::Int64, false),
            Field::new("x (m)", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![0, 1, 2])),
                Arc::new(StringArray::from(vec![None, Some("1.5"), None])),
            ],
        )
        .unwrap();
        let table = DataTable::from_record_batch("batch", &batch).unwrap();
        assert_eq!(table.datasets[0].x.row_count(), 3);
        let y = &table.datasets[0].y.values;
        assert_eq!(y.len(), 3);
        assert!(y[0].is_nan());
        assert_eq!(y[1], 1.5);
        assert!(y[2].is_nan());
    }

    #[test]
    fn test_series_rejects_mismatched_lengths() {
        assert!(matches!(
            ExternalDataSeries::new(vec![0.0; 3], vec![0.0; 2], None),
            Err(DataError::DataFormat(_))
        ));
        assert!(matches!(
            ExternalDataSeries::new(vec![0.0; 3], vec![0.0; 3], Some(vec![0.0; 4])),
            Err(DataError::DataFormat(_))
        ));
    }

    #[test]
    fn test_extended_by_keeps_existing_rows() {
        let old = ExternalDataSeries::new(vec![1.0, 2.0], vec![1.0, 2.0], None).unwrap();
        let new = ExternalDataSeries::new(vec![9.0, 9.0, 3.0], vec![9.0, 9.0, 3.0], None).unwrap();
        let merged = old.extended_by(&new).unwrap();
        assert_eq!(merged.x(), &[1.0, 2.0, 3.0]);
        assert!(old.extended_by(&old).is_err());
    }
}
