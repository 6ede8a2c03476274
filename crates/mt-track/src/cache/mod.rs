//! Cached derived time series of a track

pub mod formula;

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use indexmap::IndexMap;
use mt_data::DataError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::step::Point;
use crate::TrackError;
use formula::Formula;

/// Raw column names, in column order
pub const RAW_COLUMNS: [&str; 13] = [
    "t", "x", "y", "r", "θ_r", "v_x", "v_y", "v", "a_x", "a_y", "a", "step", "frame",
];

/// A named constant usable in formulas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    pub name: String,
    pub value: f64,
}

impl Constant {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A user-defined column computed from a formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedColumn {
    pub name: String,
    pub expression: String,
}

impl DerivedColumn {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }
}

/// One row of raw track data
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub frame: usize,
    pub step: usize,
    /// Time in seconds
    pub t: f64,
    pub position: Point,
}

/// A track's derived time series: raw columns, formula columns and the
/// constants they were evaluated with
#[derive(Debug)]
pub struct TrackData {
    batch: RecordBatch,
    constants: IndexMap<String, f64>,
}

impl TrackData {
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn row_count(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&Float64Array> {
        self.batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
    }

    pub fn values(&self, name: &str) -> Option<Vec<f64>> {
        self.column(name).map(|c| c.values().to_vec())
    }

    pub fn constants(&self) -> &IndexMap<String, f64> {
        &self.constants
    }
}

struct CacheState {
    data: Option<Arc<TrackData>>,
    dirty: bool,
    columns: IndexMap<String, String>,
    constants: IndexMap<String, f64>,
    deferred_columns: Vec<DerivedColumn>,
    deferred_constants: Vec<Constant>,
    /// Rows on each side of a central difference
    spill: usize,
}

/// Lazily computed [`TrackData`] with a dirty flag.
///
/// Until the next mutation or [`invalidate`](TrackDataCache::invalidate),
/// every call to [`get_data`](TrackDataCache::get_data) returns the same
/// `Arc`.
pub struct TrackDataCache {
    state: Mutex<CacheState>,
}

impl TrackDataCache {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState {
                data: None,
                dirty: true,
                columns: IndexMap::new(),
                constants: IndexMap::new(),
                deferred_columns: Vec::new(),
                deferred_constants: Vec::new(),
                spill: 1,
            }),
        }
    }

    /// The cached data, recomputed from `samples` only if dirty
    pub fn get_data<F>(&self, samples: F) -> Result<Arc<TrackData>, TrackError>
    where
        F: FnOnce() -> Vec<Sample>,
    {
        let mut state = self.state.lock();
        if let (false, Some(data)) = (state.dirty, &state.data) {
            return Ok(Arc::clone(data));
        }

        apply_deferred(&mut state);
        let data = Arc::new(compute(&samples(), &state.columns, &state.constants, state.spill)?);
        state.data = Some(Arc::clone(&data));
        state.dirty = false;
        Ok(data)
    }

    /// Mark dirty; nothing is recomputed until the next read
    pub fn invalidate(&self) {
        self.state.lock().dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    pub fn spill(&self) -> usize {
        self.state.lock().spill
    }

    /// Set the rows used on each side of velocity and acceleration
    /// differences. Returns true if it changed.
    pub fn set_spill(&self, spill: usize) -> bool {
        let spill = spill.max(1);
        let mut state = self.state.lock();
        if state.spill == spill {
            return false;
        }
        state.spill = spill;
        state.dirty = true;
        true
    }

    /// Add or replace a formula column
    pub fn define_column(&self, name: impl Into<String>, expression: impl Into<String>) {
        let mut state = self.state.lock();
        state.columns.insert(name.into(), expression.into());
        state.dirty = true;
    }

    /// Remove a formula column. Returns true if it existed.
    pub fn remove_column(&self, name: &str) -> bool {
        let mut state = self.state.lock();
        let removed = state.columns.shift_remove(name).is_some();
        state.dirty |= removed;
        removed
    }

    pub fn set_constant(&self, constant: Constant) {
        let mut state = self.state.lock();
        state.constants.insert(constant.name, constant.value);
        state.dirty = true;
    }

    /// Stage formula columns loaded from a document; they are applied on the
    /// next recompute
    pub fn defer_columns(&self, columns: Vec<DerivedColumn>) {
        let mut state = self.state.lock();
        state.deferred_columns.extend(columns);
        state.dirty = true;
    }

    /// Stage constants loaded from a document
    pub fn defer_constants(&self, constants: Vec<Constant>) {
        let mut state = self.state.lock();
        state.deferred_constants.extend(constants);
        state.dirty = true;
    }

    /// Formula columns in definition order, deferred ones included
    pub fn columns(&self) -> Vec<DerivedColumn> {
        let state = self.state.lock();
        state
            .columns
            .iter()
            .map(|(name, expression)| DerivedColumn::new(name.clone(), expression.clone()))
            .chain(state.deferred_columns.iter().cloned())
            .collect()
    }

    /// Constants in definition order, deferred ones included
    pub fn constants(&self) -> Vec<Constant> {
        let state = self.state.lock();
        state
            .constants
            .iter()
            .map(|(name, value)| Constant::new(name.clone(), *value))
            .chain(state.deferred_constants.iter().cloned())
            .collect()
    }
}

impl Default for TrackDataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TrackDataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TrackDataCache")
            .field("dirty", &state.dirty)
            .field("columns", &state.columns)
            .field("constants", &state.constants)
            .finish()
    }
}

fn apply_deferred(state: &mut CacheState) {
    for column in std::mem::take(&mut state.deferred_columns) {
        if RAW_COLUMNS.contains(&column.name.as_str()) || state.columns.contains_key(&column.name) {
            debug!("skipping deferred column '{}': name in use", column.name);
            continue;
        }
        state.columns.insert(column.name, column.expression);
    }
    for constant in std::mem::take(&mut state.deferred_constants) {
        if state.constants.contains_key(&constant.name) {
            debug!("skipping deferred constant '{}': name in use", constant.name);
            continue;
        }
        state.constants.insert(constant.name, constant.value);
    }
}

/// Central difference over rows `i - spill` and `i + spill`, NaN where
/// either is missing
fn derivative(values: &[f64], t: &[f64], spill: usize) -> Vec<f64> {
    let n = values.len();
    (0..n)
        .map(|i| {
            if i < spill || i + spill >= n {
                return f64::NAN;
            }
            (values[i + spill] - values[i - spill]) / (t[i + spill] - t[i - spill])
        })
        .collect()
}

/// Second central difference over rows `i - spill` and `i + spill`
fn second_derivative(values: &[f64], t: &[f64], spill: usize) -> Vec<f64> {
    let n = values.len();
    (0..n)
        .map(|i| {
            if i < spill || i + spill >= n {
                return f64::NAN;
            }
            let dt = (t[i + spill] - t[i - spill]) / 2.0;
            (values[i + spill] - 2.0 * values[i] + values[i - spill]) / (dt * dt)
        })
        .collect()
}

fn compute(
    samples: &[Sample],
    formulas: &IndexMap<String, String>,
    constants: &IndexMap<String, f64>,
    spill: usize,
) -> Result<TrackData, TrackError> {
    let t: Vec<f64> = samples.iter().map(|s| s.t).collect();
    let x: Vec<f64> = samples.iter().map(|s| s.position.x).collect();
    let y: Vec<f64> = samples.iter().map(|s| s.position.y).collect();
    let vx = derivative(&x, &t, spill);
    let vy = derivative(&y, &t, spill);
    let ax = second_derivative(&x, &t, spill);
    let ay = second_derivative(&y, &t, spill);

    let mut columns: IndexMap<String, Vec<f64>> = IndexMap::new();
    columns.insert("r".into(), x.iter().zip(&y).map(|(x, y)| x.hypot(*y)).collect());
    columns.insert("θ_r".into(), x.iter().zip(&y).map(|(x, y)| y.atan2(*x)).collect());
    columns.insert("v".into(), vx.iter().zip(&vy).map(|(a, b)| a.hypot(*b)).collect());
    columns.insert("a".into(), ax.iter().zip(&ay).map(|(a, b)| a.hypot(*b)).collect());
    columns.insert("v_x".into(), vx);
    columns.insert("v_y".into(), vy);
    columns.insert("a_x".into(), ax);
    columns.insert("a_y".into(), ay);
    columns.insert("step".into(), samples.iter().map(|s| s.step as f64).collect());
    columns.insert("frame".into(), samples.iter().map(|s| s.frame as f64).collect());
    columns.insert("t".into(), t);
    columns.insert("x".into(), x);
    columns.insert("y".into(), y);

    let mut ordered: IndexMap<String, Vec<f64>> = RAW_COLUMNS
        .iter()
        .filter_map(|name| columns.shift_remove(*name).map(|v| (name.to_string(), v)))
        .collect();

    for (name, expression) in formulas {
        let values = evaluate_column(expression, &ordered, constants, samples.len()).unwrap_or_else(|e| {
            warn!("data function '{}' = '{}' failed: {}", name, expression, e);
            vec![f64::NAN; samples.len()]
        });
        ordered.insert(name.clone(), values);
    }

    let fields: Vec<Field> = ordered
        .keys()
        .map(|name| Field::new(name.as_str(), DataType::Float64, false))
        .collect();
    let arrays: Vec<ArrayRef> = ordered
        .into_values()
        .map(|values| Arc::new(Float64Array::from(values)) as ArrayRef)
        .collect();
    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).map_err(DataError::from)?;

    debug!("computed track data: {} rows, {} columns", batch.num_rows(), batch.num_columns());
    Ok(TrackData {
        batch,
        constants: constants.clone(),
    })
}

fn evaluate_column(
    expression: &str,
    columns: &IndexMap<String, Vec<f64>>,
    constants: &IndexMap<String, f64>,
    rows: usize,
) -> Result<Vec<f64>, formula::FormulaError> {
    let formula = Formula::parse(expression)?;
    for name in formula.variables() {
        if !columns.contains_key(name) && !constants.contains_key(name) {
            return Err(formula::FormulaError::UnknownVariable(name.to_string()));
        }
    }
    (0..rows)
        .map(|row| {
            formula.eval(|name| {
                columns
                    .get(name)
                    .map(|values| values[row])
                    .or_else(|| constants.get(name).copied())
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn line(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample {
                frame: i,
                step: i,
                t: i as f64 * 0.5,
                position: Point::new(i as f64 * 2.0, 1.0),
            })
            .collect()
    }

    #[test]
    fn test_cached_data_is_identical_until_invalidated() {
        let cache = TrackDataCache::new();
        let calls = Cell::new(0);
        let samples = || {
            calls.set(calls.get() + 1);
            line(4)
        };

        let first = cache.get_data(samples).unwrap();
        let second = cache.get_data(samples).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.get(), 1);

        cache.invalidate();
        cache.invalidate();
        let third = cache.get_data(|| line(6)).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.row_count(), 6);
    }

    #[test]
    fn test_raw_columns_and_derivatives() {
        let cache = TrackDataCache::new();
        let data = cache.get_data(|| line(4)).unwrap();
        assert_eq!(data.column_names(), RAW_COLUMNS.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        let vx = data.values("v_x").unwrap();
        assert!(vx[0].is_nan());
        assert_eq!(vx[1], 4.0);
        assert!(vx[3].is_nan());
        assert_eq!(data.values("a_x").unwrap()[2], 0.0);
    }

    #[test]
    fn test_wider_spill_changes_derivatives() {
        let cubic = || -> Vec<Sample> {
            (0..5)
                .map(|i| Sample {
                    frame: i,
                    step: i,
                    t: i as f64,
                    position: Point::new((i * i * i) as f64, 0.0),
                })
                .collect()
        };
        let cache = TrackDataCache::new();
        let narrow = cache.get_data(cubic).unwrap();
        assert_eq!(narrow.values("v_x").unwrap()[1], 4.0);
        assert_eq!(narrow.values("v_x").unwrap()[2], 13.0);

        assert!(cache.set_spill(2));
        assert!(!cache.set_spill(2));
        assert!(cache.is_dirty());
        let wide = cache.get_data(cubic).unwrap();
        let vx = wide.values("v_x").unwrap();
        assert!(vx[1].is_nan());
        assert_eq!(vx[2], 16.0);
        assert!(vx[3].is_nan());
        assert_eq!(wide.values("a_x").unwrap()[2], 12.0);
    }

    #[test]
    fn test_formula_columns_and_constants() {
        let cache = TrackDataCache::new();
        cache.set_constant(Constant::new("m", 2.0));
        cache.define_column("p_x", "m * v_x");
        cache.define_column("bad", "x + nope");
        let data = cache.get_data(|| line(3)).unwrap();
        assert_eq!(data.values("p_x").unwrap()[1], 8.0);
        assert!(data.values("bad").unwrap().iter().all(|v| v.is_nan()));
        assert_eq!(data.constants().get("m"), Some(&2.0));

        assert!(cache.remove_column("bad"));
        assert!(cache.is_dirty());
        assert!(cache.get_data(|| line(3)).unwrap().column("bad").is_none());
    }

    #[test]
    fn test_deferred_definitions_apply_once() {
        let cache = TrackDataCache::new();
        cache.define_column("k", "x * 2");
        cache.defer_columns(vec![
            DerivedColumn::new("k", "x * 100"),
            DerivedColumn::new("x", "0"),
            DerivedColumn::new("half_x", "x / 2"),
        ]);
        cache.defer_constants(vec![Constant::new("g", 9.8)]);

        let data = cache.get_data(|| line(3)).unwrap();
        assert_eq!(data.values("k").unwrap()[1], 4.0);
        assert_eq!(data.values("half_x").unwrap()[2], 2.0);
        assert_eq!(data.values("x").unwrap()[2], 4.0);
        assert_eq!(data.constants().get("g"), Some(&9.8));

        assert_eq!(cache.columns().len(), 2);
        cache.invalidate();
        let again = cache.get_data(|| line(3)).unwrap();
        assert_eq!(again.column_names().len(), RAW_COLUMNS.len() + 2);
    }
}
