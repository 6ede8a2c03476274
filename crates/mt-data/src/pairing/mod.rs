//! Locating x/y(/t) coordinate columns in an arbitrary table

use std::sync::Arc;

use tracing::debug;

use crate::table::{Column, DataTable, ExternalDataSeries, ANONYMOUS_COLUMN};
use crate::DataError;

/// Characters trimmed from a point name after its axis letter is removed
const SEPARATORS: &[char] = &['_', '-', '.', ':'];

/// A matched (x, y) column pair for one named point
#[derive(Debug, Clone, PartialEq)]
pub struct PointPair {
    /// Point name left after removing the axis letter; may be empty
    pub name: String,
    pub x: Arc<Column>,
    pub y: Arc<Column>,
}

impl PointPair {
    /// Row count, or `None` when the two columns disagree
    pub fn len(&self) -> Option<usize> {
        let n = self.x.row_count();
        (n == self.y.row_count()).then_some(n)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Series for this point, with an optional shared time column
    pub fn to_series(&self, time: Option<&Column>) -> Result<ExternalDataSeries, DataError> {
        ExternalDataSeries::new(
            self.x.values.clone(),
            self.y.values.clone(),
            time.map(|t| t.values.clone()),
        )
    }
}

/// Pairs and time column located in a table.
///
/// `pairs[0]` is the primary point; the rest drive follower tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedData {
    pub pairs: Vec<PointPair>,
    pub time: Option<Arc<Column>>,
}

impl ResolvedData {
    pub fn primary(&self) -> &PointPair {
        &self.pairs[0]
    }

    pub fn primary_series(&self) -> Result<ExternalDataSeries, DataError> {
        self.primary().to_series(self.time.as_deref())
    }

    /// Series for every pair after the first, keyed by point name
    pub fn follower_series(&self) -> Result<Vec<(String, ExternalDataSeries)>, DataError> {
        self.pairs
            .iter()
            .skip(1)
            .map(|pair| Ok((pair.name.clone(), pair.to_series(self.time.as_deref())?)))
            .collect()
    }

    /// Points with names disambiguated for display
    pub fn display_names(&self) -> Vec<String> {
        display_names(&self.pairs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

/// A column that looks like one coordinate of a point
struct Candidate<'a> {
    axis: Axis,
    point: String,
    column: &'a Arc<Column>,
}

/// A pair under construction
struct Pending<'a> {
    point: String,
    x: Option<&'a Arc<Column>>,
    y: Option<&'a Arc<Column>>,
}

impl<'a> Pending<'a> {
    fn start(candidate: Candidate<'a>) -> Self {
        let mut pending = Pending {
            point: candidate.point,
            x: None,
            y: None,
        };
        pending.set(candidate.axis, candidate.column);
        pending
    }

    fn slot_is_empty(&self, axis: Axis) -> bool {
        match axis {
            Axis::X => self.x.is_none(),
            Axis::Y => self.y.is_none(),
        }
    }

    fn set(&mut self, axis: Axis, column: &'a Arc<Column>) {
        match axis {
            Axis::X => self.x = Some(column),
            Axis::Y => self.y = Some(column),
        }
    }

    fn complete(&self) -> Option<PointPair> {
        Some(PointPair {
            name: self.point.clone(),
            x: Arc::clone(self.x?),
            y: Arc::clone(self.y?),
        })
    }
}

/// Finds coordinate column pairs and the time column in a table
#[derive(Debug, Clone)]
pub struct ColumnPairingResolver {
    fallback_to_anonymous: bool,
}

impl Default for ColumnPairingResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnPairingResolver {
    pub fn new() -> Self {
        Self {
            fallback_to_anonymous: true,
        }
    }

    /// Disable pairing of unnamed `?` columns when no named pair exists
    pub fn without_anonymous_fallback(mut self) -> Self {
        self.fallback_to_anonymous = false;
        self
    }

    /// Locate and validate the coordinate columns of a table
    pub fn resolve(&self, table: &DataTable) -> Result<ResolvedData, DataError> {
        if table.is_empty() {
            return Err(DataError::format("Data contains no datasets"));
        }

        let pairs = self.find_pairs(table);
        if pairs.is_empty() {
            return Err(DataError::format("Position data (x, y) not defined"));
        }
        if pairs.iter().any(|pair| pair.len().is_none()) {
            return Err(DataError::format("X and Y data have different array lengths"));
        }
        if pairs[0].is_empty() {
            return Err(DataError::format("Position data is empty"));
        }

        let time = self.time_column(table);
        if let Some(t) = &time {
            if Some(t.row_count()) != pairs[0].len() {
                return Err(DataError::format("Time data has incorrect array length"));
            }
        }

        debug!(
            "Resolved {} point(s) in '{}' (time column: {})",
            pairs.len(),
            table.name,
            time.is_some()
        );
        Ok(ResolvedData { pairs, time })
    }

    /// Check-only variant: `None` instead of an error
    pub fn probe(&self, table: &DataTable) -> Option<ResolvedData> {
        self.resolve(table).ok()
    }

    /// Scan the table's columns for (x, y) pairs without validating them
    pub fn find_pairs(&self, table: &DataTable) -> Vec<PointPair> {
        let columns = distinct_columns(table);
        let mut pairs = Vec::new();
        let mut pending: Option<Pending> = None;

        for &column in &columns {
            let Some((axis, point)) = classify(&column.name) else {
                continue;
            };
            let candidate = Candidate { axis, point, column };

            pending = match pending.take() {
                Some(mut p) if p.point == candidate.point && p.slot_is_empty(candidate.axis) => {
                    p.set(candidate.axis, candidate.column);
                    match p.complete() {
                        Some(pair) => {
                            pairs.push(pair);
                            None
                        }
                        None => Some(p),
                    }
                }
                _ => Some(Pending::start(candidate)),
            };
        }

        if pairs.is_empty() && self.fallback_to_anonymous {
            let mut anonymous = columns.iter().filter(|c| c.name == ANONYMOUS_COLUMN);
            if let (Some(x), Some(y)) = (anonymous.next(), anonymous.next()) {
                debug!("No named coordinate columns in '{}', using unnamed columns", table.name);
                pairs.push(PointPair {
                    name: String::new(),
                    x: Arc::clone(x),
                    y: Arc::clone(y),
                });
            }
        }

        pairs
    }

    /// First column named `t` or `time` (ignoring case and any trailing
    /// qualifier)
    pub fn time_column(&self, table: &DataTable) -> Option<Arc<Column>> {
        table
            .columns()
            .find(|column| {
                let name = strip_qualifier(&column.name);
                name.eq_ignore_ascii_case("t") || name.eq_ignore_ascii_case("time")
            })
            .cloned()
    }
}

/// Columns in scan order, visiting a column shared by several datasets once
fn distinct_columns(table: &DataTable) -> Vec<&Arc<Column>> {
    let mut seen: Vec<&Arc<Column>> = Vec::new();
    for column in table.columns() {
        if !seen.iter().any(|s| Arc::ptr_eq(s, column)) {
            seen.push(column);
        }
    }
    seen
}

/// Remove a trailing parenthesized or bracketed qualifier such as a unit,
/// then surrounding whitespace
pub fn strip_qualifier(name: &str) -> &str {
    let trimmed = name.trim();
    for (open, close) in [('(', ')'), ('[', ']')] {
        if trimmed.ends_with(close) {
            if let Some(start) = trimmed.rfind(open) {
                return trimmed[..start].trim();
            }
        }
    }
    trimmed
}

fn trim_point(name: &str) -> String {
    name.trim_matches(|c: char| c.is_whitespace() || SEPARATORS.contains(&c))
        .to_string()
}

fn axis_of(c: char) -> Option<Axis> {
    match c.to_ascii_lowercase() {
        'x' => Some(Axis::X),
        'y' => Some(Axis::Y),
        _ => None,
    }
}

/// Classify a column name as an x or y coordinate and extract its point name.
///
/// A leading `x`/`y` takes precedence. A trailing one counts only when it is
/// the whole name or follows whitespace or a separator, so `vx` is not a
/// coordinate.
fn classify(name: &str) -> Option<(Axis, String)> {
    let name = strip_qualifier(name);
    let first = name.chars().next()?;
    if let Some(axis) = axis_of(first) {
        return Some((axis, trim_point(&name[first.len_utf8()..])));
    }

    let last = name.chars().last()?;
    let axis = axis_of(last)?;
    let head = &name[..name.len() - last.len_utf8()];
    let separated = head
        .chars()
        .last()
        .map_or(true, |c| c.is_whitespace() || SEPARATORS.contains(&c));
    separated.then(|| (axis, trim_point(head)))
}

/// Point names with a numeric suffix appended to repeats, so `A, A, B`
/// shows as `A, A2, B`
pub fn display_names(pairs: &[PointPair]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(pairs.len());
    for (i, pair) in pairs.iter().enumerate() {
        let repeats = pairs[..i].iter().filter(|p| p.name == pair.name).count();
        if repeats == 0 {
            names.push(pair.name.clone());
        } else {
            names.push(format!("{}{}", pair.name, repeats + 1));
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Dataset;

    fn column(name: &str, n: usize) -> Column {
        Column::new(name, (0..n).map(|i| i as f64).collect())
    }

    fn table(datasets: Vec<(&str, &str)>) -> DataTable {
        DataTable::new(
            "test",
            datasets
                .into_iter()
                .map(|(x, y)| Dataset::new(column(x, 3), column(y, 3)))
                .collect(),
        )
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("x"), Some((Axis::X, String::new())));
        assert_eq!(classify("xA"), Some((Axis::X, "A".to_string())));
        assert_eq!(classify("y_mass (m)"), Some((Axis::Y, "mass".to_string())));
        assert_eq!(classify("ball x"), Some((Axis::X, "ball".to_string())));
        assert_eq!(classify("ball_Y [cm]"), Some((Axis::Y, "ball".to_string())));
        assert_eq!(classify("vx"), None);
        assert_eq!(classify("vy"), None);
        assert_eq!(classify("time"), None);
    }

    #[test]
    fn test_strip_qualifier() {
        assert_eq!(strip_qualifier("x (m)"), "x");
        assert_eq!(strip_qualifier(" t[s] "), "t");
        assert_eq!(strip_qualifier("(x)"), "");
        assert_eq!(strip_qualifier("y"), "y");
    }

    #[test]
    fn test_two_points_in_order() {
        let data = table(vec![("xA", "yA"), ("xB", "yB")]);
        let resolved = ColumnPairingResolver::new().resolve(&data).unwrap();
        let names: Vec<&str> = resolved.pairs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(resolved.primary().x.name, "xA");
    }

    #[test]
    fn test_velocity_columns_are_not_positions() {
        let data = table(vec![("vx", "vy")]);
        let resolver = ColumnPairingResolver::new();
        assert!(resolver.find_pairs(&data).is_empty());
        match resolver.resolve(&data) {
            Err(DataError::DataFormat(msg)) => assert_eq!(msg, "Position data (x, y) not defined"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_time_column_with_unit() {
        let data = table(vec![("t (s)", "x"), ("t (s)", "y")]);
        let resolved = ColumnPairingResolver::new().resolve(&data).unwrap();
        assert_eq!(resolved.time.as_ref().map(|t| t.name.as_str()), Some("t (s)"));
        assert_eq!(resolved.pairs.len(), 1);
    }

    #[test]
    fn test_mismatched_name_restarts_pair() {
        let data = table(vec![("xA", "yB"), ("xB", "yC")]);
        let pairs = ColumnPairingResolver::new().find_pairs(&data);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].name, "B");
        assert_eq!(pairs[0].x.name, "xB");
    }

    #[test]
    fn test_csv_layout_shares_first_column() {
        let data = DataTable::from_columns(
            "csv",
            vec![column("xA", 4), column("yA", 4), column("xB", 4), column("yB", 4)],
        );
        let pairs = ColumnPairingResolver::new().find_pairs(&data);
        let names: Vec<&str> = pairs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_anonymous_fallback() {
        let data = table(vec![("?", "?")]);
        let resolved = ColumnPairingResolver::new().resolve(&data).unwrap();
        assert_eq!(resolved.primary().name, "");
        assert!(ColumnPairingResolver::new()
            .without_anonymous_fallback()
            .probe(&data)
            .is_none());
    }

    #[test]
    fn test_length_errors() {
        let resolver = ColumnPairingResolver::new();

        let ragged = DataTable::new("r", vec![Dataset::new(column("x", 3), column("y", 2))]);
        match resolver.resolve(&ragged) {
            Err(DataError::DataFormat(msg)) => {
                assert_eq!(msg, "X and Y data have different array lengths")
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let empty = DataTable::new("e", vec![Dataset::new(column("x", 0), column("y", 0))]);
        match resolver.resolve(&empty) {
            Err(DataError::DataFormat(msg)) => assert_eq!(msg, "Position data is empty"),
            other => panic!("unexpected result: {:?}", other),
        }

        let short_time = DataTable::new(
            "s",
            vec![
                Dataset::new(column("time", 2), column("x", 3)),
                Dataset::new(column("y", 3), column("z", 3)),
            ],
        );
        match resolver.resolve(&short_time) {
            Err(DataError::DataFormat(msg)) => assert_eq!(msg, "Time data has incorrect array length"),
            other => panic!("unexpected result: {:?}", other),
        }

        assert!(matches!(
            resolver.resolve(&DataTable::default()),
            Err(DataError::DataFormat(_))
        ));
    }

    #[test]
    fn test_check_only_without_positions() {
        let data = DataTable::from_columns(
            "velocities",
            vec![column("time", 5), column("vx", 5), column("vy", 5)],
        );
        let resolver = ColumnPairingResolver::new();
        assert!(resolver.probe(&data).is_none());
        assert!(resolver.resolve(&data).is_err());
    }

    #[test]
    fn test_check_only_rejects_unequal_pair() {
        let data = DataTable::new("uneven", vec![Dataset::new(column("x", 10), column("y", 9))]);
        let resolver = ColumnPairingResolver::new();
        match resolver.resolve(&data) {
            Err(DataError::DataFormat(msg)) => {
                assert_eq!(msg, "X and Y data have different array lengths")
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(resolver.probe(&data).is_none());
    }

    #[test]
    fn test_separated_prefixes_with_units() {
        let data = DataTable::from_columns(
            "export",
            vec![
                column("x_A (m)", 4),
                column("y_A (m)", 4),
                column("x_B [cm]", 4),
                column("y_B [cm]", 4),
            ],
        );
        let resolved = ColumnPairingResolver::new().resolve(&data).unwrap();
        let names: Vec<&str> = resolved.pairs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(resolved.primary().x.name, "x_A (m)");
        assert_eq!(resolved.pairs[1].y.name, "y_B [cm]");
        assert!(resolved.time.is_none());
    }

    #[test]
    fn test_display_names_disambiguate() {
        let data = table(vec![("x", "y"), ("x", "y"), ("xB", "yB")]);
        let resolved = ColumnPairingResolver::new().resolve(&data).unwrap();
        assert_eq!(resolved.display_names(), vec!["", "2", "B"]);
    }

    #[test]
    fn test_follower_series_carry_time() {
        let data = table(vec![("t", "xA"), ("yA", "xB"), ("yB", "t")]);
        let resolved = ColumnPairingResolver::new().resolve(&data).unwrap();
        let followers = resolved.follower_series().unwrap();
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].0, "B");
        assert_eq!(followers[0].1.t().map(|t| t.len()), Some(3));
    }
}
