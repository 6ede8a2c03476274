use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Builder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use csv::{ReaderBuilder, Trim};
use mt_core::CancelFlag;
use tracing::{debug, info};

use super::ExternalSource;
use crate::config::ImportConfig;
use crate::table::{DataTable, ANONYMOUS_COLUMN};
use crate::DataError;

/// Delimited text file on disk
pub struct CsvSource {
    /// Path to the CSV file
    path: PathBuf,
    name: String,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ExternalSource for CsvSource {
    async fn load(&self, config: &ImportConfig, cancel: &CancelFlag) -> Result<DataTable, DataError> {
        info!("Loading {}", self.path.display());
        let path = self.path.clone();
        let name = self.name.clone();
        let config = config.clone();
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || {
            let file = File::open(&path)?;
            read_table(&name, file, &config, &cancel)
        })
        .await?
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

/// Parse delimited text into a table.
///
/// Blank, null-pattern and unparseable cells become NaN. Rows longer than the
/// header add unnamed `?` columns. The cancel flag is polled every
/// `cancel_check_interval` rows.
pub fn read_table<R: Read>(
    name: &str,
    reader: R,
    config: &ImportConfig,
    cancel: &CancelFlag,
) -> Result<DataTable, DataError> {
    let mut reader = BufReader::new(reader);

    let mut skipped = String::new();
    for _ in 0..config.header_line {
        skipped.clear();
        if reader.read_line(&mut skipped)? == 0 {
            break;
        }
    }

    // The first non-comment line picks the delimiter, then goes back in
    // front of the rest
    let mut header = String::new();
    loop {
        header.clear();
        if reader.read_line(&mut header)? == 0 {
            break;
        }
        let is_comment = config
            .comment
            .map_or(false, |c| header.as_bytes().first() == Some(&c));
        if !is_comment {
            break;
        }
    }
    let delimiter = config.delimiter_for(&header);

    let mut csv_reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(config.has_headers)
        .comment(config.comment)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(Cursor::new(header.into_bytes()).chain(reader));

    let mut names: Vec<String> = if config.has_headers {
        csv_reader
            .headers()?
            .iter()
            .map(|h| if h.is_empty() { ANONYMOUS_COLUMN.to_string() } else { h.to_string() })
            .collect()
    } else {
        Vec::new()
    };
    let mut builders: Vec<Float64Builder> = names.iter().map(|_| Float64Builder::new()).collect();

    let mut rows = 0usize;
    for result in csv_reader.records() {
        let record = result?;
        if config.cancel_check_interval > 0
            && rows % config.cancel_check_interval == 0
            && cancel.is_cancelled()
        {
            debug!("Import of '{}' cancelled after {} rows", name, rows);
            return Err(DataError::ImportCancelled);
        }

        while builders.len() < record.len() {
            let mut builder = Float64Builder::new();
            builder.append_nulls(rows);
            builders.push(builder);
            names.push(ANONYMOUS_COLUMN.to_string());
        }

        for (i, builder) in builders.iter_mut().enumerate() {
            let value = record.get(i).map_or(f64::NAN, |cell| config.parse_cell(cell));
            if value.is_nan() {
                builder.append_null();
            } else {
                builder.append_value(value);
            }
        }
        rows += 1;
    }

    if cancel.is_cancelled() {
        return Err(DataError::ImportCancelled);
    }
    if names.is_empty() {
        return Ok(DataTable::new(name, Vec::new()));
    }

    let fields: Vec<Field> = names
        .iter()
        .map(|n| Field::new(n.as_str(), DataType::Float64, true))
        .collect();
    let arrays: Vec<ArrayRef> = builders
        .iter_mut()
        .map(|b| Arc::new(b.finish()) as ArrayRef)
        .collect();
    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?;

    debug!("Read {} rows x {} columns from '{}'", rows, names.len(), name);
    DataTable::from_record_batch(name, &batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairing::ColumnPairingResolver;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn read(text: &str, config: &ImportConfig) -> Result<DataTable, DataError> {
        read_table("test", text.as_bytes(), config, &CancelFlag::new())
    }

    #[test]
    fn test_reads_header_and_values() {
        let table = read("t,x,y\n0,1,2\n0.1,1.5,2.5\n", &ImportConfig::default()).unwrap();
        let names: Vec<&str> = table.columns().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["t", "x", "t", "y"]);
        assert_eq!(table.datasets[1].y.values, vec![2.0, 2.5]);
    }

    #[test]
    fn test_tab_separated_with_comment_and_blanks() {
        let text = "# exported\nxA\tyA\n1\t2\n3\t\n5\t6\n";
        let table = read(text, &ImportConfig::default()).unwrap();
        let y = &table.datasets[0].y.values;
        assert_eq!(y.len(), 3);
        assert!(y[1].is_nan());
    }

    #[test]
    fn test_ragged_columns_and_extra_cells() {
        let text = "x,y\n1,2\n3\n5,,7\n";
        let table = read(text, &ImportConfig::default()).unwrap();
        assert_eq!(table.datasets[0].x.row_count(), 3);
        assert_eq!(table.datasets[0].y.row_count(), 3);
        assert!(table.datasets[0].y.values[1].is_nan());
        assert_eq!(table.datasets[1].y.name, ANONYMOUS_COLUMN);
        let extra = &table.datasets[1].y.values;
        assert_eq!(extra.len(), 3);
        assert!(extra[0].is_nan());
        assert_eq!(extra[2], 7.0);
    }

    #[test]
    fn test_missing_cells_in_last_row_stay_in_place() {
        let resolver = ColumnPairingResolver::new();

        let table = read("t,x,y\n0,1,2\n1,3,4\n2,NaN,NaN\n", &ImportConfig::default()).unwrap();
        let resolved = resolver.resolve(&table).unwrap();
        assert_eq!(resolved.primary().len(), Some(3));
        assert!(resolved.primary().x.values[2].is_nan());
        assert_eq!(resolved.time.as_ref().map(|t| t.row_count()), Some(3));

        let table = read("x,y\n0,1\n1,\n", &ImportConfig::default()).unwrap();
        let resolved = resolver.resolve(&table).unwrap();
        assert_eq!(resolved.primary().len(), Some(2));
        assert!(resolved.primary().y.values[1].is_nan());

        let table = read("t,x,y\n0,NaN,NaN\n1,1,2\n2,3,4\n", &ImportConfig::default()).unwrap();
        assert_eq!(resolver.resolve(&table).unwrap().primary().len(), Some(3));
    }

    #[test]
    fn test_header_line_and_no_headers() {
        let config = ImportConfig {
            header_line: 1,
            has_headers: false,
            ..ImportConfig::default()
        };
        let table = read("title line\n1,2\n3,4\n", &config).unwrap();
        assert!(table.columns().all(|c| c.name == ANONYMOUS_COLUMN));
        assert_eq!(table.datasets[0].x.values, vec![1.0, 3.0]);
    }

    #[test]
    fn test_cancelled_read() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let config = ImportConfig {
            cancel_check_interval: 1,
            ..ImportConfig::default()
        };
        let result = read_table("test", "x,y\n1,2\n".as_bytes(), &config, &cancel);
        assert!(matches!(result, Err(DataError::ImportCancelled)));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "time,x,y").unwrap();
        writeln!(file, "0,0,0").unwrap();
        writeln!(file, "0.5,1,1").unwrap();

        let source = CsvSource::new(file.path());
        let table = source
            .load(&ImportConfig::default(), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(table.datasets.len(), 2);
        assert_eq!(source.source_name(), table.name);
    }
}
