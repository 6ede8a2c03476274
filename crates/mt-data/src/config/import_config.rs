//! Import configuration for external tables

use serde::{Serialize, Deserialize};

use super::null_handling::NullConfig;

/// How a delimited text table is read
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImportConfig {
    /// Field delimiter; `None` picks tab when the header line has one,
    /// otherwise comma
    pub delimiter: Option<u8>,

    /// Lines to skip before the header (0-indexed header line)
    pub header_line: usize,

    /// Whether the table has a header row; without one every column is
    /// anonymous
    pub has_headers: bool,

    /// Lines starting with this byte are ignored
    pub comment: Option<u8>,

    /// Null value handling
    pub null_config: NullConfig,

    /// Rows parsed between two cancellation checks
    pub cancel_check_interval: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            delimiter: None,
            header_line: 0,
            has_headers: true,
            comment: Some(b'#'),
            null_config: NullConfig::default(),
            cancel_check_interval: 1000,
        }
    }
}

impl ImportConfig {
    /// Configuration for tab-separated text such as a pasted spreadsheet
    /// selection
    pub fn tab_separated() -> Self {
        Self {
            delimiter: Some(b'\t'),
            ..Self::default()
        }
    }

    /// Resolve the delimiter for a table whose header line is `header`
    pub fn delimiter_for(&self, header: &str) -> u8 {
        match self.delimiter {
            Some(delimiter) => delimiter,
            None if header.contains('\t') => b'\t',
            None if !header.contains(',') && header.contains(';') => b';',
            None => b',',
        }
    }

    /// Parse one cell, mapping nulls and unparseable text to NaN
    pub fn parse_cell(&self, value: &str) -> f64 {
        if self.null_config.is_null(value) {
            return f64::NAN;
        }
        value.trim().parse::<f64>().unwrap_or(f64::NAN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delimiter_detection() {
        let config = ImportConfig::default();
        assert_eq!(config.delimiter_for("t\tx\ty"), b'\t');
        assert_eq!(config.delimiter_for("t;x;y"), b';');
        assert_eq!(config.delimiter_for("t,x,y"), b',');
        assert_eq!(ImportConfig::tab_separated().delimiter_for("t,x"), b'\t');
    }

    #[test]
    fn test_parse_cell() {
        let config = ImportConfig::default();
        assert_eq!(config.parse_cell(" 2.5 "), 2.5);
        assert!(config.parse_cell("N/A").is_nan());
        assert!(config.parse_cell("abc").is_nan());
    }
}
