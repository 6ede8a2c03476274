//! Markers for missing measurements in tracking exports

use serde::{Serialize, Deserialize};

/// Cells that mean "no measurement at this row".
///
/// Markers are compared after trimming, ignoring ASCII case. Missing cells
/// load as NaN, so the row keeps its place in the series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NullConfig {
    pub markers: Vec<String>,
}

impl Default for NullConfig {
    fn default() -> Self {
        Self::with_markers(&["", "-", "N/A", "NaN", "null", "None"])
    }
}

impl NullConfig {
    pub fn with_markers(markers: &[&str]) -> Self {
        Self {
            markers: markers.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// True if the cell holds no measurement
    pub fn is_null(&self, cell: &str) -> bool {
        let cell = cell.trim();
        self.markers.iter().any(|m| cell.eq_ignore_ascii_case(m))
    }

    /// Treat another marker as missing, e.g. a tracker's `-999` sentinel
    pub fn add_marker(&mut self, marker: impl Into<String>) {
        let marker = marker.into();
        if !self.markers.iter().any(|m| m.eq_ignore_ascii_case(&marker)) {
            self.markers.push(marker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_markers() {
        let config = NullConfig::default();
        assert!(config.is_null(" n/a "));
        assert!(config.is_null(""));
        assert!(config.is_null("nan"));
        assert!(!config.is_null("0"));
    }

    #[test]
    fn test_added_marker_is_not_duplicated() {
        let mut config = NullConfig::with_markers(&[]);
        assert!(!config.is_null(""));
        config.add_marker("lost");
        config.add_marker("LOST");
        config.add_marker("-999");
        assert_eq!(config.markers.len(), 2);
        assert!(config.is_null(" Lost"));
        assert!(config.is_null("-999"));
    }
}
