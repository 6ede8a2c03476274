//! External data handling for the motion tracking data model
//!
//! Tables arrive from files or pasted text, are presented as ordered
//! two-column datasets, and are searched for x/y(/t) coordinate columns.

pub mod config;
pub mod import;
pub mod pairing;
pub mod sources;
pub mod table;

use arrow::error::ArrowError;
use tokio::task::JoinError;
use thiserror::Error;

// Re-exports
pub use config::{ImportConfig, NullConfig};
pub use import::{ImportWorker, ImportOutcome};
pub use pairing::{ColumnPairingResolver, PointPair, ResolvedData, display_names};
pub use sources::{CsvSource, ExternalSource, TextSource};
pub use table::{DataTable, Dataset, ExternalDataSeries};

/// Errors that can occur in data operations
#[derive(Error, Debug)]
pub enum DataError {
    /// Malformed, missing or length-mismatched external data
    #[error("Data format error: {0}")]
    DataFormat(String),

    /// The user cancelled a background import
    #[error("Import cancelled")]
    ImportCancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(ArrowError),

    #[error("CSV parsing error: {0}")]
    Csv(String),

    #[error("Join error: {0}")]
    Join(#[from] JoinError),

    #[error("Other error: {0}")]
    Other(String),
}

impl DataError {
    /// Shorthand for a data format error
    pub fn format(message: impl Into<String>) -> Self {
        DataError::DataFormat(message.into())
    }

    /// True for errors that are discarded without telling the user
    pub fn is_silent(&self) -> bool {
        matches!(self, DataError::ImportCancelled)
    }
}

impl From<csv::Error> for DataError {
    fn from(error: csv::Error) -> Self {
        match error.kind() {
            csv::ErrorKind::Io(io_err) => DataError::Io(std::io::Error::new(io_err.kind(), error.to_string())),
            _ => DataError::Csv(error.to_string()),
        }
    }
}

impl From<ArrowError> for DataError {
    fn from(error: ArrowError) -> Self {
        DataError::Arrow(error)
    }
}
