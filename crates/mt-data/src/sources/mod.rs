//! Sources of external tables

pub mod csv_source;
pub mod text_source;

pub use csv_source::{read_table, CsvSource};
pub use text_source::TextSource;

use async_trait::async_trait;
use mt_core::CancelFlag;

use crate::config::ImportConfig;
use crate::table::DataTable;
use crate::DataError;

/// Anything that can produce a table of columns for a data track
#[async_trait]
pub trait ExternalSource: Send + Sync {
    /// Read the whole table. Implementations poll `cancel` while parsing and
    /// return [`DataError::ImportCancelled`] once it is set.
    async fn load(&self, config: &ImportConfig, cancel: &CancelFlag) -> Result<DataTable, DataError>;

    /// Get the source name/path
    fn source_name(&self) -> &str;
}
