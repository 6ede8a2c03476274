//! Background import of external tables
//!
//! Parsing runs off the event loop; the finished table is posted back through
//! a oneshot channel and committed by the caller. Nothing a reader can see is
//! written from the worker.

use std::sync::Arc;

use mt_core::CancelFlag;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::{debug, warn};

use crate::config::ImportConfig;
use crate::sources::ExternalSource;
use crate::table::DataTable;
use crate::DataError;

/// Result of a finished import
#[derive(Debug)]
pub enum ImportOutcome {
    Loaded { source_name: String, table: DataTable },
    /// The user cancelled; nothing is reported
    Cancelled,
    Failed { source_name: String, error: DataError },
}

impl ImportOutcome {
    fn from_result(source_name: String, result: Result<DataTable, DataError>) -> Self {
        match result {
            Ok(table) => ImportOutcome::Loaded { source_name, table },
            Err(error) if error.is_silent() => ImportOutcome::Cancelled,
            Err(error) => ImportOutcome::Failed { source_name, error },
        }
    }

    /// The loaded table, if any
    pub fn table(&self) -> Option<&DataTable> {
        match self {
            ImportOutcome::Loaded { table, .. } => Some(table),
            _ => None,
        }
    }
}

/// Handle to an import running on the Tokio runtime
pub struct ImportWorker {
    source_name: String,
    cancel: CancelFlag,
    receiver: oneshot::Receiver<Result<DataTable, DataError>>,
}

impl ImportWorker {
    /// Start loading `source` in the background. Must be called from within a
    /// Tokio runtime.
    pub fn spawn(source: Arc<dyn ExternalSource>, config: ImportConfig, cancel: CancelFlag) -> Self {
        let source_name = source.source_name().to_string();
        let (sender, receiver) = oneshot::channel();
        let task_cancel = cancel.clone();

        debug!("Starting background import of '{}'", source_name);
        tokio::spawn(async move {
            let result = source.load(&config, &task_cancel).await;
            let result = match result {
                Ok(_) if task_cancel.is_cancelled() => Err(DataError::ImportCancelled),
                other => other,
            };
            if sender.send(result).is_err() {
                debug!("Import of '{}' finished after its handle was dropped", source.source_name());
            }
        });

        Self {
            source_name,
            cancel,
            receiver,
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Ask the worker to stop; the outcome becomes [`ImportOutcome::Cancelled`]
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the import to finish
    pub async fn finish(self) -> ImportOutcome {
        let result = match self.receiver.await {
            Ok(result) => result,
            Err(_) => {
                warn!("Import worker for '{}' stopped without a result", self.source_name);
                Err(DataError::Other("import worker stopped".to_string()))
            }
        };
        ImportOutcome::from_result(self.source_name, result)
    }

    /// Non-blocking poll for the event loop: `None` while still running
    pub fn try_finish(&mut self) -> Option<ImportOutcome> {
        let result = match self.receiver.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Closed) => Err(DataError::Other("import worker stopped".to_string())),
        };
        Some(ImportOutcome::from_result(self.source_name.clone(), result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{CsvSource, TextSource};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_import_file_in_background() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "t,x,y").unwrap();
        for i in 0..50 {
            writeln!(file, "{},{},{}", i as f64 * 0.1, i, i * 2).unwrap();
        }

        let source: Arc<dyn ExternalSource> = Arc::new(CsvSource::new(file.path()));
        let worker = ImportWorker::spawn(source, ImportConfig::default(), CancelFlag::new());
        match worker.finish().await {
            ImportOutcome::Loaded { table, .. } => {
                assert_eq!(table.datasets[0].x.row_count(), 50);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_import_is_silent() {
        let source: Arc<dyn ExternalSource> = Arc::new(TextSource::new("paste", "x\ty\n1\t2\n"));
        let worker = ImportWorker::spawn(source, ImportConfig::default(), CancelFlag::new());
        worker.cancel();
        assert!(matches!(worker.finish().await, ImportOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_failed_import_reports_error() {
        let source: Arc<dyn ExternalSource> = Arc::new(CsvSource::new("/nonexistent/motion.csv"));
        let worker = ImportWorker::spawn(source, ImportConfig::default(), CancelFlag::new());
        match worker.finish().await {
            ImportOutcome::Failed { source_name, error } => {
                assert_eq!(source_name, "motion");
                assert!(matches!(error, DataError::Io(_)));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
