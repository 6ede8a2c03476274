use std::sync::Arc;

use async_trait::async_trait;
use mt_core::CancelFlag;

use super::{read_table, ExternalSource};
use crate::config::ImportConfig;
use crate::table::DataTable;
use crate::DataError;

/// Text pasted from the clipboard, usually a tab-separated spreadsheet
/// selection
pub struct TextSource {
    name: String,
    text: Arc<str>,
}

impl TextSource {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text: String = text.into();
        Self {
            name: name.into(),
            text: Arc::from(text),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[async_trait]
impl ExternalSource for TextSource {
    async fn load(&self, config: &ImportConfig, cancel: &CancelFlag) -> Result<DataTable, DataError> {
        if self.text.trim().is_empty() {
            return Err(DataError::format("Pasted text contains no data"));
        }
        let name = self.name.clone();
        let text = Arc::clone(&self.text);
        let config = config.clone();
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || read_table(&name, text.as_bytes(), &config, &cancel)).await?
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairing::ColumnPairingResolver;

    #[tokio::test]
    async fn test_pasted_selection_resolves() {
        let source = TextSource::new("clipboard", "t\tx\ty\n0\t1\t2\n1\t3\t4\n");
        let table = source
            .load(&ImportConfig::default(), &CancelFlag::new())
            .await
            .unwrap();
        let resolved = ColumnPairingResolver::new().resolve(&table).unwrap();
        assert_eq!(resolved.primary().x.values, vec![1.0, 3.0]);
        assert!(resolved.time.is_some());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_large_paste_parses_off_the_runtime_thread() {
        let mut text = String::from("t\tx\ty\n");
        for i in 0..5000 {
            text.push_str(&format!("{}\t{}\t{}\n", i as f64 * 0.01, i, 2 * i));
        }
        let source = TextSource::new("clipboard", text);
        let table = source
            .load(&ImportConfig::default(), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(table.datasets[0].x.row_count(), 5000);

        let cancel = CancelFlag::new();
        cancel.cancel();
        let config = ImportConfig {
            cancel_check_interval: 100,
            ..ImportConfig::default()
        };
        let result = source.load(&config, &cancel).await;
        assert!(matches!(result, Err(DataError::ImportCancelled)));
    }

    #[tokio::test]
    async fn test_blank_text_is_rejected() {
        let source = TextSource::new("clipboard", "  \n");
        let result = source.load(&ImportConfig::default(), &CancelFlag::new()).await;
        assert!(matches!(result, Err(DataError::DataFormat(_))));
    }
}
