use std::path::Path;

use tracing::info;

use crate::table::{Dataset, Row, TableError, extract_unique_rows};

/// Session state: the loaded dataset, if any.
#[derive(Debug, Default)]
pub struct AppState {
    dataset: Option<Dataset>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any previously loaded dataset.
    pub fn load_dataset(&mut self, path: &Path) -> Result<(), TableError> {
        self.clear();
        let dataset = Dataset::load(path)?;
        info!(
            path = %path.display(),
            records = dataset.record_count(),
            columns = dataset.column_count(),
            "dataset loaded"
        );
        self.dataset = Some(dataset);
        Ok(())
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn clear(&mut self) {
        self.dataset = None;
    }

    /// Distinct rows over `selected`; `Ok(None)` when nothing is loaded or selected.
    pub fn unique_rows(&self, selected: &[String]) -> Result<Option<Vec<Row>>, TableError> {
        match &self.dataset {
            Some(dataset) => extract_unique_rows(dataset, selected),
            None => Ok(None),
        }
    }
}
