use tokio::sync::RwLock;

use super::store::{Dataset, DatasetStore};
use crate::error::AppResult;
use crate::models::Interaction;

/// Dataset store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryDatasetStore {
    inner: RwLock<Dataset>,
}

impl MemoryDatasetStore {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            inner: RwLock::new(dataset),
        }
    }

    /// Copy of the current tables
    pub async fn snapshot(&self) -> Dataset {
        self.inner.read().await.clone()
    }

    /// Replaces the tables, as an external catalog or registration change would
    pub async fn replace(&self, dataset: Dataset) {
        *self.inner.write().await = dataset;
    }
}

#[async_trait::async_trait]
impl DatasetStore for MemoryDatasetStore {
    async fn load(&self) -> AppResult<Dataset> {
        Ok(self.snapshot().await)
    }

    async fn append_interaction(&self, record: &Interaction) -> AppResult<()> {
        self.inner.write().await.interactions.push(record.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
