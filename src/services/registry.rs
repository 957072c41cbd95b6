use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};

use super::collaborative::CfModel;
use super::content::ContentModel;
use crate::error::{AppError, AppResult};
use crate::models::{ModelSource, TrainingState};

/// An immutable, published set of trained artifacts
#[derive(Debug)]
pub struct ModelSet {
    pub cf: Arc<CfModel>,
    pub content: Arc<ContentModel>,
    pub source: ModelSource,
    pub trained_at: DateTime<Utc>,
}

/// Owns the currently published models
///
/// Readers take a cheap `Arc` snapshot and never wait on training; a retrain
/// builds a complete new [`ModelSet`] and swaps the pointer in one step.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    current: RwLock<Option<Arc<ModelSet>>>,
    training: Mutex<()>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the published models
    pub async fn current(&self) -> AppResult<Arc<ModelSet>> {
        self.current
            .read()
            .await
            .clone()
            .ok_or(AppError::ModelNotReady)
    }

    pub async fn publish(&self, models: ModelSet) -> Arc<ModelSet> {
        let models = Arc::new(models);
        *self.current.write().await = Some(models.clone());
        tracing::info!(
            source = ?models.source,
            trained_at = %models.trained_at,
            "Models published"
        );
        models
    }

    /// Serializes training jobs; hold the guard for the whole job
    pub async fn begin_training(&self) -> MutexGuard<'_, ()> {
        self.training.lock().await
    }

    pub async fn state(&self) -> TrainingState {
        if self.training.try_lock().is_err() {
            TrainingState::Training
        } else if self.current.read().await.is_some() {
            TrainingState::Trained
        } else {
            TrainingState::Untrained
        }
    }
}
