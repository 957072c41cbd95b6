//! Best-effort persistence of trained artifacts.
//!
//! Three blobs are stored under fixed logical names: the CF model, the fitted
//! TF-IDF vectorizer and the CBF similarity matrix. Loading fails open: any
//! missing, unreadable or stale artifact makes the caller retrain instead.

use std::fmt::Display;

use crate::error::AppResult;
use crate::models::Course;
use crate::services::collaborative::CfModel;
use crate::services::content::{ContentModel, SimilarityMatrix, TfidfVectorizer};

pub mod file;
pub mod redis;

pub use self::file::FileArtifactStore;
pub use self::redis::RedisArtifactStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKey {
    CfModel,
    Vectorizer,
    SimilarityMatrix,
}

impl ArtifactKey {
    pub const ALL: [ArtifactKey; 3] = [
        ArtifactKey::CfModel,
        ArtifactKey::Vectorizer,
        ArtifactKey::SimilarityMatrix,
    ];

    /// Fixed logical name of the artifact
    pub fn name(&self) -> &'static str {
        match self {
            ArtifactKey::CfModel => "cf_model",
            ArtifactKey::Vectorizer => "tfidf_vectorizer",
            ArtifactKey::SimilarityMatrix => "cbf_similarity_matrix",
        }
    }
}

impl Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "artifact:{}", self.name())
    }
}

/// Durable blob storage for model artifacts
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Returns `None` when the artifact has never been saved
    async fn load(&self, key: ArtifactKey) -> AppResult<Option<Vec<u8>>>;

    async fn save(&self, key: ArtifactKey, bytes: Vec<u8>) -> AppResult<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Serializes and stores all three artifacts
pub async fn save_models(
    store: &dyn ArtifactStore,
    cf: &CfModel,
    content: &ContentModel,
) -> AppResult<()> {
    store
        .save(ArtifactKey::CfModel, serde_json::to_vec(cf)?)
        .await?;
    store
        .save(ArtifactKey::Vectorizer, serde_json::to_vec(content.vectorizer())?)
        .await?;
    store
        .save(
            ArtifactKey::SimilarityMatrix,
            serde_json::to_vec(content.similarity())?,
        )
        .await?;

    tracing::info!(backend = store.name(), "Model artifacts saved");
    Ok(())
}

/// Loads all three artifacts, or `None` if any of them is unusable
pub async fn load_models(
    store: &dyn ArtifactStore,
    courses: &[Course],
) -> Option<(CfModel, ContentModel)> {
    let mut blobs = Vec::with_capacity(ArtifactKey::ALL.len());
    for key in ArtifactKey::ALL {
        match store.load(key).await {
            Ok(Some(bytes)) => blobs.push(bytes),
            Ok(None) => {
                tracing::info!(artifact = key.name(), "Saved artifact missing");
                return None;
            }
            Err(e) => {
                tracing::warn!(artifact = key.name(), error = %e, "Saved artifact unreadable");
                return None;
            }
        }
    }

    let decoded = (|| -> AppResult<(CfModel, ContentModel)> {
        let cf: CfModel = serde_json::from_slice(&blobs[0])?;
        let vectorizer: TfidfVectorizer = serde_json::from_slice(&blobs[1])?;
        let similarity: SimilarityMatrix = serde_json::from_slice(&blobs[2])?;
        let content = ContentModel::from_parts(vectorizer, similarity, courses)?;
        Ok((cf, content))
    })();

    match decoded {
        Ok(models) => {
            tracing::info!(backend = store.name(), "Model artifacts loaded");
            Some(models)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Saved artifacts rejected");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::services::collaborative::CfParams;
    use crate::services::matrix::RatingMatrix;
    use crate::services::testing::{course, interaction};
    use mockall::predicate::eq;

    fn trained() -> (CfModel, ContentModel, Vec<Course>) {
        let courses = vec![course(10, "rust ownership"), course(11, "rust async")];
        let matrix = RatingMatrix::build(&[
            interaction(1, 10, Some(4.0)),
            interaction(2, 11, Some(3.0)),
        ]);
        let params = CfParams {
            factors: 3,
            epochs: 5,
            ..CfParams::default()
        };
        let cf = CfModel::train(&matrix, params).unwrap();
        let content = ContentModel::fit(&courses).unwrap();
        (cf, content, courses)
    }

    #[test]
    fn test_artifact_key_names() {
        assert_eq!(ArtifactKey::CfModel.name(), "cf_model");
        assert_eq!(ArtifactKey::Vectorizer.name(), "tfidf_vectorizer");
        assert_eq!(
            ArtifactKey::SimilarityMatrix.to_string(),
            "artifact:cbf_similarity_matrix"
        );
    }

    #[tokio::test]
    async fn test_missing_artifact_fails_open() {
        let (_, _, courses) = trained();
        let mut store = MockArtifactStore::new();
        store
            .expect_load()
            .with(eq(ArtifactKey::CfModel))
            .returning(|_| Ok(None));
        store.expect_name().return_const("mock");

        assert!(load_models(&store, &courses).await.is_none());
    }

    #[tokio::test]
    async fn test_unreadable_artifact_fails_open() {
        let (_, _, courses) = trained();
        let mut store = MockArtifactStore::new();
        store
            .expect_load()
            .returning(|_| Err(AppError::Internal("disk on fire".to_string())));
        store.expect_name().return_const("mock");

        assert!(load_models(&store, &courses).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_artifact_fails_open() {
        let (_, _, courses) = trained();
        let mut store = MockArtifactStore::new();
        store
            .expect_load()
            .returning(|_| Ok(Some(b"not json".to_vec())));
        store.expect_name().return_const("mock");

        assert!(load_models(&store, &courses).await.is_none());
    }

    #[tokio::test]
    async fn test_save_writes_all_three_artifacts() {
        let (cf, content, _) = trained();
        let mut store = MockArtifactStore::new();
        for key in ArtifactKey::ALL {
            store
                .expect_save()
                .withf(move |k, bytes| *k == key && !bytes.is_empty())
                .times(1)
                .returning(|_, _| Ok(()));
        }
        store.expect_name().return_const("mock");

        tokio_test::assert_ok!(save_models(&store, &cf, &content).await);
    }
}
