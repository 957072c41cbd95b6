use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use super::collaborative::{CfModel, CfParams};
use super::content::{self, Aggregation, ContentModel};
use super::engagement::{self, EngagementScorer};
use super::fusion;
use super::matrix::{CourseIndex, RatingMatrix};
use super::metrics::EngineMetrics;
use super::registry::{ModelRegistry, ModelSet};
use crate::db::{Dataset, DatasetStore};
use crate::error::{AppError, AppResult};
use crate::models::{
    ContentPerformance, Course, CourseId, Interaction, ModelSource, ModelStatus, NewInteraction,
    RecommendationResponse, Strategy, StudentId, StudentProgress,
};
use crate::persistence::{self, ArtifactStore};

const READY_ENGAGEMENT: f64 = 0.7;
const READY_QUIZ: f64 = 70.0;

/// Both thresholds are strict
fn ready_for_next(engagement_score: f64, quiz_performance: f64) -> bool {
    engagement_score > READY_ENGAGEMENT && quiz_performance > READY_QUIZ
}

/// Tuning knobs of the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub cf: CfParams,
    /// CF skips courses the student rated at or above this value
    pub exclude_rated_at_least: f64,
    pub cbf_aggregation: Aggregation,
    pub default_recommendations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cf: CfParams::default(),
            exclude_rated_at_least: 5.0,
            cbf_aggregation: Aggregation::Mean,
            default_recommendations: 5,
        }
    }
}

/// Outcome of a successful training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub students: usize,
    pub courses: usize,
    pub ratings: usize,
    pub vocabulary: usize,
    pub validation_rmse: Option<f64>,
    /// Whether the artifacts reached durable storage
    pub persisted: bool,
    pub trained_at: DateTime<Utc>,
}

/// Table sizes after a dataset reload
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub students: usize,
    pub courses: usize,
    pub interactions: usize,
    pub catalog_changed: bool,
}

/// Everything mutated by the incremental update path
#[derive(Debug, Default)]
struct DataState {
    dataset: Dataset,
    matrix: RatingMatrix,
    course_index: Arc<CourseIndex>,
}

impl DataState {
    fn from_dataset(dataset: Dataset) -> Self {
        Self {
            matrix: RatingMatrix::build(&dataset.interactions),
            course_index: Arc::new(CourseIndex::from_catalog(&dataset.courses)),
            dataset,
        }
    }
}

fn join_error(e: tokio::task::JoinError) -> AppError {
    AppError::Internal(format!("worker task failed: {}", e))
}

/// The hybrid recommendation engine
///
/// Owns the in-memory dataset, rating matrix and engagement cache behind a
/// single writer section, and reads trained models from a [`ModelRegistry`].
pub struct RecommendationEngine {
    store: Arc<dyn DatasetStore>,
    artifacts: Arc<dyn ArtifactStore>,
    config: EngineConfig,
    data: RwLock<DataState>,
    engagement: EngagementScorer,
    registry: ModelRegistry,
    metrics: EngineMetrics,
}

impl RecommendationEngine {
    pub fn new(
        store: Arc<dyn DatasetStore>,
        artifacts: Arc<dyn ArtifactStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            artifacts,
            config,
            data: RwLock::new(DataState::default()),
            engagement: EngagementScorer::new(),
            registry: ModelRegistry::new(),
            metrics: EngineMetrics::new(),
        }
    }

    /// Loads the dataset, then saved artifacts, falling back to training
    ///
    /// Only a dataset failure is fatal. A training failure leaves the engine
    /// serving `ModelNotReady` until a later `train_models` succeeds.
    pub async fn bootstrap(&self) -> AppResult<()> {
        let dataset = self.store.load().await?;
        let courses = dataset.courses.clone();
        *self.data.write().await = DataState::from_dataset(dataset);
        self.engagement.invalidate();

        if let Some((cf, content)) =
            persistence::load_models(self.artifacts.as_ref(), &courses).await
        {
            self.registry
                .publish(ModelSet {
                    cf: Arc::new(cf),
                    content: Arc::new(content),
                    source: ModelSource::Loaded,
                    trained_at: Utc::now(),
                })
                .await;
            return Ok(());
        }

        match self.train_models().await {
            Ok(report) => {
                tracing::info!(ratings = report.ratings, "Startup training complete");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Startup training failed, serving without models");
            }
        }
        Ok(())
    }

    /// Retrains CF and CBF from the current dataset and publishes them
    ///
    /// On failure the previously published models stay in place.
    pub async fn train_models(&self) -> AppResult<TrainingReport> {
        let _guard = self.registry.begin_training().await;
        let started = Instant::now();

        let (matrix, courses, students) = {
            let data = self.data.read().await;
            (
                data.matrix.clone(),
                data.dataset.courses.clone(),
                data.dataset.students.len(),
            )
        };
        if courses.is_empty() {
            return Err(AppError::InsufficientData(
                "course catalog is empty".to_string(),
            ));
        }
        let ratings = matrix.observed_count();
        tracing::info!(ratings, courses = courses.len(), "Training models");

        let params = self.config.cf;
        let cf_task = tokio::task::spawn_blocking(move || CfModel::train(&matrix, params));
        let catalog = courses.clone();
        let content_task = tokio::task::spawn_blocking(move || ContentModel::fit(&catalog));
        let (cf, content) = tokio::try_join!(cf_task, content_task).map_err(join_error)?;
        let (cf, content) = (cf?, content?);

        let persisted = match persistence::save_models(self.artifacts.as_ref(), &cf, &content).await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to persist model artifacts");
                false
            }
        };

        let report = TrainingReport {
            students,
            courses: courses.len(),
            ratings,
            vocabulary: content.vectorizer().vocabulary_len(),
            validation_rmse: cf.validation_rmse(),
            persisted,
            trained_at: Utc::now(),
        };
        self.registry
            .publish(ModelSet {
                cf: Arc::new(cf),
                content: Arc::new(content),
                source: ModelSource::Trained,
                trained_at: report.trained_at,
            })
            .await;

        let elapsed = started.elapsed();
        self.metrics.training_completed(elapsed);
        tracing::info!(
            elapsed_ms = elapsed.as_millis() as u64,
            rmse = ?report.validation_rmse,
            "Training finished"
        );
        Ok(report)
    }

    /// Ranked course suggestions for a student
    ///
    /// Students without any interaction take the cold-start path. Otherwise CF
    /// and CBF run on worker threads and are joined before fusion.
    pub async fn get_recommendations(
        &self,
        student_id: StudentId,
        n: Option<usize>,
    ) -> AppResult<RecommendationResponse> {
        let n = n.unwrap_or(self.config.default_recommendations);
        if n == 0 {
            return Err(AppError::Validation("n must be at least 1".to_string()));
        }

        let started = Instant::now();
        let response = self.recommend(student_id, n).await?;
        let elapsed = started.elapsed();
        self.metrics.recommendation_served(elapsed);
        tracing::debug!(
            student = %student_id,
            elapsed_us = elapsed.as_micros() as u64,
            "Recommendations served"
        );
        Ok(response)
    }

    async fn recommend(
        &self,
        student_id: StudentId,
        n: usize,
    ) -> AppResult<RecommendationResponse> {
        let data = self.data.read().await;
        let student = data
            .dataset
            .student(student_id)
            .ok_or(AppError::UnknownStudent(student_id))?;
        let models = self.registry.current().await?;

        let history = history_of(&data.dataset.interactions, student_id);
        let index = data.course_index.clone();

        if history.is_empty() {
            let profile_scores = models.content.profile_scores(&student.interest_profile());
            let popularity = fusion::popularity(&data.dataset.interactions);
            let candidates =
                fusion::cold_start(student, &data.dataset.courses, &profile_scores, &popularity);
            let recommendations = fusion::finalize(candidates, &index, &data.dataset.courses, n);

            tracing::debug!(
                student = %student_id,
                count = recommendations.len(),
                "Cold-start recommendations"
            );
            return Ok(RecommendationResponse {
                student_id,
                strategy: Strategy::ColdStart,
                recommendations,
                engagement_score: 0.0,
                generated_at: Utc::now(),
            });
        }

        let engagement_score = self.engagement.normalized(
            student_id,
            &data.dataset.interactions,
            &data.dataset.courses,
        );
        let rated = data.matrix.student_ratings(student_id).cloned();
        let exclude = self.config.exclude_rated_at_least;
        let aggregation = self.config.cbf_aggregation;

        let cf_task = {
            let cf = models.cf.clone();
            let index = index.clone();
            tokio::task::spawn_blocking(move || {
                cf.top_n(student_id, n, &index, rated.as_ref(), exclude)
            })
        };
        let cbf_task = {
            let content = models.content.clone();
            let index = index.clone();
            tokio::task::spawn_blocking(move || {
                content.top_n_for_history(&history, n, aggregation, &index)
            })
        };
        let (cf_candidates, cbf_candidates) =
            tokio::try_join!(cf_task, cbf_task).map_err(join_error)?;

        let candidates = fusion::fuse(&cf_candidates, &cbf_candidates, engagement_score);
        let recommendations = fusion::finalize(candidates, &index, &data.dataset.courses, n);

        tracing::debug!(
            student = %student_id,
            cf = cf_candidates.len(),
            cbf = cbf_candidates.len(),
            engagement = engagement_score,
            "Hybrid recommendations"
        );
        Ok(RecommendationResponse {
            student_id,
            strategy: Strategy::Hybrid,
            recommendations,
            engagement_score,
            generated_at: Utc::now(),
        })
    }

    /// Validates and appends one engagement record
    ///
    /// Store append, matrix insert and cache invalidation happen under one
    /// write lock; a rejected record leaves every piece of state untouched.
    /// Trained models are not touched.
    pub async fn log_interaction(&self, raw: NewInteraction) -> AppResult<Interaction> {
        let record = Interaction::try_from(raw)?;

        let mut data = self.data.write().await;
        if data.dataset.student(record.student_id).is_none() {
            return Err(AppError::UnknownStudent(record.student_id));
        }
        if data.dataset.course(record.course_id).is_none() {
            return Err(AppError::UnknownCourse(record.course_id));
        }

        self.store.append_interaction(&record).await?;
        data.dataset.interactions.push(record.clone());
        data.matrix.insert(&record);
        self.engagement.invalidate();
        self.metrics.interaction_logged();

        tracing::info!(
            student = %record.student_id,
            course = %record.course_id,
            log_len = data.dataset.interactions.len(),
            "Interaction logged"
        );
        Ok(record)
    }

    pub async fn get_student_progress(&self, student_id: StudentId) -> AppResult<StudentProgress> {
        let data = self.data.read().await;
        if data.dataset.student(student_id).is_none() {
            return Err(AppError::UnknownStudent(student_id));
        }

        let records = data.dataset.interactions_of(student_id);
        let catalog: HashMap<CourseId, &Course> =
            data.dataset.courses.iter().map(|c| (c.id, c)).collect();
        let engagement_score = self.engagement.normalized(
            student_id,
            &data.dataset.interactions,
            &data.dataset.courses,
        );
        let quiz_performance = engagement::quiz_performance(&records);

        Ok(StudentProgress {
            student_id,
            engagement_score,
            quiz_performance,
            preferred_content: engagement::preferred_content(&records, &catalog),
            completed_courses: engagement::completed_courses(&records),
            ready_for_next: ready_for_next(engagement_score, quiz_performance),
        })
    }

    pub async fn content_performance(&self) -> ContentPerformance {
        let data = self.data.read().await;
        engagement::content_performance(&data.dataset.interactions, &data.dataset.courses)
    }

    /// Reloads every table from the store
    ///
    /// `catalog_changed` compares the fingerprints of the old and new catalogs.
    /// A published content model that no longer matches the catalog is rebuilt
    /// and published next to the current CF model.
    pub async fn refresh_dataset(&self) -> AppResult<DatasetSummary> {
        let dataset = self.store.load().await?;
        let courses = dataset.courses.clone();
        let fingerprint = content::catalog_fingerprint(&courses);

        let summary = {
            let mut data = self.data.write().await;
            let catalog_changed =
                content::catalog_fingerprint(&data.dataset.courses) != fingerprint;
            *data = DataState::from_dataset(dataset);
            self.engagement.invalidate();
            DatasetSummary {
                students: data.dataset.students.len(),
                courses: data.dataset.courses.len(),
                interactions: data.dataset.interactions.len(),
                catalog_changed,
            }
        };

        let _guard = self.registry.begin_training().await;
        let current = match self.registry.current().await {
            Ok(models) if !models.content.matches_catalog(&courses) => models,
            _ => return Ok(summary),
        };
        if courses.is_empty() {
            tracing::warn!("Catalog emptied, keeping previous content model");
            return Ok(summary);
        }

        let catalog = courses.clone();
        let content = tokio::task::spawn_blocking(move || ContentModel::fit(&catalog))
            .await
            .map_err(join_error)??;
        if let Err(e) =
            persistence::save_models(self.artifacts.as_ref(), &current.cf, &content).await
        {
            tracing::warn!(error = %e, "Failed to persist refreshed content model");
        }
        self.registry
            .publish(ModelSet {
                cf: current.cf.clone(),
                content: Arc::new(content),
                source: current.source,
                trained_at: current.trained_at,
            })
            .await;

        tracing::info!(courses = courses.len(), "Content model rebuilt for new catalog");
        Ok(summary)
    }

    pub async fn model_status(&self) -> ModelStatus {
        let current = self.registry.current().await.ok();
        let state = self.registry.state().await;
        let data = self.data.read().await;
        let avg_engagement_score = engagement::average_engagement(&data.dataset.interactions);

        ModelStatus {
            ready: current.is_some(),
            state,
            source: current.as_ref().map(|m| m.source),
            trained_at: current.as_ref().map(|m| m.trained_at),
            validation_rmse: current.as_ref().and_then(|m| m.cf.validation_rmse()),
            students: data.dataset.students.len(),
            courses: data.dataset.courses.len(),
            interactions: data.dataset.interactions.len(),
            metrics: self.metrics.snapshot(avg_engagement_score),
        }
    }

    /// Normalized engagement score of a known student
    pub async fn engagement_score(&self, student_id: StudentId) -> AppResult<f64> {
        let data = self.data.read().await;
        if data.dataset.student(student_id).is_none() {
            return Err(AppError::UnknownStudent(student_id));
        }
        Ok(self.engagement.normalized(
            student_id,
            &data.dataset.interactions,
            &data.dataset.courses,
        ))
    }

    pub async fn interaction_count(&self) -> usize {
        self.data.read().await.dataset.interactions.len()
    }
}

/// Distinct courses a student interacted with, in first-seen order
fn history_of(log: &[Interaction], student: StudentId) -> Vec<CourseId> {
    let mut history = Vec::new();
    for record in log.iter().filter(|r| r.student_id == student) {
        if !history.contains(&record.course_id) {
            history.push(record.course_id);
        }
    }
    history
}
