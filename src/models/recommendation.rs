use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ContentType, CourseId, StudentId};

/// Why a course ended up in the list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reason {
    #[serde(rename = "rated highly by similar students")]
    Collaborative,
    #[serde(rename = "similar to courses you engaged with")]
    ContentSimilarity,
    #[serde(rename = "matches both similar students and your history")]
    Hybrid,
    #[serde(rename = "based on interests and popularity")]
    InterestsAndPopularity,
}

/// A single ranked course suggestion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub course_id: CourseId,
    pub course_name: String,
    pub confidence: f64,
    pub reason: Reason,
}

/// Which policy produced a recommendation list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Hybrid,
    ColdStart,
}

/// Payload returned by `get_recommendations`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub student_id: StudentId,
    pub strategy: Strategy,
    pub recommendations: Vec<Recommendation>,
    /// Normalized engagement score used for the boost
    pub engagement_score: f64,
    pub generated_at: DateTime<Utc>,
}

/// Learning progress summary for one student
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudentProgress {
    pub student_id: StudentId,
    pub engagement_score: f64,
    /// Mean quiz score on the 0-100 scale
    pub quiz_performance: f64,
    /// Content type with the best mean quiz score, if any
    pub preferred_content: Option<ContentType>,
    pub completed_courses: usize,
    pub ready_for_next: bool,
}

/// Aggregated engagement for one content type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentTypeStats {
    pub content_type: ContentType,
    pub interactions: usize,
    pub mean_quiz_score: f64,
    pub mean_time_spent: f64,
    pub mean_completion: f64,
    /// Mean per-record engagement over rated records
    pub mean_engagement_score: Option<f64>,
}

/// Mean time spent on one course
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CourseTime {
    pub course_id: CourseId,
    pub mean_time_spent: f64,
}

/// Catalog-wide engagement breakdown
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentPerformance {
    pub content_types: Vec<ContentTypeStats>,
    pub course_time: Vec<CourseTime>,
    pub avg_engagement_score: Option<f64>,
}

/// Where the currently published models came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    Trained,
    Loaded,
}

/// Lifecycle of the model registry as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingState {
    Untrained,
    Training,
    Trained,
}

/// Operation counters and timings since startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub training_runs: u64,
    pub last_training_ms: Option<f64>,
    pub total_training_ms: f64,
    pub recommendations_served: u64,
    pub mean_recommendation_ms: Option<f64>,
    pub interactions_logged: u64,
    /// Mean per-record engagement over rated records in the log
    pub avg_engagement_score: Option<f64>,
}

/// Snapshot of the model registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    pub ready: bool,
    pub state: TrainingState,
    pub source: Option<ModelSource>,
    pub trained_at: Option<DateTime<Utc>>,
    /// Holdout RMSE measured when the collaborative model was trained
    pub validation_rmse: Option<f64>,
    pub students: usize,
    pub courses: usize,
    pub interactions: usize,
    pub metrics: MetricsSnapshot,
}
