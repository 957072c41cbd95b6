use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::RequestId;
use crate::models::{
    ContentPerformance, Interaction, ModelStatus, NewInteraction, RecommendationResponse,
    StudentId, StudentProgress,
};
use crate::services::engine::{DatasetSummary, TrainingReport};

use super::extract::{AppJson, AppPath, AppQuery};
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub n: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub models_ready: bool,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        models_ready: state.engine.model_status().await.ready,
    })
}

/// Retrain both models from the current dataset
pub async fn train(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> AppResult<Json<TrainingReport>> {
    tracing::info!(request_id = %request_id, "Training requested");
    let report = state.engine.train_models().await?;
    Ok(Json(report))
}

pub async fn get_recommendations(
    State(state): State<AppState>,
    AppPath(student_id): AppPath<i64>,
    AppQuery(query): AppQuery<RecommendationQuery>,
) -> AppResult<Json<RecommendationResponse>> {
    let response = state
        .engine
        .get_recommendations(StudentId(student_id), query.n)
        .await?;
    Ok(Json(response))
}

/// Append one engagement record
pub async fn log_interaction(
    State(state): State<AppState>,
    AppJson(payload): AppJson<NewInteraction>,
) -> AppResult<(StatusCode, Json<Interaction>)> {
    let record = state.engine.log_interaction(payload).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get_student_progress(
    State(state): State<AppState>,
    AppPath(student_id): AppPath<i64>,
) -> AppResult<Json<StudentProgress>> {
    let progress = state
        .engine
        .get_student_progress(StudentId(student_id))
        .await?;
    Ok(Json(progress))
}

pub async fn content_performance(State(state): State<AppState>) -> Json<ContentPerformance> {
    Json(state.engine.content_performance().await)
}

/// Reload students, courses and the interaction log from the store
pub async fn refresh_dataset(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> AppResult<Json<DatasetSummary>> {
    tracing::info!(request_id = %request_id, "Dataset refresh requested");
    let summary = state.engine.refresh_dataset().await?;
    Ok(Json(summary))
}

pub async fn model_status(State(state): State<AppState>) -> Json<ModelStatus> {
    Json(state.engine.model_status().await)
}
