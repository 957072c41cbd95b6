use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::models::{CourseId, StudentId};

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Models are not ready: train or load them first")]
    ModelNotReady,

    #[error("Unknown student: {0}")]
    UnknownStudent(StudentId),

    #[error("Unknown course: {0}")]
    UnknownCourse(CourseId),

    #[error("Invalid interaction: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable error kind reported to callers
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Schema(_) => "SchemaError",
            AppError::InsufficientData(_) => "InsufficientDataError",
            AppError::ModelNotReady => "ModelNotReadyError",
            AppError::UnknownStudent(_) => "UnknownStudentError",
            AppError::UnknownCourse(_) => "UnknownCourseError",
            AppError::Validation(_) => "ValidationError",
            AppError::Database(_) => "DatabaseError",
            AppError::Cache(_) => "CacheError",
            AppError::Io(_) => "IoError",
            AppError::Csv(_) => "CsvError",
            AppError::Serialization(_) => "SerializationError",
            AppError::Internal(_) => "InternalError",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::UnknownStudent(_) | AppError::UnknownCourse(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Schema(_) | AppError::InsufficientData(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::ModelNotReady => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_)
            | AppError::Cache(_)
            | AppError::Io(_)
            | AppError::Csv(_)
            | AppError::Serialization(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

pub type AppResult<T> = Result<T, AppError>;
