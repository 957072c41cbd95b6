use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::{make_span_with_request_id, request_id_middleware};

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Models
        .route("/train", post(handlers::train))
        .route("/models/status", get(handlers::model_status))
        // Recommendations and progress
        .route(
            "/recommendations/:student_id",
            get(handlers::get_recommendations),
        )
        .route(
            "/students/:student_id/progress",
            get(handlers::get_student_progress),
        )
        // Engagement
        .route("/interactions", post(handlers::log_interaction))
        .route(
            "/metrics/content-performance",
            get(handlers::content_performance),
        )
        .route("/dataset/refresh", post(handlers::refresh_dataset))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
