//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the study endpoints and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        CourseTreeResponse, ErrorResponse, FramePayload, LessonNodeResponse, RunScriptPayload,
        StudyRecordResponse,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::run_script,
        handlers::lesson_tree,
        handlers::study_record,
    ),
    components(
        schemas(RunScriptPayload, FramePayload, CourseTreeResponse, LessonNodeResponse, StudyRecordResponse, ErrorResponse)
    ),
    tags(
        (name = "Tutor API", description = "Lesson playback and study progress")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/study/run", post(handlers::run_script))
        .route("/study/tree", get(handlers::lesson_tree))
        .route("/study/record", get(handlers::study_record))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
