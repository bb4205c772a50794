//! Axum Handlers for the REST API
//!
//! Playback is exposed as a Server-Sent-Events stream with one event per
//! Output Frame; the tree and record endpoints are plain JSON reads. It uses
//! `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse, Json, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::{Stream, StreamExt};
use std::{convert::Infallible, sync::Arc, time::Duration};
use tracing::{error, info};
use tutor_core::{Frame, PlaybackError};

use crate::{
    models::{
        CourseTreeResponse, ErrorResponse, FramePayload, RecordQuery, RunScriptPayload,
        StudyRecordResponse, TreeQuery,
    },
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn user_id(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest("x-user-id header is required".to_string()))
}

/// Turns one playback result into an SSE event. A failed step becomes an
/// `error` event; the engine stream ends right after it.
fn to_event(item: Result<Frame, PlaybackError>) -> Event {
    match item {
        Ok(frame) => Event::default()
            .json_data(FramePayload::from(frame))
            .unwrap_or_else(|err| Event::default().event("error").data(err.to_string())),
        Err(err) => {
            error!(error = %err, "Playback step failed");
            let body = ErrorResponse {
                message: err.to_string(),
            };
            Event::default()
                .event("error")
                .json_data(&body)
                .unwrap_or_else(|_| Event::default().event("error").data(body.message))
        }
    }
}

/// Run the learner's lesson until they must act.
#[utoipa::path(
    post,
    path = "/study/run",
    request_body = RunScriptPayload,
    responses(
        (status = 200, description = "Stream of output frames, one SSE event each", content_type = "text/event-stream", body = FramePayload),
        (status = 400, description = "Bad request", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the learner")
    )
)]
pub async fn run_script(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<RunScriptPayload>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let learner = user_id(&headers)?;
    let request = payload.into_request(learner).map_err(ApiError::BadRequest)?;
    info!(
        learner = %request.learner_id,
        course = %request.course_id,
        lesson = ?request.lesson_id,
        reply = request.reply.is_some(),
        "Playback requested"
    );

    let events = state
        .engine
        .play(request)
        .map(|item| Ok::<_, Infallible>(to_event(item)));
    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}

/// Get a course's lessons nested by code, with the learner's statuses.
#[utoipa::path(
    get,
    path = "/study/tree",
    responses(
        (status = 200, description = "Lesson tree", body = CourseTreeResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        TreeQuery,
        ("x-user-id" = String, Header, description = "The ID of the learner")
    )
)]
pub async fn lesson_tree(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TreeQuery>,
) -> Result<Json<CourseTreeResponse>, ApiError> {
    let learner = user_id(&headers)?;
    let tree = state
        .engine
        .lesson_tree(learner, &query.course_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("Course with id '{}' not found", query.course_id))
        })?;
    Ok(Json(tree.into()))
}

/// Get the learner's transcript for one lesson.
#[utoipa::path(
    get,
    path = "/study/record",
    responses(
        (status = 200, description = "Transcript in creation order", body = [StudyRecordResponse]),
        (status = 404, description = "No attendance for this lesson", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        RecordQuery,
        ("x-user-id" = String, Header, description = "The ID of the learner")
    )
)]
pub async fn study_record(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RecordQuery>,
) -> Result<Json<Vec<StudyRecordResponse>>, ApiError> {
    let learner = user_id(&headers)?;
    let records = state
        .engine
        .study_record(learner, &query.lesson_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "No study record for lesson '{}'",
                query.lesson_id
            ))
        })?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}
