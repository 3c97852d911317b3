//! Scrape job endpoints: submission, status polling, archive download.
//!
//! Wire contract: every error is a `400` with a JSON `error` field,
//! submission answers `202` with the job handle, status answers with
//! `status` / `zip_filename` / `error` / `imagesCount`.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::JobSnapshot;
use crate::services::orchestrator::ScrapeError;

#[derive(Debug, Deserialize, Validate)]
pub struct StartScrapeRequest {
    #[garde(required, inner(length(min = 1)))]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartScrapeResponse {
    pub job_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct JobQuery {
    pub job_id: Option<Uuid>,
}

/// Error envelope: everything the caller can get wrong is a 400 with a
/// human-readable message.
pub struct ApiError(ScrapeError);

impl From<ScrapeError> for ApiError {
    fn from(e: ScrapeError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

/// POST /start_scrape: submit a URL, get a job handle back immediately.
pub async fn start_scrape(
    State(state): State<AppState>,
    Json(request): Json<StartScrapeRequest>,
) -> Result<(StatusCode, Json<StartScrapeResponse>), ApiError> {
    request.validate().map_err(|_| ScrapeError::InvalidInput)?;
    let url = request.url.as_deref().unwrap_or_default();
    let job_id = state.orchestrator.submit(url)?;
    Ok((StatusCode::ACCEPTED, Json(StartScrapeResponse { job_id })))
}

/// GET /job_status?job_id=ID: poll a job.
pub async fn job_status(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<Json<JobSnapshot>, ApiError> {
    let job_id = query.job_id.ok_or(ScrapeError::NotFound)?;
    let snapshot = state.orchestrator.status(job_id)?;
    Ok(Json(snapshot))
}

/// GET /download_result?job_id=ID: stream the finished job's archive.
pub async fn download_result(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<Response, ApiError> {
    let job_id = query.job_id.ok_or(ScrapeError::NotFound)?;
    let (path, filename) = state.orchestrator.result_path(job_id)?;

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ScrapeError::NotReady)?;
    let body = Body::from_stream(ReaderStream::new(file));

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "application/zip")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(body)
        .map_err(|_| ScrapeError::NotReady)?;
    Ok(response)
}
