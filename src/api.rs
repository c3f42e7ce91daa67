//! HTTP surface for docpoll.
//!
//! Every route requires the shared secret in the `api_key` header:
//!
//! - `POST /webhook` – Multipart upload with a `file` field holding a PDF. Stores the file,
//!   queues text extraction, and returns `{"file_id": "..."}`.
//! - `GET /polling/{file_id}` – Returns `{"status": "processing"}` while extraction runs and
//!   `{"data": "..."}` once it finished (extraction errors are reported as data too).
//! - `GET /metrics` – Job counters for this process.
//!
//! Errors always come back as `{"detail": "..."}` with a fixed message per failure kind.

use crate::jobs::JobId;
use crate::service::{IngestError, JobApi, PollError, PollStatus, Upload};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Path, Request, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::PathRejection,
    },
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Header carrying the shared secret.
pub const API_KEY_HEADER: &str = "api_key";

/// Extra body allowance on top of the upload limit for multipart framing and other fields.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

struct AppState<S> {
    service: Arc<S>,
    api_key: Arc<str>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            api_key: self.api_key.clone(),
        }
    }
}

/// Build the HTTP router exposing the upload and polling API.
pub fn create_router<S>(service: Arc<S>, api_key: impl Into<String>) -> Router
where
    S: JobApi + 'static,
{
    let body_limit = service.max_upload_bytes().saturating_add(MULTIPART_OVERHEAD);
    let state = AppState {
        service,
        api_key: Arc::from(api_key.into()),
    };

    Router::new()
        .route("/webhook", post(receive_pdf::<S>))
        .route("/polling/:file_id", get(get_pdf_data::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key::<S>,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Reject requests whose `api_key` header does not exactly match the configured secret.
async fn require_api_key<S>(
    State(state): State<AppState<S>>,
    request: Request,
    next: Next,
) -> Response
where
    S: JobApi + 'static,
{
    let authorized = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|provided| provided == &*state.api_key);

    if !authorized {
        tracing::warn!(path = %request.uri().path(), "Rejected request with invalid API key");
        return AppError::Unauthorized.into_response();
    }
    next.run(request).await
}

/// Success response for `POST /webhook`.
#[derive(Serialize)]
struct UploadResponse {
    file_id: String,
}

/// Accept a PDF upload and queue it for extraction.
async fn receive_pdf<S>(
    State(state): State<AppState<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError>
where
    S: JobApi,
{
    tracing::info!("Entering webhook API");
    let multipart = multipart.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let upload = read_upload(multipart, state.service.max_upload_bytes()).await?;
    let file_id = state.service.submit(upload).await?;
    Ok(Json(UploadResponse {
        file_id: file_id.to_string(),
    }))
}

/// Pull the `file` field out of the form.
///
/// Reading stops as soon as more than `max_bytes` arrived; the truncated upload is still handed
/// to the service so it fails size validation after the media type and extension checks.
async fn read_upload(mut multipart: Multipart, max_bytes: usize) -> Result<Upload, AppError> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await? {
            bytes.extend_from_slice(&chunk);
            if bytes.len() > max_bytes {
                break;
            }
        }

        return Ok(Upload {
            filename,
            content_type,
            bytes,
        });
    }
    Err(AppError::MissingFile)
}

/// Response body for `GET /polling/{file_id}`.
#[derive(Serialize)]
#[serde(untagged)]
enum PollResponse {
    Processing { status: &'static str },
    Ready { data: String },
}

/// Report whether a job is still processing or return its extracted text.
async fn get_pdf_data<S>(
    State(state): State<AppState<S>>,
    file_id: Result<Path<String>, PathRejection>,
) -> Result<Json<PollResponse>, AppError>
where
    S: JobApi,
{
    tracing::info!("Entering polling API");
    let Path(file_id) = file_id.map_err(|rejection| {
        tracing::warn!(error = %rejection, "Malformed polling path");
        AppError::BadRequest(rejection.body_text())
    })?;
    let status = state.service.poll(&JobId::from(file_id)).await?;
    Ok(Json(match status {
        PollStatus::Processing => PollResponse::Processing {
            status: "processing",
        },
        PollStatus::Ready(data) => PollResponse::Ready { data },
    }))
}

/// Return the job counters for this process.
async fn get_metrics<S>(State(state): State<AppState<S>>) -> impl IntoResponse
where
    S: JobApi,
{
    Json(state.service.metrics_snapshot())
}

enum AppError {
    Unauthorized,
    MissingFile,
    BadRequest(String),
    Ingest(IngestError),
    Poll(PollError),
}

impl AppError {
    fn status_and_detail(&self) -> (StatusCode, String) {
        match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "Invalid API Key".into()),
            Self::MissingFile => (StatusCode::BAD_REQUEST, "No file uploaded.".into()),
            Self::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail.clone()),
            Self::Ingest(IngestError::StorageFailure(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process the uploaded file.".into(),
            ),
            Self::Ingest(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Self::Poll(PollError::NotFound) => (StatusCode::NOT_FOUND, "File not found".into()),
            Self::Poll(PollError::StorageUnavailable(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch file data.".into(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = self.status_and_detail();
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(inner: IngestError) -> Self {
        Self::Ingest(inner)
    }
}

impl From<PollError> for AppError {
    fn from(inner: PollError) -> Self {
        Self::Poll(inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        if inner.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::Ingest(IngestError::FileTooLarge)
        } else {
            tracing::warn!(error = %inner, "Malformed multipart upload");
            Self::BadRequest(inner.body_text())
        }
    }
}
