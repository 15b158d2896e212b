use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tokio_util::io::ReaderStream;

use super::{
    models::{HealthResponse, JobAcceptedResponse, JobSnapshot, SubmitJobRequest, status_url},
    state::AppState,
    utils::content_disposition,
};
use crate::api::error::ApiError;
use crate::jobs::{ArtifactStream, JobId, retrieval};

/// Job submission endpoint (POST /jobs)
///
/// Validates the request, registers a `Pending` job and returns
/// `202 Accepted` right away. The engine runs in the background; callers
/// poll `status_url` for the outcome.
pub async fn submit_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidArgument("missing Content-Type header".into()))?;
    super::utils::parse_content_type(content_type)?;

    let body_bytes = read_body(body, state.config.server.max_body_bytes).await?;
    let request: SubmitJobRequest = serde_json::from_slice(&body_bytes)?;

    let job_id = state.runner.submit(&request.url, &request.quality).await?;

    let response = JobAcceptedResponse {
        status_url: status_url(&state.public_base_url, job_id.as_str()),
        job_id: job_id.to_string(),
    };

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Reads the request body, refusing anything over `max_size`
///
/// Decompression is handled by `RequestDecompressionLayer`, so the limit
/// applies to the decoded payload.
async fn read_body(body: Body, max_size: usize) -> Result<Vec<u8>, ApiError> {
    let data = Limited::new(body, max_size)
        .collect()
        .await
        .map_err(|err| {
            if err.downcast_ref::<LengthLimitError>().is_some() {
                ApiError::PayloadTooLarge(max_size)
            } else {
                ApiError::InvalidArgument(format!("failed to read body: {err}"))
            }
        })?
        .to_bytes()
        .to_vec();

    super::utils::validate_body_size(&data, max_size)?;

    Ok(data)
}

/// Job status endpoint (GET /jobs/{job_id})
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.registry.get(&JobId::from(job_id)).await?;
    let snapshot = JobSnapshot::from_job(&job, &state.public_base_url, chrono::Utc::now());

    Ok((StatusCode::OK, Json(snapshot)))
}

/// Artifact download by job id alone (GET /jobs/{job_id}/file)
pub async fn job_file(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let artifact =
        retrieval::fetch(&state.registry, &JobId::from(job_id), None, chrono::Utc::now()).await?;

    stream_artifact(artifact)
}

/// Artifact download by job id and filename (GET /download/{job_id}/{filename})
pub async fn download_artifact(
    State(state): State<AppState>,
    Path((job_id, filename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let artifact = retrieval::fetch(
        &state.registry,
        &JobId::from(job_id),
        Some(&filename),
        chrono::Utc::now(),
    )
    .await?;

    stream_artifact(artifact)
}

fn stream_artifact(artifact: ArtifactStream) -> Result<Response, ApiError> {
    let disposition = HeaderValue::from_str(&content_disposition(&artifact.filename))
        .map_err(|e| ApiError::Internal(format!("invalid Content-Disposition: {e}")))?;

    let body = Body::from_stream(ReaderStream::new(artifact.file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, artifact.media_type)
        .header(header::CONTENT_LENGTH, artifact.len)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(body)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Health check endpoint (GET /health)
///
/// Reports job counts per state and the lifecycle counters. Read-only.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        jobs: state.registry.state_counts().await,
        metrics: state.metrics.snapshot(),
    };

    (StatusCode::OK, Json(response))
}
