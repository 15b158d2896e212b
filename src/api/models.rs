//! Wire models for the MediaBox HTTP API
//!
//! - `POST /jobs` accepts a [`SubmitJobRequest`] and answers with [`JobAcceptedResponse`]
//! - `GET /jobs/{job_id}` returns a [`JobSnapshot`]
//! - `GET /health` returns a [`HealthResponse`]
//!
//! ```json
//! { "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ", "quality": "720p" }
//! ```

use serde::{Deserialize, Serialize};
use url::Url;

use crate::jobs::{ErrorKind, Job, JobFailure, JobState, Quality, StateCounts};
use crate::observability::MetricsSnapshot;

use super::utils::join_url;

#[derive(Debug, Deserialize, Clone)]
pub struct SubmitJobRequest {
    pub url: String,
    /// Kept as a string so unknown values surface as `INVALID_ARGUMENT`
    pub quality: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobAcceptedResponse {
    pub job_id: String,
    pub status_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobSnapshot {
    pub job_id: String,
    pub state: JobState,
    pub quality: Quality,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub attempts: u32,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl JobSnapshot {
    /// Render a job for callers; the download link appears only while servable
    pub fn from_job(job: &Job, public_base_url: &Url, now: chrono::DateTime<chrono::Utc>) -> Self {
        let artifact = job.artifact.as_ref();
        let link = artifact
            .filter(|_| job.is_servable(now))
            .map(|a| download_url(public_base_url, job.id.as_str(), &a.filename));

        Self {
            job_id: job.id.to_string(),
            state: job.state,
            quality: job.quality,
            source_url: job.source_url.clone(),
            filename: artifact.map(|a| a.filename.clone()),
            title: artifact.and_then(|a| a.title.clone()),
            download_url: link,
            error: job.error.as_ref().map(JobError::from),
            attempts: job.attempts,
            created_at: job.created_at,
            updated_at: job.updated_at,
            expires_at: job.expires_at,
        }
    }
}

/// Failure as shown to callers; the raw engine detail stays in the logs
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&JobFailure> for JobError {
    fn from(failure: &JobFailure) -> Self {
        Self {
            kind: failure.kind,
            message: failure.message.clone(),
        }
    }
}

pub fn status_url(public_base_url: &Url, job_id: &str) -> String {
    join_url(public_base_url, &["jobs", job_id]).into()
}

pub fn download_url(public_base_url: &Url, job_id: &str, filename: &str) -> String {
    join_url(public_base_url, &["download", job_id, filename]).into()
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub jobs: StateCounts,
    pub metrics: MetricsSnapshot,
}
