//! Artifact lookup for download requests
//!
//! Read-only against the registry: serving a file never moves its deadline.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::fs::File;
use tracing::debug;

use super::model::JobId;
use super::registry::JobRegistry;
use crate::storage::{StorageError, media_type_for};

#[derive(Debug, Error)]
pub enum FetchError {
    /// Unknown, unfinished, expired, renamed or missing on disk
    #[error("artifact not found for job {0}")]
    NotFound(JobId),

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

/// An open artifact ready to be streamed
#[derive(Debug)]
pub struct ArtifactStream {
    pub file: File,
    pub len: u64,
    pub filename: String,
    pub media_type: &'static str,
}

/// Resolve a job's artifact if it is servable at `now`
///
/// When `expected_filename` is given it must match the stored name exactly.
pub async fn fetch(
    registry: &JobRegistry,
    id: &JobId,
    expected_filename: Option<&str>,
    now: DateTime<Utc>,
) -> Result<ArtifactStream, FetchError> {
    let not_found = || FetchError::NotFound(id.clone());

    let job = registry.get(id).await.map_err(|_| not_found())?;
    if !job.is_servable(now) {
        debug!(job_id = %id, state = %job.state, "Artifact not servable");
        return Err(not_found());
    }

    let Some(artifact) = job.artifact else {
        return Err(not_found());
    };

    if expected_filename.is_some_and(|name| name != artifact.filename) {
        debug!(job_id = %id, "Requested filename does not match artifact");
        return Err(not_found());
    }

    let Some((file, len)) = registry.store().open(&artifact.path).await? else {
        debug!(job_id = %id, path = %artifact.path.display(), "Artifact missing on disk");
        return Err(not_found());
    };

    Ok(ArtifactStream {
        file,
        len,
        media_type: media_type_for(&artifact.filename),
        filename: artifact.filename,
    })
}
