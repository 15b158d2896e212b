use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::model::{JobId, JobState};
use crate::storage::StorageError;

/// Error taxonomy shared by every layer
///
/// Engine-specific failures are folded into these kinds at the adapter
/// boundary; nothing past it inspects engine output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    EngineTransient,
    EngineFatal,
    InternalStorage,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::EngineTransient => "ENGINE_TRANSIENT",
            ErrorKind::EngineFatal => "ENGINE_FATAL",
            ErrorKind::InternalStorage => "INTERNAL_STORAGE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Classified failure recorded on a `Failed` job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    /// Caller-facing message
    pub message: String,
    /// Raw detail from the failing component, kept for operators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl JobFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobState,
        to: JobState,
    },

    #[error("could not allocate a unique job id")]
    IdExhausted,

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::NotFound(_) => ErrorKind::NotFound,
            RegistryError::InvalidTransition { .. } | RegistryError::IdExhausted => {
                ErrorKind::InternalStorage
            }
            RegistryError::Storage(_) => ErrorKind::InternalStorage,
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("service is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl SubmitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubmitError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            SubmitError::ShuttingDown => ErrorKind::InternalStorage,
            SubmitError::Registry(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_codes() {
        assert_eq!(ErrorKind::InvalidArgument.code(), "INVALID_ARGUMENT");
        assert_eq!(ErrorKind::EngineFatal.to_string(), "ENGINE_FATAL");
        assert_eq!(
            serde_json::to_string(&ErrorKind::EngineTransient).unwrap(),
            "\"ENGINE_TRANSIENT\""
        );
    }

    #[test]
    fn test_failure_detail_is_optional_on_the_wire() {
        let failure = JobFailure::new(ErrorKind::EngineFatal, "Video unavailable or removed.");
        let json = serde_json::to_value(&failure).unwrap();
        assert!(json.get("detail").is_none());

        let failure = failure.with_detail("ERROR: [youtube] abc: Video unavailable");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "ENGINE_FATAL");
        assert!(json["detail"].as_str().unwrap().contains("abc"));
    }
}
