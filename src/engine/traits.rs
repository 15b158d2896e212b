use async_trait::async_trait;

use super::error::EngineError;
use super::types::{Artifact, EngineRequest};

/// Pluggable media extraction backend
///
/// One call is one attempt: retrying is the runner's job. Implementations
/// must write only inside `request.output_dir` and must fold every
/// engine-specific failure into an [`EngineError`] before returning.
#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Fetch one media item into the request's output directory
    async fn fetch(&self, request: &EngineRequest) -> Result<Artifact, EngineError>;
}
