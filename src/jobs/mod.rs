//! Job lifecycle: model, registry, runner, expiry and retrieval

pub mod error;
pub mod model;
pub mod registry;
pub mod retrieval;
pub mod runner;
pub mod sweeper;

pub use error::{ErrorKind, JobFailure, RegistryError, SubmitError};
pub use model::{Job, JobId, JobRequest, JobState, Quality, Transition};
pub use registry::{JobRegistry, StateCounts, SweepStats};
pub use retrieval::{ArtifactStream, FetchError, fetch};
pub use runner::{JobRunner, RetryPolicy};
