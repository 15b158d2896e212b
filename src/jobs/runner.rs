//! Background execution of submitted jobs

use bon::{Builder, bon};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::error::SubmitError;
use super::model::{Job, JobId, JobRequest, Transition};
use super::registry::JobRegistry;
use super::sweeper;
use crate::config::RunnerConfig;
use crate::engine::{Artifact, EngineError, EngineRequest, ExtractionEngine};
use crate::observability::Metrics;

const SHUTTING_DOWN: &str = "service shutting down";

/// Bounded retry with exponential backoff for transient engine failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
pub struct RetryPolicy {
    /// Total engine invocations allowed, including the first
    #[builder(default = 5)]
    pub max_attempts: u32,
    #[builder(default = Duration::from_secs(1))]
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based): base, 2x, 4x, ...
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<&RunnerConfig> for RetryPolicy {
    fn from(config: &RunnerConfig) -> Self {
        Self::builder()
            .max_attempts(config.max_attempts)
            .base_backoff(config.base_backoff.as_duration())
            .build()
    }
}

/// Accepts submissions and drives each job through the engine
///
/// Cloning is cheap; clones share the registry, the concurrency limit and the
/// shutdown token.
#[derive(Clone)]
pub struct JobRunner {
    registry: Arc<JobRegistry>,
    engine: Arc<dyn ExtractionEngine>,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
    metrics: Arc<Metrics>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

#[bon]
impl JobRunner {
    #[builder]
    pub fn new(
        registry: Arc<JobRegistry>,
        engine: Arc<dyn ExtractionEngine>,
        #[builder(default)] retry: RetryPolicy,
        #[builder(default = 4)] max_concurrent_jobs: usize,
        #[builder(default)] metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            engine,
            retry,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            metrics,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }
}

impl JobRunner {
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Validate, register and schedule a job; returns without waiting on the engine
    pub async fn submit(&self, source_url: &str, quality: &str) -> Result<JobId, SubmitError> {
        if self.shutdown.is_cancelled() {
            return Err(SubmitError::ShuttingDown);
        }

        let request = JobRequest::parse(source_url, quality)?;
        let job = self.registry.create(request).await?;
        self.metrics.job_submitted();

        info!(
            job_id = %job.id,
            quality = %job.quality,
            url = %job.source_url,
            engine = self.engine.name(),
            "Job accepted"
        );

        let id = job.id.clone();
        let runner = self.clone();
        self.tracker.spawn(async move { runner.execute(job).await });

        Ok(id)
    }

    async fn execute(self, job: Job) {
        let id = job.id.clone();

        let permit = tokio::select! {
            permit = self.permits.clone().acquire_owned() => permit,
            _ = self.shutdown.cancelled() => {
                debug!(job_id = %id, "Shutdown before job started");
                return;
            }
        };
        let Ok(_permit) = permit else {
            return;
        };

        if let Err(e) = self.registry.transition(&id, Transition::Start).await {
            error!(job_id = %id, error = %e, "Failed to start job");
            return;
        }
        info!(job_id = %id, "Job running");

        let request = EngineRequest::new(job.source_url.clone(), job.quality, job.working_dir.clone());
        let (result, attempts) = self.invoke_with_retry(&id, &request).await;

        let transition = match result {
            Ok(artifact) => match confine_artifact(&job, artifact).await {
                Ok(artifact) => Transition::Succeed { artifact, attempts },
                Err(e) => Transition::Fail {
                    failure: e.to_failure(),
                    attempts,
                },
            },
            Err(e) => Transition::Fail {
                failure: e.to_failure(),
                attempts,
            },
        };

        match self.registry.transition(&id, transition).await {
            Ok(finished) => {
                match &finished.error {
                    None => {
                        self.metrics.job_succeeded();
                        info!(
                            job_id = %id,
                            attempts,
                            filename = finished.filename().unwrap_or_default(),
                            "Job succeeded"
                        );
                    }
                    Some(failure) => {
                        self.metrics.job_failed();
                        warn!(
                            job_id = %id,
                            attempts,
                            kind = %failure.kind,
                            error = failure.detail.as_deref().unwrap_or(&failure.message),
                            "Job failed"
                        );
                    }
                }
                self.schedule_expiry(id, finished.expires_at);
            }
            Err(e) => error!(job_id = %id, error = %e, "Failed to record job outcome"),
        }
    }

    /// Run the engine until success, a non-transient failure, or the attempt cap
    ///
    /// Returns the final result together with the number of invocations made.
    async fn invoke_with_retry(
        &self,
        id: &JobId,
        request: &EngineRequest,
    ) -> (Result<Artifact, EngineError>, u32) {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = tokio::select! {
                result = self.engine.fetch(request) => result,
                _ = self.shutdown.cancelled() => {
                    return (Err(EngineError::transient(SHUTTING_DOWN)), attempt);
                }
            };

            match result {
                Ok(artifact) => {
                    if attempt > 1 {
                        debug!(job_id = %id, attempt, "Engine succeeded after retry");
                    }
                    return (Ok(artifact), attempt);
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    self.metrics.engine_retry();
                    let backoff = self.retry.backoff_for(attempt);
                    warn!(job_id = %id, attempt, ?backoff, error = %e, "Engine attempt failed, retrying");

                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = self.shutdown.cancelled() => {
                            return (Err(EngineError::transient(SHUTTING_DOWN)), attempt);
                        }
                    }
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(job_id = %id, attempts = attempt, error = %e, "Engine retries exhausted");
                    }
                    return (Err(e), attempt);
                }
            }
        }
    }

    /// One-shot expiry at the job's deadline
    fn schedule_expiry(&self, id: JobId, expires_at: DateTime<Utc>) {
        let registry = self.registry.clone();
        let metrics = self.metrics.clone();
        let shutdown = self.shutdown.clone();

        self.tracker.spawn(async move {
            let delay = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => return,
            }

            // The timer fired at the deadline; don't let clock drift postpone it
            let now = Utc::now().max(expires_at);
            if registry.expire(&id, now).await {
                metrics.jobs_expired(1);
            }
        });
    }

    /// Start the periodic sweep; it stops on shutdown
    pub fn start_sweeper(&self, interval: Duration) {
        let registry = self.registry.clone();
        let metrics = self.metrics.clone();
        let shutdown = self.shutdown.clone();

        self.tracker
            .spawn(async move { sweeper::run(registry, metrics, interval, shutdown).await });
    }

    /// Stop accepting work, abandon in-flight jobs, wait for tasks, purge storage
    pub async fn shutdown(&self) {
        info!(tasks = self.tracker.len(), "Shutting down job runner");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        let purged = self.registry.purge().await;
        info!(purged, "Job runner stopped");
    }
}

/// Keep the artifact inside the job's working directory
///
/// The stored path is rebuilt from the working directory so that it stays
/// comparable with the storage root regardless of how the engine spelled it.
async fn confine_artifact(job: &Job, artifact: Artifact) -> Result<Artifact, EngineError> {
    let storage = |detail: String| EngineError::Storage(detail);

    let dir = tokio::fs::canonicalize(&job.working_dir)
        .await
        .map_err(|e| storage(format!("{}: {e}", job.working_dir.display())))?;
    let path = tokio::fs::canonicalize(&artifact.path)
        .await
        .map_err(|e| storage(format!("{}: {e}", artifact.path.display())))?;

    if path.parent() != Some(dir.as_path()) {
        return Err(storage(format!(
            "artifact {} is outside the working directory",
            path.display()
        )));
    }

    Ok(Artifact {
        path: job.working_dir.join(&artifact.filename),
        ..artifact
    })
}
