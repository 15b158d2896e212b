//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tempfile::TempDir;

use mediabox::engine::{Artifact, EngineError, EngineRequest, ExtractionEngine, FatalReason};
use mediabox::jobs::{Job, JobId, JobRegistry, JobRunner, JobState, RetryPolicy};
use mediabox::observability::Metrics;
use mediabox::storage::ArtifactStore;

/// One scripted engine outcome
#[derive(Debug, Clone)]
pub enum Step {
    /// Write `bytes` to `filename` inside the output directory
    Produce { filename: String, bytes: Vec<u8> },
    Transient,
    Fatal(FatalReason),
}

impl Step {
    pub fn produce(filename: &str, bytes: &[u8]) -> Self {
        Step::Produce {
            filename: filename.to_string(),
            bytes: bytes.to_vec(),
        }
    }
}

/// In-process stand-in for yt-dlp that replays a script
///
/// Steps are consumed in order; once the script is empty `fallback` repeats.
pub struct ScriptedEngine {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    delay: Duration,
    calls: AtomicU32,
}

impl ScriptedEngine {
    pub fn new(script: Vec<Step>, fallback: Step) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    pub fn always(step: Step) -> Self {
        Self::new(Vec::new(), step)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, request: &EngineRequest) -> Result<Artifact, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match step {
            Step::Produce { filename, bytes } => {
                let path = request.output_dir.join(&filename);
                tokio::fs::write(&path, &bytes)
                    .await
                    .map_err(|e| EngineError::Storage(e.to_string()))?;
                Ok(Artifact {
                    path,
                    filename,
                    title: Some("Test Clip".to_string()),
                })
            }
            Step::Transient => Err(EngineError::transient("HTTP Error 429: Too Many Requests")),
            Step::Fatal(reason) => Err(EngineError::fatal(reason, "scripted failure")),
        }
    }
}

pub struct Harness {
    pub runner: JobRunner,
    pub registry: Arc<JobRegistry>,
    pub engine: Arc<ScriptedEngine>,
    pub metrics: Arc<Metrics>,
    pub temp_dir: TempDir,
}

/// Runner over a temp storage root with millisecond backoff
pub fn harness(engine: ScriptedEngine, retention: Duration, max_attempts: u32, max_concurrent: usize) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let registry = Arc::new(JobRegistry::new(
        ArtifactStore::new(temp_dir.path().join("jobs")),
        retention,
    ));
    let engine = Arc::new(engine);
    let metrics = Arc::new(Metrics::new());

    let runner = JobRunner::builder()
        .registry(registry.clone())
        .engine(engine.clone() as Arc<dyn ExtractionEngine>)
        .retry(
            RetryPolicy::builder()
                .max_attempts(max_attempts)
                .base_backoff(Duration::from_millis(5))
                .build(),
        )
        .max_concurrent_jobs(max_concurrent)
        .metrics(metrics.clone())
        .build();

    Harness {
        runner,
        registry,
        engine,
        metrics,
        temp_dir,
    }
}

/// Poll the registry until the job reaches `state`
pub async fn wait_for_state(registry: &JobRegistry, id: &JobId, state: JobState) -> Job {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Ok(job) = registry.get(id).await {
                if job.state == state {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job {id} never reached {state}"))
}

/// Poll until the job is gone from the registry
pub async fn wait_for_removal(registry: &JobRegistry, id: &JobId) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while registry.get(id).await.is_ok() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job {id} was never removed"));
}
