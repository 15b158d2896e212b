//! Periodic expiry sweep

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::registry::JobRegistry;
use crate::observability::Metrics;

/// Sweep the registry every `interval` until `shutdown` fires
///
/// Backstop for the per-job timers: anything finished and past its deadline
/// is expired here even if its timer never ran.
pub async fn run(
    registry: Arc<JobRegistry>,
    metrics: Arc<Metrics>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    info!(?interval, "Expiry sweeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.cancelled() => break,
        }

        let stats = registry.sweep_expired(Utc::now()).await;
        metrics.jobs_expired(stats.expired);
        debug!(expired = stats.expired, "Sweep pass finished");
    }

    info!("Expiry sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Artifact;
    use crate::jobs::{JobRequest, Transition};
    use crate::storage::ArtifactStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sweeper_expires_and_stops() {
        let temp_dir = TempDir::new().unwrap();
        let registry = Arc::new(JobRegistry::new(
            ArtifactStore::new(temp_dir.path()),
            Duration::from_millis(10),
        ));
        let metrics = Arc::new(Metrics::new());

        let job = registry
            .create(JobRequest::parse("https://youtu.be/abc", "720p").unwrap())
            .await
            .unwrap();
        let path = job.working_dir.join("clip.mp4");
        std::fs::write(&path, b"x").unwrap();
        registry.transition(&job.id, Transition::Start).await.unwrap();
        registry
            .transition(
                &job.id,
                Transition::Succeed {
                    artifact: Artifact {
                        path,
                        filename: "clip.mp4".to_string(),
                        title: None,
                    },
                    attempts: 1,
                },
            )
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run(
            registry.clone(),
            metrics.clone(),
            Duration::from_millis(20),
            shutdown.clone(),
        ));

        tokio::time::timeout(Duration::from_secs(5), async {
            while metrics.snapshot().jobs_expired == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert!(registry.is_empty().await);
        assert!(!job.working_dir.exists());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
