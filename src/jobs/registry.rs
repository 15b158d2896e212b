//! In-memory job table
//!
//! The registry is the only place job state changes. Mutations take the write
//! lock; reads share the read lock. Filesystem work happens outside the lock.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::error::RegistryError;
use super::model::{Job, JobId, JobRequest, JobState, Transition};
use crate::storage::{ArtifactStore, StorageError};

/// Id collisions tolerated before giving up on `create`
const MAX_ID_ATTEMPTS: usize = 3;

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Outcome of one sweep pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub expired: usize,
    pub dirs_removed: usize,
}

/// Job counts per state, for health reporting
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StateCounts {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub expired: usize,
}

impl StateCounts {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.succeeded + self.failed + self.expired
    }
}

pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
    store: ArtifactStore,
    retention: TimeDelta,
}

impl JobRegistry {
    pub fn new(store: ArtifactStore, retention: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            store,
            retention: TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Allocate an id and working directory and register a `Pending` job
    pub async fn create(&self, request: JobRequest) -> Result<Job> {
        self.create_at(request, Utc::now()).await
    }

    /// [`create`](Self::create) with an explicit clock
    ///
    /// The directory is created without holding the table lock; the entry is
    /// inserted only once the directory exists.
    pub async fn create_at(&self, request: JobRequest, now: DateTime<Utc>) -> Result<Job> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = JobId::new();
            if self.jobs.read().await.contains_key(&id) {
                continue;
            }

            let working_dir = match self.store.create_job_dir(&id).await {
                Ok(dir) => dir,
                Err(StorageError::AlreadyExists(dir)) => {
                    warn!(job_id = %id, dir = %dir.display(), "Working directory already exists, picking a new id");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let expires_at = now.checked_add_signed(self.retention).unwrap_or(DateTime::<Utc>::MAX_UTC);
            let job = Job::new(id.clone(), request.clone(), working_dir, now, expires_at);

            let inserted = match self.jobs.write().await.entry(id) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(job.clone());
                    true
                }
            };

            if !inserted {
                self.remove_dir_logged(&job).await;
                continue;
            }

            debug!(job_id = %job.id, expires_at = %job.expires_at, "Job registered");
            return Ok(job);
        }

        Err(RegistryError::IdExhausted)
    }

    pub async fn get(&self, id: &JobId) -> Result<Job> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Apply a state change
    ///
    /// A failed job loses its working directory before the new state becomes
    /// visible. Expiring a job this way also prunes it, as a sweep would.
    pub async fn transition(&self, id: &JobId, transition: Transition) -> Result<Job> {
        self.transition_at(id, transition, Utc::now()).await
    }

    pub async fn transition_at(
        &self,
        id: &JobId,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<Job> {
        let target = transition.target();

        // Terminal moves drop the directory first, outside the table lock
        if matches!(target, JobState::Failed | JobState::Expired) {
            let job = self.get(id).await?;
            check_edge(&job, target)?;
            self.remove_dir_logged(&job).await;
        }

        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        check_edge(job, target)?;

        job.apply(transition, now)
            .map_err(|(from, to)| RegistryError::InvalidTransition {
                id: id.clone(),
                from,
                to,
            })?;

        let snapshot = job.clone();
        if target == JobState::Expired {
            jobs.remove(id);
        }

        debug!(job_id = %id, state = %snapshot.state, "Job transitioned");
        Ok(snapshot)
    }

    /// Expire one job if it is finished and due
    ///
    /// Returns whether the job was expired. Unknown ids are a no-op.
    pub async fn expire(&self, id: &JobId, now: DateTime<Utc>) -> bool {
        let job = {
            let mut jobs = self.jobs.write().await;
            match jobs.get(id) {
                Some(job) if job.is_due(now) => jobs.remove(id),
                _ => None,
            }
        };

        match job {
            Some(job) => {
                self.remove_dir_logged(&job).await;
                info!(job_id = %id, "Job expired");
                true
            }
            None => false,
        }
    }

    /// Expire every finished job whose deadline has passed
    ///
    /// Entries leave the table under the write lock; their directories are
    /// removed afterwards so the lock is not held across the deletions.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> SweepStats {
        let due: Vec<Job> = {
            let mut jobs = self.jobs.write().await;
            let ids: Vec<JobId> = jobs
                .values()
                .filter(|job| job.is_due(now))
                .map(|job| job.id.clone())
                .collect();
            ids.iter().filter_map(|id| jobs.remove(id)).collect()
        };

        let mut stats = SweepStats {
            expired: due.len(),
            ..SweepStats::default()
        };

        for job in &due {
            if self.remove_dir_logged(job).await {
                stats.dirs_removed += 1;
            }
        }

        if stats.expired > 0 {
            info!(expired = stats.expired, dirs_removed = stats.dirs_removed, "Sweep complete");
        }

        stats
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    pub async fn state_counts(&self) -> StateCounts {
        let jobs = self.jobs.read().await;
        let mut counts = StateCounts::default();
        for job in jobs.values() {
            match job.state {
                JobState::Pending => counts.pending += 1,
                JobState::Running => counts.running += 1,
                JobState::Succeeded => counts.succeeded += 1,
                JobState::Failed => counts.failed += 1,
                JobState::Expired => counts.expired += 1,
            }
        }
        counts
    }

    /// Drop every job and its working directory
    pub async fn purge(&self) -> usize {
        let jobs: Vec<Job> = self.jobs.write().await.drain().map(|(_, job)| job).collect();
        for job in &jobs {
            self.remove_dir_logged(job).await;
        }

        if !jobs.is_empty() {
            info!(count = jobs.len(), "Registry purged");
        }
        jobs.len()
    }

    /// Best-effort directory removal; failures are logged, not returned
    async fn remove_dir_logged(&self, job: &Job) -> bool {
        match self.store.remove_dir(&job.working_dir).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Failed to remove working directory");
                false
            }
        }
    }
}

fn check_edge(job: &Job, target: JobState) -> Result<()> {
    if job.state.can_transition_to(target) {
        Ok(())
    } else {
        Err(RegistryError::InvalidTransition {
            id: job.id.clone(),
            from: job.state,
            to: target,
        })
    }
}
