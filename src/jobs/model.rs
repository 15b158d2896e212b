use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use super::error::{JobFailure, SubmitError};
use crate::engine::Artifact;

const MAX_SOURCE_URL_BYTES: usize = 2048;

/// Opaque job identifier (UUIDv7, so ids sort by creation time)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

/// Ids arriving from the outside are not validated; unknown ones simply miss
impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed set of quality levels a caller may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "highest")]
    Highest,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "audio-only", alias = "audio")]
    AudioOnly,
}

impl Quality {
    pub const ALL: [Quality; 4] = [
        Quality::Highest,
        Quality::P1080,
        Quality::P720,
        Quality::AudioOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Highest => "highest",
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
            Quality::AudioOnly => "audio-only",
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Quality::AudioOnly)
    }
}

impl FromStr for Quality {
    type Err = SubmitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "highest" => Ok(Quality::Highest),
            "1080p" => Ok(Quality::P1080),
            "720p" => Ok(Quality::P720),
            "audio-only" | "audio" => Ok(Quality::AudioOnly),
            other => Err(SubmitError::InvalidArgument(format!(
                "unsupported quality '{other}', expected one of: highest, 1080p, 720p, audio-only"
            ))),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Expired,
}

impl JobState {
    /// Allowed edges: Pending -> Running -> {Succeeded, Failed} -> Expired
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Running)
                | (JobState::Running, JobState::Succeeded)
                | (JobState::Running, JobState::Failed)
                | (JobState::Succeeded, JobState::Expired)
                | (JobState::Failed, JobState::Expired)
        )
    }

    /// Terminal for the run itself; only expiry follows
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Expired => "expired",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub source_url: String,
    pub quality: Quality,
}

impl JobRequest {
    /// Validate raw caller input
    ///
    /// The URL is opaque here: only emptiness and length are checked. Anything
    /// beyond that is the engine's call.
    pub fn parse(source_url: &str, quality: &str) -> Result<Self, SubmitError> {
        let source_url = source_url.trim();
        if source_url.is_empty() {
            return Err(SubmitError::InvalidArgument("url must not be empty".to_string()));
        }

        if source_url.len() > MAX_SOURCE_URL_BYTES {
            return Err(SubmitError::InvalidArgument(format!(
                "url exceeds {MAX_SOURCE_URL_BYTES} bytes"
            )));
        }

        Ok(Self {
            source_url: source_url.to_string(),
            quality: quality.parse()?,
        })
    }
}

/// State change requested against the registry, with its payload
#[derive(Debug, Clone)]
pub enum Transition {
    Start,
    Succeed { artifact: Artifact, attempts: u32 },
    Fail { failure: JobFailure, attempts: u32 },
    Expire,
}

impl Transition {
    pub fn target(&self) -> JobState {
        match self {
            Transition::Start => JobState::Running,
            Transition::Succeed { .. } => JobState::Succeeded,
            Transition::Fail { .. } => JobState::Failed,
            Transition::Expire => JobState::Expired,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub state: JobState,
    pub quality: Quality,
    pub source_url: String,
    pub working_dir: PathBuf,
    /// Set only while `Succeeded`
    pub artifact: Option<Artifact>,
    /// Set only while `Failed`
    pub error: Option<JobFailure>,
    /// Engine invocations made; zero until the run finishes
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        id: JobId,
        request: JobRequest,
        working_dir: PathBuf,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            state: JobState::Pending,
            quality: request.quality,
            source_url: request.source_url,
            working_dir,
            artifact: None,
            error: None,
            attempts: 0,
            created_at,
            updated_at: created_at,
            expires_at,
        }
    }

    /// Apply a transition in place, rejecting edges outside the state machine
    ///
    /// On rejection the job is left untouched and the attempted edge is returned.
    pub fn apply(
        &mut self,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<(), (JobState, JobState)> {
        let target = transition.target();
        if !self.state.can_transition_to(target) {
            return Err((self.state, target));
        }

        match transition {
            Transition::Start => {}
            Transition::Succeed { artifact, attempts } => {
                self.artifact = Some(artifact);
                self.attempts = attempts;
            }
            Transition::Fail { failure, attempts } => {
                self.artifact = None;
                self.error = Some(failure);
                self.attempts = attempts;
            }
            Transition::Expire => {
                self.artifact = None;
            }
        }

        self.state = target;
        self.updated_at = now;
        Ok(())
    }

    /// Finished and past its deadline
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state.is_finished() && self.expires_at <= now
    }

    /// Servable iff succeeded and strictly before the deadline
    pub fn is_servable(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Succeeded && now < self.expires_at && self.artifact.is_some()
    }

    pub fn filename(&self) -> Option<&str> {
        self.artifact.as_ref().map(|a| a.filename.as_str())
    }
}
