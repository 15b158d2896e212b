use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Base used to build `download_url` links handed back to clients
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            public_base_url: default_public_base_url(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_max_body_bytes() -> usize {
    16 * 1024
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root under which every job gets its own working directory
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data/jobs")
}

/// Retention configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_job_ttl")]
    pub job_ttl: HumanDuration,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: HumanDuration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            job_ttl: default_job_ttl(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

fn default_job_ttl() -> HumanDuration {
    HumanDuration::from_secs(60 * 60)
}

fn default_sweep_interval() -> HumanDuration {
    HumanDuration::from_secs(60)
}

/// Job runner configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunnerConfig {
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff")]
    pub base_backoff: HumanDuration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_attempts: default_max_attempts(),
            base_backoff: default_base_backoff(),
        }
    }
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_backoff() -> HumanDuration {
    HumanDuration::from_secs(1)
}

/// Extraction engine (yt-dlp) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_binary")]
    pub binary: PathBuf,
    /// Netscape-format cookies file, passed through only when it exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies_file: Option<PathBuf>,
    #[serde(default = "default_engine_timeout")]
    pub timeout: HumanDuration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_engine_binary(),
            cookies_file: None,
            timeout: default_engine_timeout(),
        }
    }
}

fn default_engine_binary() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_engine_timeout() -> HumanDuration {
    HumanDuration::from_secs(15 * 60)
}
