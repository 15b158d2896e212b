//! Local working-directory storage for job artifacts
//!
//! Every job owns exactly one directory `<root>/<job_id>`. The store never
//! touches paths outside its root.

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

use crate::jobs::JobId;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Working directory already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Refusing to touch path outside storage root: {0}")]
    OutsideRoot(PathBuf),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Owns the storage root and hands out per-job working directories
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root and clear job directories left behind by a previous process
    ///
    /// The registry lives in memory, so leftovers have no owner after a restart.
    /// Only directories named by a job id are removed; anything else under the
    /// root is left in place. Returns the number of directories removed.
    pub async fn init(&self) -> Result<usize> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| io_error(&self.root, source))?;

        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|source| io_error(&self.root, source))?;

        let mut removed = 0;
        let mut skipped = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| io_error(&self.root, source))?
        {
            let path = entry.path();
            let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
            if !is_dir || !is_job_dir_name(&entry.file_name()) {
                skipped += 1;
                continue;
            }

            match fs::remove_dir_all(&path).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove stale job directory"),
            }
        }

        if removed > 0 {
            tracing::info!(root = %self.root.display(), removed, "Removed stale job directories");
        }
        if skipped > 0 {
            tracing::warn!(root = %self.root.display(), skipped, "Storage root holds entries that are not job directories; leaving them");
        }

        Ok(removed)
    }

    /// Path of the working directory for a job (not created)
    pub fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.root.join(job_id.as_str())
    }

    /// Create a fresh working directory for a job
    ///
    /// Fails with [`StorageError::AlreadyExists`] instead of adopting an existing
    /// directory, so no two jobs can ever share one.
    pub async fn create_job_dir(&self, job_id: &JobId) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| io_error(&self.root, source))?;

        let dir = self.job_dir(job_id);
        match fs::create_dir(&dir).await {
            Ok(()) => {
                tracing::debug!(job_id = %job_id, dir = %dir.display(), "Created working directory");
                Ok(dir)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(StorageError::AlreadyExists(dir)),
            Err(source) => Err(io_error(&dir, source)),
        }
    }

    /// Remove a working directory and everything in it
    ///
    /// Returns `Ok(false)` when the directory was already gone.
    pub async fn remove_dir(&self, dir: &Path) -> Result<bool> {
        if !dir.starts_with(&self.root) || dir == self.root {
            return Err(StorageError::OutsideRoot(dir.to_path_buf()));
        }

        match fs::remove_dir_all(dir).await {
            Ok(()) => {
                tracing::debug!(dir = %dir.display(), "Removed working directory");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(io_error(dir, source)),
        }
    }

    /// Open an artifact for streaming, returning the handle and its length
    ///
    /// A missing file yields `Ok(None)`.
    pub async fn open(&self, path: &Path) -> Result<Option<(fs::File, u64)>> {
        if !path.starts_with(&self.root) {
            return Err(StorageError::OutsideRoot(path.to_path_buf()));
        }

        let file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(io_error(path, source)),
        };

        let metadata = file
            .metadata()
            .await
            .map_err(|source| io_error(path, source))?;

        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some((file, metadata.len())))
    }
}

fn is_job_dir_name(name: &OsStr) -> bool {
    name.to_str().is_some_and(|name| Uuid::parse_str(name).is_ok())
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Media type for an artifact, derived from its extension
///
/// Audio extensions map to their audio types; anything unrecognised is served
/// as generic MP4 video.
pub fn media_type_for(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("aac") => "audio/aac",
        Some("opus") => "audio/opus",
        Some("ogg") => "audio/ogg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        _ => "video/mp4",
    }
}
