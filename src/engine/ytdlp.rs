//! yt-dlp adapter
//!
//! Runs the `yt-dlp` executable as a child process, one process per attempt.
//! The final path and title are read from `--print after_move:` markers on
//! stdout; failures are classified from stderr.

use async_trait::async_trait;
use bon::Builder;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime};
use tokio::process::Command;
use tracing::{debug, warn};

use super::error::{EngineError, FatalReason, classify};
use super::traits::ExtractionEngine;
use super::types::{Artifact, EngineRequest};
use crate::config::EngineConfig;

const TITLE_MARKER: &str = "title:";
const FILEPATH_MARKER: &str = "filepath:";
const PARTIAL_EXTENSIONS: [&str; 4] = ["part", "ytdl", "temp", "tmp"];

#[derive(Debug, Clone, Builder)]
pub struct YtDlpEngine {
    #[builder(into, default = PathBuf::from("yt-dlp"))]
    binary: PathBuf,
    /// Netscape cookie file, passed through when it exists
    #[builder(into)]
    cookies_file: Option<PathBuf>,
    #[builder(default = Duration::from_secs(900))]
    timeout: Duration,
}

impl YtDlpEngine {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::builder()
            .binary(config.binary.clone())
            .maybe_cookies_file(config.cookies_file.clone())
            .timeout(config.timeout.as_duration())
            .build()
    }

    /// Command-line arguments for one invocation
    pub fn build_args(&self, request: &EngineRequest, cookies: Option<&Path>) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "--no-playlist",
            "--no-progress",
            "--restrict-filenames",
            "--no-simulate",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        args.push("-f".into());
        args.push(request.format.selector.into());
        args.push("-o".into());
        args.push(request.output_dir.join("%(title)s.%(ext)s").into_os_string());

        if let Some(container) = request.format.merge_container {
            args.push("--merge-output-format".into());
            args.push(container.into());
        }

        if let Some(audio) = request.format.audio {
            args.push("-x".into());
            args.push("--audio-format".into());
            args.push(audio.codec.into());
            args.push("--audio-quality".into());
            args.push(format!("{}K", audio.bitrate_kbps).into());
        }

        if let Some(cookies) = cookies {
            args.push("--cookies".into());
            args.push(cookies.as_os_str().to_owned());
        }

        args.push("--print".into());
        args.push(format!("after_move:{TITLE_MARKER}%(title)s").into());
        args.push("--print".into());
        args.push(format!("after_move:{FILEPATH_MARKER}%(filepath)s").into());

        // URL last, after `--`, so it can never be read as an option
        args.push("--".into());
        args.push(request.source_url.clone().into());

        args
    }

    async fn usable_cookies(&self) -> Option<&Path> {
        let path = self.cookies_file.as_deref()?;
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => {
                debug!(path = %path.display(), "Cookie file not found, continuing without it");
                None
            }
        }
    }
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[async_trait]
impl ExtractionEngine for YtDlpEngine {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn fetch(&self, request: &EngineRequest) -> Result<Artifact, EngineError> {
        let cookies = self.usable_cookies().await;
        let args = self.build_args(request, cookies);

        debug!(
            binary = %self.binary.display(),
            url = %request.source_url,
            quality = %request.quality,
            "Invoking engine"
        );

        let mut command = Command::new(&self.binary);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::fatal(
                    FatalReason::EngineMissing,
                    format!("{}: {e}", self.binary.display()),
                ));
            }
            Ok(Err(e)) => {
                return Err(EngineError::fatal(
                    FatalReason::Other,
                    format!("failed to start {}: {e}", self.binary.display()),
                ));
            }
            Err(_) => {
                warn!(url = %request.source_url, timeout = ?self.timeout, "Engine timed out");
                return Err(EngineError::transient(format!(
                    "engine did not finish within {:?}",
                    self.timeout
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(status = %output.status, stderr = %stderr.trim(), "Engine exited with failure");
            return Err(classify(&stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let printed = PrintedOutput::parse(&stdout);
        resolve_artifact(&request.output_dir, printed).await
    }
}

/// Values reported through the `--print` markers
#[derive(Debug, Default, PartialEq, Eq)]
struct PrintedOutput {
    title: Option<String>,
    filepath: Option<PathBuf>,
}

impl PrintedOutput {
    fn parse(stdout: &str) -> Self {
        let mut printed = Self::default();
        for line in stdout.lines() {
            let line = line.trim_end();
            if let Some(title) = line.strip_prefix(TITLE_MARKER) {
                if !title.is_empty() && title != "NA" {
                    printed.title = Some(title.to_string());
                }
            } else if let Some(path) = line.strip_prefix(FILEPATH_MARKER) {
                if !path.is_empty() && path != "NA" {
                    printed.filepath = Some(PathBuf::from(path));
                }
            }
        }
        printed
    }
}

/// Locate the finished file, preferring the path the engine reported
async fn resolve_artifact(output_dir: &Path, printed: PrintedOutput) -> Result<Artifact, EngineError> {
    let dir = tokio::fs::canonicalize(output_dir)
        .await
        .map_err(|e| EngineError::Storage(format!("{}: {e}", output_dir.display())))?;

    let reported = match printed.filepath {
        Some(path) => match tokio::fs::canonicalize(&path).await {
            Ok(path) if path.parent() == Some(dir.as_path()) && path.is_file() => Some(path),
            Ok(path) => {
                warn!(path = %path.display(), "Engine reported a path outside the working directory");
                None
            }
            Err(_) => None,
        },
        None => None,
    };

    let path = match reported {
        Some(path) => path,
        None => newest_file(&dir).await?.ok_or_else(|| {
            EngineError::Storage(format!("no output file found in {}", dir.display()))
        })?,
    };

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| EngineError::Storage(format!("unusable file name: {}", path.display())))?;

    Ok(Artifact {
        path,
        filename,
        title: printed.title,
    })
}

async fn newest_file(dir: &Path) -> Result<Option<PathBuf>, EngineError> {
    let storage = |e: std::io::Error| EngineError::Storage(format!("{}: {e}", dir.display()));

    let mut entries = tokio::fs::read_dir(dir).await.map_err(storage)?;
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    while let Some(entry) = entries.next_entry().await.map_err(storage)? {
        let path = entry.path();
        let is_partial = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| PARTIAL_EXTENSIONS.contains(&ext));
        if is_partial {
            continue;
        }

        let meta = entry.metadata().await.map_err(storage)?;
        if !meta.is_file() {
            continue;
        }

        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if newest.as_ref().is_none_or(|(best, _)| modified >= *best) {
            newest = Some((modified, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::Quality;
    use tempfile::TempDir;

    fn as_strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_video_args() {
        let engine = YtDlpEngine::default();
        let request = EngineRequest::new("https://youtu.be/abc", Quality::P1080, "/data/jobs/1");
        let args = as_strings(&engine.build_args(&request, None));

        let f = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f + 1], "bestvideo[height=1080]+bestaudio/best");
        assert!(args.contains(&"--merge-output-format".to_string()));
        assert!(args.contains(&"/data/jobs/1/%(title)s.%(ext)s".to_string()));
        assert!(!args.contains(&"-x".to_string()));
        assert!(!args.contains(&"--cookies".to_string()));

        let n = args.len();
        assert_eq!(args[n - 2], "--");
        assert_eq!(args[n - 1], "https://youtu.be/abc");
    }

    #[test]
    fn test_audio_args() {
        let engine = YtDlpEngine::builder().binary("/usr/bin/yt-dlp").build();
        let request = EngineRequest::new("https://youtu.be/abc", Quality::AudioOnly, "/data/jobs/2");
        let args = as_strings(&engine.build_args(&request, Some(Path::new("/etc/cookies.txt"))));

        let f = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f + 1], "bestaudio");
        assert!(args.contains(&"-x".to_string()));
        assert!(args.contains(&"192K".to_string()));
        assert!(!args.contains(&"--merge-output-format".to_string()));

        let c = args.iter().position(|a| a == "--cookies").unwrap();
        assert_eq!(args[c + 1], "/etc/cookies.txt");
    }

    #[test]
    fn test_parse_print_markers() {
        let stdout = "title:Some Clip\nfilepath:/data/jobs/1/Some_Clip.mp4\n";
        let printed = PrintedOutput::parse(stdout);
        assert_eq!(printed.title.as_deref(), Some("Some Clip"));
        assert_eq!(printed.filepath, Some(PathBuf::from("/data/jobs/1/Some_Clip.mp4")));

        let printed = PrintedOutput::parse("title:NA\nnoise\n");
        assert_eq!(printed, PrintedOutput::default());
    }

    #[tokio::test]
    async fn test_resolve_prefers_reported_path() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.mp4"), b"a").unwrap();
        std::fs::write(temp_dir.path().join("b.mp4"), b"b").unwrap();

        let printed = PrintedOutput {
            title: Some("A".to_string()),
            filepath: Some(temp_dir.path().join("a.mp4")),
        };
        let artifact = resolve_artifact(temp_dir.path(), printed).await.unwrap();
        assert_eq!(artifact.filename, "a.mp4");
        assert_eq!(artifact.title.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_resolve_scans_and_skips_partials() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("clip.mp3"), b"done").unwrap();
        std::fs::write(temp_dir.path().join("clip.webm.part"), b"partial").unwrap();

        let artifact = resolve_artifact(temp_dir.path(), PrintedOutput::default())
            .await
            .unwrap();
        assert_eq!(artifact.filename, "clip.mp3");
    }

    #[tokio::test]
    async fn test_resolve_ignores_paths_outside_dir() {
        let temp_dir = TempDir::new().unwrap();
        let job_dir = temp_dir.path().join("job");
        std::fs::create_dir(&job_dir).unwrap();
        std::fs::write(temp_dir.path().join("elsewhere.mp4"), b"x").unwrap();

        let printed = PrintedOutput {
            title: None,
            filepath: Some(temp_dir.path().join("elsewhere.mp4")),
        };
        let err = resolve_artifact(&job_dir, printed).await.unwrap_err();
        assert!(matches!(err, EngineError::Storage(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let engine = YtDlpEngine::builder()
            .binary(temp_dir.path().join("no-such-yt-dlp"))
            .build();
        let request = EngineRequest::new("https://youtu.be/abc", Quality::Highest, temp_dir.path());

        match engine.fetch(&request).await {
            Err(EngineError::Fatal { reason, .. }) => assert_eq!(reason, FatalReason::EngineMissing),
            other => panic!("expected missing engine, got {other:?}"),
        }
    }
}
