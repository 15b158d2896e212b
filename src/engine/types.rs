use std::path::PathBuf;

use crate::jobs::Quality;

/// Media file produced by the engine inside a job's working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub filename: String,
    /// Media title as reported by the engine
    pub title: Option<String>,
}

/// Audio post-processing applied after download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioExtraction {
    pub codec: &'static str,
    pub bitrate_kbps: u32,
}

/// Engine-level format selection for a quality level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSpec {
    /// yt-dlp format selector expression
    pub selector: &'static str,
    /// Container the streams are merged into (video only)
    pub merge_container: Option<&'static str>,
    pub audio: Option<AudioExtraction>,
}

impl FormatSpec {
    pub fn for_quality(quality: Quality) -> Self {
        const MP4: Option<&str> = Some("mp4");

        match quality {
            Quality::Highest => Self {
                selector: "bestvideo+bestaudio/best",
                merge_container: MP4,
                audio: None,
            },
            Quality::P1080 => Self {
                selector: "bestvideo[height=1080]+bestaudio/best",
                merge_container: MP4,
                audio: None,
            },
            Quality::P720 => Self {
                selector: "bestvideo[height=720]+bestaudio/best",
                merge_container: MP4,
                audio: None,
            },
            Quality::AudioOnly => Self {
                selector: "bestaudio",
                merge_container: None,
                audio: Some(AudioExtraction {
                    codec: "mp3",
                    bitrate_kbps: 192,
                }),
            },
        }
    }

    /// Extension the final artifact is expected to carry
    pub fn expected_extension(&self) -> &'static str {
        match (self.audio, self.merge_container) {
            (Some(audio), _) => audio.codec,
            (None, Some(container)) => container,
            (None, None) => "mp4",
        }
    }
}

/// Everything the engine needs for one invocation
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub source_url: String,
    pub quality: Quality,
    pub format: FormatSpec,
    /// Directory the engine must write into; owned by the job
    pub output_dir: PathBuf,
}

impl EngineRequest {
    pub fn new(source_url: impl Into<String>, quality: Quality, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_url: source_url.into(),
            quality,
            format: FormatSpec::for_quality(quality),
            output_dir: output_dir.into(),
        }
    }
}
