//! Adapter-boundary error classification
//!
//! Engine stderr is matched here and nowhere else. Everything downstream sees
//! an [`EngineError`] variant and an [`ErrorKind`].

use thiserror::Error;

use crate::jobs::{ErrorKind, JobFailure};

/// Why a non-retryable engine failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalReason {
    Unavailable,
    Private,
    AccessDenied,
    SignInRequired,
    AgeRestricted,
    GeoBlocked,
    Copyright,
    UnsupportedUrl,
    FormatUnavailable,
    EngineMissing,
    Other,
}

impl FatalReason {
    pub fn user_message(&self) -> &'static str {
        match self {
            FatalReason::Unavailable => "Video unavailable or removed.",
            FatalReason::Private => "This video is private.",
            FatalReason::AccessDenied => {
                "Access denied. The video may be private or region-restricted."
            }
            FatalReason::SignInRequired => "The source requires signing in to access this video.",
            FatalReason::AgeRestricted => "This video is age-restricted and requires signing in.",
            FatalReason::GeoBlocked => "This video is not available in the server's region.",
            FatalReason::Copyright => "This video is blocked due to a copyright claim.",
            FatalReason::UnsupportedUrl => "Unsupported URL. Check that the link is correct.",
            FatalReason::FormatUnavailable => "The requested quality is not available for this video.",
            FatalReason::EngineMissing => "The download engine is not installed on the server.",
            FatalReason::Other => "The download engine could not process this URL.",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Rate limiting, timeouts and flaky networks; worth retrying
    #[error("transient engine failure: {0}")]
    Transient(String),

    #[error("{}", .reason.user_message())]
    Fatal { reason: FatalReason, detail: String },

    /// The engine ran but its output could not be written or located
    #[error("engine storage failure: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn transient(detail: impl Into<String>) -> Self {
        EngineError::Transient(detail.into())
    }

    pub fn fatal(reason: FatalReason, detail: impl Into<String>) -> Self {
        EngineError::Fatal {
            reason,
            detail: detail.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Transient(_) => ErrorKind::EngineTransient,
            EngineError::Fatal { .. } => ErrorKind::EngineFatal,
            EngineError::Storage(_) => ErrorKind::InternalStorage,
        }
    }

    /// Record form stored on a failed job
    pub fn to_failure(&self) -> JobFailure {
        match self {
            EngineError::Transient(detail) => JobFailure::new(
                self.kind(),
                "The source kept failing temporarily. Try again later.",
            )
            .with_detail(detail.clone()),
            EngineError::Fatal { reason, detail } => {
                JobFailure::new(self.kind(), reason.user_message()).with_detail(detail.clone())
            }
            EngineError::Storage(detail) => {
                JobFailure::new(self.kind(), "The server could not store the download.")
                    .with_detail(detail.clone())
            }
        }
    }
}

/// Classify engine stderr into the error taxonomy
///
/// Only `ERROR:` lines are matched when the output has any; `WARNING:` lines
/// about retried requests do not decide the outcome. Unknown failures are
/// fatal.
pub fn classify(stderr: &str) -> EngineError {
    let lower = error_lines(stderr)
        .unwrap_or_else(|| stderr.to_string())
        .to_lowercase();
    let detail = last_error_line(stderr);

    if lower.contains("http error 429")
        || lower.contains("too many requests")
        || lower.contains("rate-limit")
        || lower.contains("rate limit")
    {
        return EngineError::transient(detail);
    }
    if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection reset")
        || lower.contains("connection refused")
        || lower.contains("temporary failure in name resolution")
        || lower.contains("network is unreachable")
        || lower.contains("incomplete read")
        || ["500", "502", "503", "504"]
            .iter()
            .any(|status| lower.contains(&format!("http error {status}")))
    {
        return EngineError::transient(detail);
    }

    let reason = if lower.contains("confirm your age")
        || lower.contains("age-restricted")
        || lower.contains("age restricted")
    {
        FatalReason::AgeRestricted
    } else if lower.contains("private video") {
        FatalReason::Private
    } else if lower.contains("sign in") || lower.contains("login required") {
        FatalReason::SignInRequired
    } else if lower.contains("available in your country")
        || (lower.contains("geo") && lower.contains("block"))
    {
        FatalReason::GeoBlocked
    } else if lower.contains("copyright") {
        FatalReason::Copyright
    } else if lower.contains("requested format") && lower.contains("not available") {
        FatalReason::FormatUnavailable
    } else if lower.contains("http error 403") || lower.contains("forbidden") {
        FatalReason::AccessDenied
    } else if lower.contains("video unavailable")
        || lower.contains("http error 404")
        || lower.contains("has been removed")
        || lower.contains("not available")
    {
        FatalReason::Unavailable
    } else if lower.contains("unsupported url") || lower.contains("is not a valid url") {
        FatalReason::UnsupportedUrl
    } else {
        FatalReason::Other
    };

    EngineError::fatal(reason, detail)
}

fn is_error_line(line: &str) -> bool {
    line.to_lowercase().starts_with("error")
}

/// Every `ERROR:` line of the output joined together, if there is one
fn error_lines(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| is_error_line(l))
        .collect();

    (!lines.is_empty()).then(|| lines.join("\n"))
}

/// Last `ERROR:` line of the output, or a bounded tail when none exists
fn last_error_line(stderr: &str) -> String {
    let line = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| is_error_line(l));

    match line {
        Some(line) => line
            .strip_prefix("ERROR: ")
            .or_else(|| line.strip_prefix("ERROR:"))
            .unwrap_or(line)
            .to_string(),
        None => {
            let trimmed = stderr.trim();
            let tail: String = trimmed.chars().rev().take(300).collect();
            tail.chars().rev().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_transient() {
        let err = classify("ERROR: [youtube] abc: HTTP Error 429: Too Many Requests");
        assert!(err.is_transient());
        assert_eq!(err.kind(), ErrorKind::EngineTransient);
    }

    #[test]
    fn test_network_failures_are_transient() {
        assert!(classify("ERROR: Read timed out.").is_transient());
        assert!(classify("ERROR: unable to download: HTTP Error 503: Service Unavailable").is_transient());
        assert!(classify("urlopen error [Errno -3] Temporary failure in name resolution").is_transient());
    }

    #[test]
    fn test_fatal_reasons() {
        let cases = [
            ("ERROR: [youtube] abc: Private video. Sign in if you've been granted access", FatalReason::Private),
            ("ERROR: [youtube] abc: Private video", FatalReason::Private),
            ("ERROR: [youtube] abc: Sign in to confirm your age", FatalReason::AgeRestricted),
            ("ERROR: [youtube] abc: Sign in to confirm you're not a bot", FatalReason::SignInRequired),
            ("ERROR: [youtube] abc: Video unavailable", FatalReason::Unavailable),
            ("ERROR: unable to download video data: HTTP Error 403: Forbidden", FatalReason::AccessDenied),
            ("ERROR: Unsupported URL: https://example.com/", FatalReason::UnsupportedUrl),
            ("ERROR: [youtube] abc: Requested format is not available", FatalReason::FormatUnavailable),
            ("ERROR: [youtube] abc: The uploader has not made this video available in your country", FatalReason::GeoBlocked),
            ("ERROR: something nobody has seen before", FatalReason::Other),
        ];

        for (stderr, expected) in cases {
            match classify(stderr) {
                EngineError::Fatal { reason, .. } => assert_eq!(reason, expected, "{stderr}"),
                other => panic!("expected fatal for {stderr}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_warnings_do_not_decide_the_outcome() {
        let stderr = "WARNING: [youtube] abc: Read timed out. Retrying (1/3)...\n\
                      ERROR: [youtube] abc: Private video. Sign in if you've been granted access to this video";
        let err = classify(stderr);
        assert!(!err.is_transient());
        match err {
            EngineError::Fatal { reason, .. } => assert_eq!(reason, FatalReason::Private),
            other => panic!("unexpected {other:?}"),
        }

        let stderr = "WARNING: [youtube] abc: Private video warning text\n\
                      ERROR: unable to download video data: HTTP Error 429: Too Many Requests";
        assert!(classify(stderr).is_transient());
    }

    #[test]
    fn test_detail_keeps_last_error_line() {
        let stderr = "[youtube] abc: Downloading webpage\nWARNING: slow\nERROR: [youtube] abc: Video unavailable\n";
        match classify(stderr) {
            EngineError::Fatal { detail, .. } => assert_eq!(detail, "[youtube] abc: Video unavailable"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_failure_uses_friendly_message() {
        let failure = classify("ERROR: [youtube] abc: Private video").to_failure();
        assert_eq!(failure.kind, ErrorKind::EngineFatal);
        assert_eq!(failure.message, "This video is private.");
        assert!(failure.detail.unwrap().contains("Private video"));
    }
}
