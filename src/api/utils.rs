//! API utility functions
//!
//! Pure, stateless helpers for request parsing and response headers.

use url::Url;

use crate::api::error::ApiError;

/// Parses and validates Content-Type header for application/json
///
/// Accepts:
/// - `application/json`
/// - `application/json; charset=utf-8`
///
/// Rejects:
/// - `application/jsonp`
/// - `application/json-patch+json`
/// - `text/json`
/// - Malformed media types
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type.parse().map_err(|_| {
        ApiError::InvalidArgument(format!("invalid Content-Type: {}", content_type))
    })?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ApiError::InvalidArgument(format!(
            "Content-Type must be application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}

/// Validates that body size does not exceed the maximum allowed size
pub fn validate_body_size(data: &[u8], max_size: usize) -> Result<(), ApiError> {
    if data.len() > max_size {
        return Err(ApiError::PayloadTooLarge(max_size));
    }
    Ok(())
}

/// `Content-Disposition` value for an attachment download
///
/// The plain `filename` parameter carries an ASCII-only fallback; the exact
/// name travels percent-encoded in `filename*`.
pub fn content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_fallback(filename),
        urlencoding::encode(filename)
    )
}

fn ascii_fallback(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    if cleaned.trim().is_empty() {
        "download".to_string()
    } else {
        cleaned
    }
}

/// Append path segments to a base URL, percent-encoding each one
///
/// A trailing slash on the base does not produce an empty segment.
pub fn join_url(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_type_valid() {
        assert!(parse_content_type("application/json").is_ok());
        assert!(parse_content_type("application/json; charset=utf-8").is_ok());
        assert!(parse_content_type("application/json; charset=UTF-8").is_ok());
    }

    #[test]
    fn test_parse_content_type_invalid() {
        assert!(parse_content_type("application/jsonp").is_err());
        assert!(parse_content_type("application/json-patch+json").is_err());
        assert!(parse_content_type("text/json").is_err());
        assert!(parse_content_type("text/plain").is_err());
        assert!(parse_content_type("invalid").is_err());
        assert!(parse_content_type("").is_err());
    }

    #[test]
    fn test_validate_body_size() {
        let data = vec![0u8; 1000];
        assert!(validate_body_size(&data, 1000).is_ok());
        assert!(validate_body_size(&[], 100).is_ok());

        match validate_body_size(&data, 999) {
            Err(ApiError::PayloadTooLarge(limit)) => assert_eq!(limit, 999),
            other => panic!("Expected PayloadTooLarge error, got {other:?}"),
        }
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("Some_Clip.mp4"),
            "attachment; filename=\"Some_Clip.mp4\"; filename*=UTF-8''Some_Clip.mp4"
        );

        let header = content_disposition("Café \"live\".mp3");
        assert!(header.starts_with("attachment; filename=\"Caf_ _live_.mp3\""));
        assert!(header.ends_with("filename*=UTF-8''Caf%C3%A9%20%22live%22.mp3"));
    }

    #[test]
    fn test_join_url() {
        let base = Url::parse("http://localhost:8080/").unwrap();
        assert_eq!(
            join_url(&base, &["download", "abc", "a b.mp4"]).as_str(),
            "http://localhost:8080/download/abc/a%20b.mp4"
        );

        let base = Url::parse("https://media.example").unwrap();
        assert_eq!(join_url(&base, &["jobs", "x"]).as_str(), "https://media.example/jobs/x");
    }

    #[test]
    fn test_join_url_keeps_base_path() {
        let base = Url::parse("https://example.com/media/").unwrap();
        assert_eq!(
            join_url(&base, &["download", "abc", "../x?.mp4"]).as_str(),
            "https://example.com/media/download/abc/..%2Fx%3F.mp4"
        );
    }
}
