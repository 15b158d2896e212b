use super::models::Config;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Retention duration must be positive: {field}")]
    ZeroDuration { field: &'static str },

    #[error("sweep_interval ({sweep}) must not exceed job_ttl ({ttl})")]
    SweepSlowerThanRetention { sweep: String, ttl: String },

    #[error("runner.{field} must be at least 1")]
    ZeroRunnerLimit { field: &'static str },

    #[error("public_base_url must be an absolute http(s) URL with a host, got '{url}': {reason}")]
    InvalidPublicBaseUrl { url: String, reason: String },

    #[error("server.max_body_bytes must be positive")]
    ZeroBodyLimit,

    #[error("storage.root must not be empty")]
    EmptyStorageRoot,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_server(config)?;
    validate_storage(config)?;
    validate_retention(config)?;
    validate_runner(config)?;
    validate_engine(config)?;
    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    let base = &config.server.public_base_url;
    let invalid = |reason: String| ValidationError::InvalidPublicBaseUrl {
        url: base.clone(),
        reason,
    };

    let parsed = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    if !parsed.has_host() {
        return Err(invalid("missing host".to_string()));
    }

    if config.server.max_body_bytes == 0 {
        return Err(ValidationError::ZeroBodyLimit);
    }

    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.root.as_os_str().is_empty() {
        return Err(ValidationError::EmptyStorageRoot);
    }

    Ok(())
}

/// Retention and sweep cadence must be positive, and a sweep must run at least once per window
fn validate_retention(config: &Config) -> Result<(), ValidationError> {
    let retention = &config.retention;

    if retention.job_ttl.is_zero() {
        return Err(ValidationError::ZeroDuration { field: "job_ttl" });
    }

    if retention.sweep_interval.is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "sweep_interval",
        });
    }

    if retention.sweep_interval > retention.job_ttl {
        return Err(ValidationError::SweepSlowerThanRetention {
            sweep: retention.sweep_interval.to_string(),
            ttl: retention.job_ttl.to_string(),
        });
    }

    Ok(())
}

fn validate_runner(config: &Config) -> Result<(), ValidationError> {
    if config.runner.max_concurrent_jobs == 0 {
        return Err(ValidationError::ZeroRunnerLimit {
            field: "max_concurrent_jobs",
        });
    }

    if config.runner.max_attempts == 0 {
        return Err(ValidationError::ZeroRunnerLimit {
            field: "max_attempts",
        });
    }

    Ok(())
}

fn validate_engine(config: &Config) -> Result<(), ValidationError> {
    if config.engine.timeout.is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "engine.timeout",
        });
    }

    Ok(())
}
