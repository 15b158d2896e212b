use super::models::Config;
use config::{ConfigError, Environment, File, FileFormat};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "MEDIABOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/mediabox.toml";
const ENV_PREFIX: &str = "MEDIABOX";
const ENV_SEPARATOR: &str = "__";

/// Resolve which TOML file to read: explicit path, then `MEDIABOX_CONFIG`, then the default
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load(explicit: Option<PathBuf>) -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    load_from_sources(config_path(explicit))
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(
            File::from(config_path)
                .format(FileFormat::Toml)
                .required(false),
        );
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // MEDIABOX__RETENTION__JOB_TTL=2h -> retention.job_ttl
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.runner.max_attempts, 5);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"
public_base_url = "https://media.example.com"

[storage]
root = "/var/lib/mediabox"

[retention]
job_ttl = "2h"
sweep_interval = "5m"

[runner]
max_concurrent_jobs = 8
max_attempts = 3
base_backoff = "500ms"

[engine]
binary = "/usr/local/bin/yt-dlp"
cookies_file = "cookies.txt"
timeout = "10m"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.server.public_base_url, "https://media.example.com");
        assert_eq!(config.storage.root, PathBuf::from("/var/lib/mediabox"));
        assert_eq!(config.retention.job_ttl.as_duration(), Duration::from_secs(7200));
        assert_eq!(config.retention.sweep_interval.as_duration(), Duration::from_secs(300));
        assert_eq!(config.runner.max_concurrent_jobs, 8);
        assert_eq!(config.runner.base_backoff.as_duration(), Duration::from_millis(500));
        assert_eq!(config.engine.cookies_file, Some(PathBuf::from("cookies.txt")));
    }

    // Environment overrides are not exercised here: mutating the process
    // environment is unsafe under the parallel test runner.

    #[test]
    fn test_explicit_path_wins() {
        let path = config_path(Some(PathBuf::from("custom.toml")));
        assert_eq!(path, PathBuf::from("custom.toml"));
    }
}
