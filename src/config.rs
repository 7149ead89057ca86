use crate::bucket_spec::{bucket_types_from_json, BucketTypes};
use crate::error::{Error, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Process configuration for the `job-throttler` binary.
#[derive(Debug, Clone, Parser)]
#[command(name = "job-throttler", version, about = "Leaky bucket drain worker for flagged jobs")]
pub struct Config {
    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// JSON file mapping bucket type names to leaky bucket specs
    #[arg(long = "buckets", env = "BUCKET_CONFIG", default_value = "buckets.json")]
    pub bucket_config: PathBuf,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Drain buckets on their schedules until interrupted (default)
    Run,
    /// Drain every bucket type once and exit
    DrainOnce,
    /// Print the currently forbidden flags as JSON
    Forbidden,
}

impl Config {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Run)
    }

    /// Validate settings that clap cannot check on its own
    pub fn validate(&self) -> Result<()> {
        validate_redis_url(&self.redis_url)
    }

    /// Read and validate the bucket type configuration file
    pub fn load_bucket_types(&self) -> Result<BucketTypes> {
        let json = std::fs::read_to_string(&self.bucket_config).map_err(|e| {
            Error::Configuration(format!(
                "Failed to read bucket configuration '{}': {}",
                self.bucket_config.display(),
                e
            ))
        })?;

        let bucket_types = bucket_types_from_json(&json)?;
        if bucket_types.is_empty() {
            return Err(Error::Configuration(
                "Bucket configuration defines no bucket types".to_string(),
            ));
        }

        Ok(bucket_types)
    }
}

/// Validates a Redis URL
pub fn validate_redis_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(Error::Configuration("Redis URL cannot be empty".to_string()));
    }

    if !url.starts_with("redis://") && !url.starts_with("rediss://") {
        return Err(Error::Configuration(
            "Redis URL must start with 'redis://' or 'rediss://'".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_redis_url() {
        assert!(validate_redis_url("redis://localhost:6379").is_ok());
        assert!(validate_redis_url("rediss://localhost:6379").is_ok());
    }

    #[test]
    fn test_invalid_redis_url() {
        assert!(validate_redis_url("").is_err());
        assert!(validate_redis_url("http://localhost:6379").is_err());
    }

    #[test]
    fn test_parse_args() {
        let config = Config::try_parse_from([
            "job-throttler",
            "--redis-url",
            "redis://cache:6379",
            "--buckets",
            "/etc/throttler/buckets.json",
            "drain-once",
        ])
        .unwrap();

        assert_eq!(config.redis_url, "redis://cache:6379");
        assert_eq!(config.bucket_config, PathBuf::from("/etc/throttler/buckets.json"));
        assert_eq!(config.command(), Command::DrainOnce);
    }

    #[test]
    fn test_default_command_is_run() {
        let config = Config::try_parse_from(["job-throttler"]).unwrap();
        assert_eq!(config.command(), Command::Run);
    }

    #[test]
    fn test_missing_bucket_file() {
        let config = Config::try_parse_from([
            "job-throttler",
            "--buckets",
            "/nonexistent/buckets.json",
        ])
        .unwrap();

        assert!(matches!(
            config.load_bucket_types(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_load_bucket_types_from_file() {
        let path = std::env::temp_dir()
            .join(format!("job-throttler-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"{"bucket": {"capacity": 6, "drain_interval": "1500ms", "drain_count": 3}}"#,
        )
        .unwrap();

        let config = Config::try_parse_from([
            "job-throttler",
            "--buckets",
            path.to_str().unwrap(),
        ])
        .unwrap();
        let bucket_types = config.load_bucket_types().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(bucket_types["bucket"].capacity, 6);
    }
}
