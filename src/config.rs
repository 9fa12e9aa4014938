//! Application configuration.
//!
//! Centralized, environment-aware configuration with validation. Every
//! recognized option can be set through an upper-snake environment variable;
//! `.env` files are loaded by `main` before this module reads the process
//! environment.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Application environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        match std::env::var("ENVIRONMENT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub worker: WorkerSettings,
    pub providers: ProviderSettings,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_env();

        let config = Self {
            environment,
            server: ServerConfig::from_env(environment)?,
            storage: StorageConfig::from_env(environment)?,
            worker: WorkerSettings::from_env()?,
            providers: ProviderSettings::from_env(),
        };

        if environment.is_production() && config.server.cors_origins.iter().any(|o| o == "*") {
            return Err(ConfigError::InvalidValue {
                key: "CORS_ORIGINS".to_string(),
                message: "wildcard origin is not allowed in production".to_string(),
            });
        }

        Ok(config)
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host:port the HTTP server binds to (`HTTP_BIND`).
    pub http_bind: String,
    /// Allowed CORS origins (`CORS_ORIGINS`, comma separated; `*` in dev only).
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    pub fn from_env(env: Environment) -> Result<Self, ConfigError> {
        let default_origins = if env.is_production() {
            Vec::new()
        } else {
            vec!["*".to_string()]
        };

        let cors_origins = std::env::var("CORS_ORIGINS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or(default_origins);

        Ok(Self {
            http_bind: std::env::var("HTTP_BIND").unwrap_or_else(|_| "0.0.0.0:5123".to_string()),
            cors_origins,
        })
    }
}

/// Library and database storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root of on-disk song storage (`LIBRARY_DIR`), one directory per song id.
    pub library_dir: PathBuf,
    /// Store backend connection string (`DATABASE_URL`).
    pub database_url: String,
}

impl StorageConfig {
    pub fn from_env(env: Environment) -> Result<Self, ConfigError> {
        let database_url = match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) if env.is_production() => {
                return Err(ConfigError::MissingRequired("DATABASE_URL".to_string()))
            }
            Err(_) => "sqlite:karaoke.db?mode=rwc".to_string(),
        };

        Ok(Self {
            library_dir: PathBuf::from(
                std::env::var("LIBRARY_DIR").unwrap_or_else(|_| "library".to_string()),
            ),
            database_url,
        })
    }
}

/// Dispatcher and pipeline settings.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Dispatcher parallelism (`WORKER_CONCURRENCY`). Defaults to 1: separation
    /// dominates and saturates the machine on its own.
    pub concurrency: usize,
    /// Per-step deadlines.
    pub step_timeouts: StepTimeouts,
    /// How long terminal jobs remain visible (`JOB_RETENTION_SECS`).
    pub job_retention: Duration,
    /// Reservations older than this with no status movement are reopened.
    pub stale_reservation_after: Duration,
}

impl WorkerSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let concurrency = parse_var("WORKER_CONCURRENCY", 1usize)?;
        if concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "WORKER_CONCURRENCY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            concurrency,
            step_timeouts: StepTimeouts::from_env()?,
            job_retention: Duration::from_secs(parse_var("JOB_RETENTION_SECS", 86_400u64)?),
            stale_reservation_after: Duration::from_secs(parse_var(
                "STALE_RESERVATION_SECS",
                60u64,
            )?),
        })
    }
}

/// Per-step deadlines (`STEP_TIMEOUT_*`, seconds).
#[derive(Debug, Clone)]
pub struct StepTimeouts {
    pub fetch: Duration,
    pub separate: Duration,
    pub metadata: Duration,
    pub lyrics: Duration,
}

impl StepTimeouts {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            fetch: Duration::from_secs(parse_var("STEP_TIMEOUT_FETCH", 600u64)?),
            separate: Duration::from_secs(parse_var("STEP_TIMEOUT_SEPARATE", 1_800u64)?),
            metadata: Duration::from_secs(parse_var("STEP_TIMEOUT_METADATA", 15u64)?),
            lyrics: Duration::from_secs(parse_var("STEP_TIMEOUT_LYRICS", 15u64)?),
        })
    }
}

/// External collaborator settings.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Device hint passed through to the separator (`SEPARATOR_DEVICE`).
    pub separator_device: String,
    /// Command invoked to download media (`FETCHER_COMMAND`).
    pub fetcher_command: String,
    /// Command invoked to split vocals/instrumental (`SEPARATOR_COMMAND`).
    pub separator_command: String,
    /// Base URL of the metadata search API (`METADATA_BASE_URL`).
    pub metadata_base_url: String,
    /// Base URL of the lyrics search API (`LYRICS_BASE_URL`).
    pub lyrics_base_url: String,
}

impl ProviderSettings {
    pub fn from_env() -> Self {
        Self {
            separator_device: std::env::var("SEPARATOR_DEVICE")
                .unwrap_or_else(|_| "cpu".to_string()),
            fetcher_command: std::env::var("FETCHER_COMMAND")
                .unwrap_or_else(|_| "yt-dlp".to_string()),
            separator_command: std::env::var("SEPARATOR_COMMAND")
                .unwrap_or_else(|_| "demucs-split".to_string()),
            metadata_base_url: std::env::var("METADATA_BASE_URL")
                .unwrap_or_else(|_| "https://itunes.apple.com".to_string()),
            lyrics_base_url: std::env::var("LYRICS_BASE_URL")
                .unwrap_or_else(|_| "https://lrclib.net".to_string()),
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("could not parse {:?}", raw),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_development_friendly() {
        // Only assert on keys this test does not set; env is process-global.
        let settings = WorkerSettings {
            concurrency: 1,
            step_timeouts: StepTimeouts {
                fetch: Duration::from_secs(600),
                separate: Duration::from_secs(1_800),
                metadata: Duration::from_secs(15),
                lyrics: Duration::from_secs(15),
            },
            job_retention: Duration::from_secs(86_400),
            stale_reservation_after: Duration::from_secs(60),
        };
        assert_eq!(settings.concurrency, 1);
        assert_eq!(settings.step_timeouts.separate, Duration::from_secs(1_800));
    }

    #[test]
    fn parse_var_rejects_garbage() {
        std::env::set_var("TEST_PARSE_VAR_GARBAGE", "not-a-number");
        let result: Result<u64, _> = parse_var("TEST_PARSE_VAR_GARBAGE", 5);
        assert!(result.is_err());
        std::env::remove_var("TEST_PARSE_VAR_GARBAGE");
    }
}
