use lambda_runtime::tracing::level_filters::LevelFilter;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub mod env_keys {
    pub const S3_BUCKET_NAME: &str = "S3_BUCKET_NAME";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
    pub const MAX_FILE_SIZE_MB: &str = "MAX_FILE_SIZE_MB";
    pub const CLAMSCAN_PATH: &str = "CLAMSCAN_PATH";
    pub const CLAMAV_DATABASE_DIR: &str = "CLAMAV_DATABASE_DIR";
    pub const SCAN_TIMEOUT_SECONDS: &str = "SCAN_TIMEOUT_SECONDS";
    pub const DEADLINE_MARGIN_SECONDS: &str = "DEADLINE_MARGIN_SECONDS";
    pub const SCRATCH_DIR: &str = "SCRATCH_DIR";
}

const BYTES_PER_MB: u64 = 1024 * 1024;
const DEFAULT_MAX_FILE_SIZE_MB: u64 = 100;
const DEFAULT_SCAN_TIMEOUT_SECONDS: u64 = 300;
const DEFAULT_DEADLINE_MARGIN_SECONDS: u64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a non-negative integer, got `{value}`")]
    InvalidNumber { key: &'static str, value: String },
    #[error("{key} is not a valid log level: `{value}`")]
    InvalidLogLevel { key: &'static str, value: String },
}

/// Settings for one execution environment, read from the environment once at
/// cold start and shared immutably by every invocation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bucket scanned by manual invocations. `None` when unset or empty.
    pub bucket: Option<String>,
    pub log_level: LevelFilter,
    /// Objects of this size or larger are skipped.
    pub max_file_size: u64,
    pub clamscan_path: PathBuf,
    pub database_dir: Option<PathBuf>,
    pub scan_timeout: Duration,
    /// A full-bucket scan stops once the remaining invocation time drops to this.
    pub deadline_margin: Duration,
    pub scratch_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket: None,
            log_level: LevelFilter::INFO,
            max_file_size: DEFAULT_MAX_FILE_SIZE_MB * BYTES_PER_MB,
            clamscan_path: PathBuf::from("clamscan"),
            database_dir: None,
            scan_timeout: Duration::from_secs(DEFAULT_SCAN_TIMEOUT_SECONDS),
            deadline_margin: Duration::from_secs(DEFAULT_DEADLINE_MARGIN_SECONDS),
            scratch_dir: std::env::temp_dir(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let log_level = match read(env_keys::LOG_LEVEL) {
            Some(value) => {
                LevelFilter::from_str(&value).map_err(|_| ConfigError::InvalidLogLevel {
                    key: env_keys::LOG_LEVEL,
                    value,
                })?
            }
            None => defaults.log_level,
        };

        let max_file_size = match read(env_keys::MAX_FILE_SIZE_MB) {
            Some(value) => {
                parse_u64(env_keys::MAX_FILE_SIZE_MB, value)?.saturating_mul(BYTES_PER_MB)
            }
            None => defaults.max_file_size,
        };

        let scan_timeout = match read(env_keys::SCAN_TIMEOUT_SECONDS) {
            Some(value) => Duration::from_secs(parse_u64(env_keys::SCAN_TIMEOUT_SECONDS, value)?),
            None => defaults.scan_timeout,
        };

        let deadline_margin = match read(env_keys::DEADLINE_MARGIN_SECONDS) {
            Some(value) => {
                Duration::from_secs(parse_u64(env_keys::DEADLINE_MARGIN_SECONDS, value)?)
            }
            None => defaults.deadline_margin,
        };

        Ok(Self {
            bucket: read(env_keys::S3_BUCKET_NAME),
            log_level,
            max_file_size,
            clamscan_path: read(env_keys::CLAMSCAN_PATH)
                .map(PathBuf::from)
                .unwrap_or(defaults.clamscan_path),
            database_dir: read(env_keys::CLAMAV_DATABASE_DIR).map(PathBuf::from),
            scan_timeout,
            deadline_margin,
            scratch_dir: read(env_keys::SCRATCH_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
        })
    }
}

fn parse_u64(key: &'static str, value: String) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidNumber { key, value })
}
