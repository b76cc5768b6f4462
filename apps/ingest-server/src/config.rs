//! Configuration management for the Ingest server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::format::UnknownFormatPolicy;
use crate::upload::MAX_REAP_AGE_HOURS;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub stream: StreamConfig,
    pub upload: UploadConfig,
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// S3-compatible object store holding RAW footage
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
}

/// Media-hosting platform receiving delivery formats
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    pub api_base: String,
    pub account_id: String,
    pub api_token: String,
    /// Files up to this size get a basic direct-upload URL instead of a resumable session
    pub basic_upload_limit: u64,
    pub max_duration_seconds: u32,
}

/// Local chunked upload handling
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub temp_dir: PathBuf,
    pub final_dir: PathBuf,
    pub max_upload_size: u64,
    pub reap_max_age_hours: i64,
    pub reap_interval_secs: u64,
    pub unknown_format: UnknownFormatPolicy,
    pub probe_on_finalize: bool,
}

/// Timeouts applied to every outbound backend call
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimeoutConfig {
    /// Session creation, completion, abort, status and presign calls
    pub control_secs: u64,
    /// Part, chunk and relay transfers
    pub transfer_secs: u64,
}

impl TimeoutConfig {
    pub fn control(&self) -> Duration {
        Duration::from_secs(self.control_secs)
    }

    pub fn transfer(&self) -> Duration {
        Duration::from_secs(self.transfer_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5001,
            },
            storage: StorageConfig {
                endpoint: "http://localhost:9000".to_string(),
                bucket: "color-studio-raw".to_string(),
                access_key: "admin".to_string(),
                secret_key: "password123".to_string(),
                region: Some("auto".to_string()),
            },
            stream: StreamConfig {
                api_base: "https://api.cloudflare.com/client/v4".to_string(),
                account_id: String::new(),
                api_token: String::new(),
                basic_upload_limit: 200 * 1024 * 1024,
                max_duration_seconds: 3600,
            },
            upload: UploadConfig {
                temp_dir: PathBuf::from("uploads/temp"),
                final_dir: PathBuf::from("uploads/projects"),
                max_upload_size: 20 * 1024 * 1024 * 1024,
                reap_max_age_hours: 24,
                reap_interval_secs: 300,
                unknown_format: UnknownFormatPolicy::Reject,
                probe_on_finalize: false,
            },
            timeouts: TimeoutConfig {
                control_secs: 20,
                transfer_secs: 300,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let account_id = env::var("CLOUDFLARE_ACCOUNT_ID").ok();

        // R2 endpoints are derived from the account id unless given explicitly
        let endpoint = match (env::var("S3_ENDPOINT").ok(), account_id.as_deref()) {
            (Some(endpoint), _) => endpoint,
            (None, Some(account)) => format!("https://{}.r2.cloudflarestorage.com", account),
            (None, None) => return Err(ConfigError::Missing("S3_ENDPOINT")),
        };

        let config = Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port)?,
            },
            storage: StorageConfig {
                endpoint,
                bucket: env::var("S3_BUCKET").unwrap_or(defaults.storage.bucket),
                access_key: require("S3_ACCESS_KEY")?,
                secret_key: require("S3_SECRET_KEY")?,
                region: env::var("S3_REGION").ok().or(defaults.storage.region),
            },
            stream: StreamConfig {
                api_base: env::var("STREAM_API_BASE").unwrap_or(defaults.stream.api_base),
                account_id: account_id.unwrap_or_default(),
                api_token: env::var("CLOUDFLARE_API_TOKEN").unwrap_or_default(),
                basic_upload_limit: parse_var(
                    "STREAM_BASIC_UPLOAD_LIMIT",
                    defaults.stream.basic_upload_limit,
                )?,
                max_duration_seconds: parse_var(
                    "STREAM_MAX_DURATION_SECONDS",
                    defaults.stream.max_duration_seconds,
                )?,
            },
            upload: UploadConfig {
                temp_dir: env::var("UPLOAD_TEMP_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.upload.temp_dir),
                final_dir: env::var("UPLOAD_FINAL_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.upload.final_dir),
                max_upload_size: parse_var("MAX_UPLOAD_SIZE", defaults.upload.max_upload_size)?,
                reap_max_age_hours: parse_var(
                    "REAP_MAX_AGE_HOURS",
                    defaults.upload.reap_max_age_hours,
                )?,
                reap_interval_secs: parse_var(
                    "REAP_INTERVAL_SECS",
                    defaults.upload.reap_interval_secs,
                )?,
                unknown_format: parse_var("UNKNOWN_FORMAT_POLICY", defaults.upload.unknown_format)?,
                probe_on_finalize: parse_var(
                    "PROBE_ON_FINALIZE",
                    defaults.upload.probe_on_finalize,
                )?,
            },
            timeouts: TimeoutConfig {
                control_secs: parse_var("CONTROL_TIMEOUT_SECS", defaults.timeouts.control_secs)?,
                transfer_secs: parse_var(
                    "TRANSFER_TIMEOUT_SECS",
                    defaults.timeouts.transfer_secs,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the reaper delete live sessions or stall
    pub fn validate(&self) -> Result<(), ConfigError> {
        let upload = &self.upload;
        if !(1..=MAX_REAP_AGE_HOURS).contains(&upload.reap_max_age_hours) {
            return Err(ConfigError::Invalid(
                "REAP_MAX_AGE_HOURS",
                format!(
                    "{} is outside 1..={}",
                    upload.reap_max_age_hours, MAX_REAP_AGE_HOURS
                ),
            ));
        }
        if upload.reap_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "REAP_INTERVAL_SECS",
                "must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid(name, e.to_string())),
        Err(_) => Ok(default),
    }
}
