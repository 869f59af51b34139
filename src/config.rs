//! Configuration types for usenet-file-server

use crate::archive::ArchiveKind;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for usenet-file-server
///
/// Every component receives the part of this it needs at construction time;
/// nothing is read from process-wide state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Root of the served tree; request paths and archive scans are relative to it
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Range streaming behavior
    #[serde(default)]
    pub streaming: StreamingConfig,

    /// Archive stability monitor and extraction scheduler
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// API and external server integration
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            streaming: StreamingConfig::default(),
            monitor: MonitorConfig::default(),
            server: ServerIntegrationConfig::default(),
        }
    }
}

impl Config {
    /// Create a configuration serving `root_dir` with all other settings at their defaults
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Check settings that would make a component misbehave at runtime
    pub fn validate(&self) -> Result<()> {
        if self.streaming.chunk_size == 0 {
            return Err(config_error(
                "chunk size must be greater than zero",
                "streaming.chunk_size",
            ));
        }

        let threshold = self.streaming.retry.end_seek_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(config_error(
                format!("end-seek threshold must be in (0, 1], got {threshold}"),
                "streaming.retry.end_seek_threshold",
            ));
        }

        if self.streaming.retry.backoff_multiplier < 1.0 {
            return Err(config_error(
                "backoff multiplier must be at least 1.0",
                "streaming.retry.backoff_multiplier",
            ));
        }

        if self.monitor.scan_interval.is_zero() {
            return Err(config_error(
                "scan interval must be greater than zero",
                "monitor.scan_interval",
            ));
        }

        if self.monitor.max_concurrent_extractions == 0 {
            return Err(config_error(
                "at least one concurrent extraction is required",
                "monitor.max_concurrent_extractions",
            ));
        }

        Ok(())
    }
}

fn config_error(message: impl Into<String>, key: &str) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.to_string()),
    }
}

/// Range streaming configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Maximum bytes read from a source per step (default: 256 KiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Retry budget for reads that return no data yet
    #[serde(default)]
    pub retry: RetryConfig,

    /// Name of the directory holding still-downloading files (default: "incomplete")
    ///
    /// Files with this directory among their path components are expected to
    /// grow, and responses for them are capped at `incomplete_max_response`.
    #[serde(default = "default_incomplete_dir_name")]
    pub incomplete_dir_name: String,

    /// Largest response served for a file that is still being downloaded (default: 10 MiB)
    #[serde(default = "default_incomplete_max_response")]
    pub incomplete_max_response: u64,

    /// Fall back to a tree-wide search by file name when the exact path is missing (default: true)
    #[serde(default = "default_true")]
    pub search_by_name: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            retry: RetryConfig::default(),
            incomplete_dir_name: default_incomplete_dir_name(),
            incomplete_max_response: default_incomplete_max_response(),
            search_by_name: true,
        }
    }
}

/// Retry configuration for reads that come back empty before the range is done
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Empty reads tolerated in a row before giving up (default: 30)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Empty reads tolerated when the cursor is past `end_seek_threshold` (default: 3)
    #[serde(default = "default_end_seek_attempts")]
    pub end_seek_attempts: u32,

    /// Fraction of the total size beyond which a read counts as an end-seek (default: 0.9)
    #[serde(default = "default_end_seek_threshold")]
    pub end_seek_threshold: f64,

    /// Initial delay before the first retry (default: 100 ms)
    #[serde(default = "default_initial_delay", with = "millis_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 1 second)
    #[serde(default = "default_max_delay", with = "millis_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 1.5)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            end_seek_attempts: default_end_seek_attempts(),
            end_seek_threshold: default_end_seek_threshold(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Archive stability monitor configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Run the background scheduler (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Time between scans of the root directory (default: 10 seconds)
    #[serde(default = "default_scan_interval", with = "duration_serde")]
    pub scan_interval: Duration,

    /// How long a size must stay unchanged before it counts as stable (default: 30 seconds)
    #[serde(default = "default_stable_after", with = "duration_serde")]
    pub stable_after: Duration,

    /// Hard limit on a single extraction call (default: 300 seconds)
    #[serde(default = "default_extraction_timeout", with = "duration_serde")]
    pub extraction_timeout: Duration,

    /// Extractions allowed to run at the same time (default: 1)
    #[serde(default = "default_max_concurrent_extractions")]
    pub max_concurrent_extractions: usize,

    /// Archive kinds the scheduler extracts (default: all)
    #[serde(default = "default_kinds")]
    pub kinds: Vec<ArchiveKind>,

    /// Path to the 7z binary (default: found on PATH)
    #[serde(default)]
    pub sevenzip_path: Option<PathBuf>,

    /// Search PATH for the 7z binary when `sevenzip_path` is unset (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval: default_scan_interval(),
            stable_after: default_stable_after(),
            extraction_timeout: default_extraction_timeout(),
            max_concurrent_extractions: default_max_concurrent_extractions(),
            kinds: default_kinds(),
            sevenzip_path: None,
            search_path: true,
        }
    }
}

/// API and external server integration configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 0.0.0.0:3003)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Optional API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_chunk_size() -> usize {
    256 * 1024
}

fn default_incomplete_dir_name() -> String {
    "incomplete".to_string()
}

fn default_incomplete_max_response() -> u64 {
    10 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    30
}

fn default_end_seek_attempts() -> u32 {
    3
}

fn default_end_seek_threshold() -> f64 {
    0.9
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_backoff_multiplier() -> f64 {
    1.5
}

fn default_scan_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_stable_after() -> Duration {
    Duration::from_secs(30)
}

fn default_extraction_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_concurrent_extractions() -> usize {
    1
}

fn default_kinds() -> Vec<ArchiveKind> {
    vec![ArchiveKind::SevenZip, ArchiveKind::Rar, ArchiveKind::Zip]
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3003))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond Duration serialization helper, for sub-second retry delays
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
