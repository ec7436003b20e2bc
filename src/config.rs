//! Configuration types for hls-dl

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, time::Duration};

/// Download behavior configuration (directories, concurrency, output collisions)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory for final artifacts (default: "./downloads")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory holding one private subdirectory per active task (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Worker count per task (default: 5), clamped to the queue length
    #[serde(default = "default_max_concurrent_segments")]
    pub max_concurrent_segments: usize,

    /// What to do when the output file already exists
    #[serde(default)]
    pub file_collision: FileCollisionAction,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            temp_dir: default_temp_dir(),
            max_concurrent_segments: default_max_concurrent_segments(),
            file_collision: FileCollisionAction::default(),
        }
    }
}

/// HTTP client configuration
///
/// Timeouts are per request. There is no overall task deadline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for fetching the playlist (default: 10 seconds)
    #[serde(default = "default_playlist_timeout", with = "duration_serde")]
    pub playlist_timeout: Duration,

    /// Timeout for fetching an encryption key (default: 10 seconds)
    #[serde(default = "default_key_timeout", with = "duration_serde")]
    pub key_timeout: Duration,

    /// Timeout for fetching a single segment (default: 30 seconds)
    #[serde(default = "default_segment_timeout", with = "duration_serde")]
    pub segment_timeout: Duration,

    /// Extra headers sent with every request (task headers override these)
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            playlist_timeout: default_playlist_timeout(),
            key_timeout: default_key_timeout(),
            segment_timeout: default_segment_timeout(),
            headers: HashMap::new(),
        }
    }
}

/// Retry configuration for transient segment failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try (default: 2)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no backoff
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

/// File collision handling strategy for the final artifact
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename (default)
    #[default]
    Rename,
    /// Overwrite existing file
    Overwrite,
    /// Fail the merge, keep existing
    Skip,
}

/// Main configuration for HlsDownloader
///
/// Fields are organized into sub-configs:
/// - [`download`](DownloadConfig) - directories, concurrency, collisions
/// - [`http`](HttpConfig) - headers and per-request timeouts
/// - [`retry`](RetryConfig) - per-segment transient retry
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directories and concurrency
    #[serde(default)]
    pub download: DownloadConfig,

    /// HTTP client behavior
    #[serde(default)]
    pub http: HttpConfig,

    /// Segment retry behavior
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Output directory
    pub fn output_dir(&self) -> &PathBuf {
        &self.download.output_dir
    }

    /// Temporary directory
    pub fn temp_dir(&self) -> &PathBuf {
        &self.download.temp_dir
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.download.max_concurrent_segments == 0 {
            return Err(crate::Error::Config {
                message: "max_concurrent_segments must be at least 1".to_string(),
                key: Some("max_concurrent_segments".to_string()),
            });
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(crate::Error::Config {
                message: "backoff_multiplier must be >= 1.0".to_string(),
                key: Some("backoff_multiplier".to_string()),
            });
        }
        Ok(())
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_max_concurrent_segments() -> usize {
    5
}

fn default_user_agent() -> String {
    concat!("hls-dl/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_playlist_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_key_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_segment_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (whole seconds)
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
