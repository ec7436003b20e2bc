//! Core types for hls-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Unique identifier for a download task
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub uuid::Uuid);

impl TaskId {
    /// Create a new random TaskId
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn get(&self) -> uuid::Uuid {
        self.0
    }
}

impl From<uuid::Uuid> for TaskId {
    fn from(id: uuid::Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created, not started yet
    Pending,
    /// Fetching and parsing the playlist
    Parsing,
    /// Workers are draining the segment queue
    Downloading,
    /// Paused by user, in-flight segments finish
    Paused,
    /// Concatenating segment artifacts
    Merging,
    /// Final artifact written
    Completed,
    /// Some segments failed, waiting for retry
    Partial,
    /// Unrecoverable failure
    Error,
    /// Cancelled by user
    Cancelled,
}

impl Status {
    /// Lowercase name used in snapshots and messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Parsing => "parsing",
            Status::Downloading => "downloading",
            Status::Paused => "paused",
            Status::Merging => "merging",
            Status::Completed => "completed",
            Status::Partial => "partial",
            Status::Error => "error",
            Status::Cancelled => "cancelled",
        }
    }

    /// No further transitions leave this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Error | Status::Cancelled)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Form of the final artifact, reflected in its extension
///
/// Both forms are a byte concatenation of the decrypted segments; remuxing into
/// a real MP4 container is left to external tools.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// MPEG transport stream (default)
    #[default]
    Ts,
    /// MP4 container
    Mp4,
}

impl OutputFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Ts => "ts",
            OutputFormat::Mp4 => "mp4",
        }
    }
}

/// Options for creating a task
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskOptions {
    /// Output file name stem (default: `video_<unix millis>`)
    #[serde(default)]
    pub title: Option<String>,

    /// Name the output `.mp4` instead of `.ts`
    #[serde(default)]
    pub convert_to_mp4: bool,

    /// First segment to download, 1-based inclusive
    #[serde(default)]
    pub start_segment: Option<i64>,

    /// Last segment to download, 1-based inclusive
    #[serde(default)]
    pub end_segment: Option<i64>,

    /// Extra request headers for playlist, key and segment requests
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Override the configured worker count for this task
    #[serde(default)]
    pub max_concurrent_segments: Option<usize>,
}

impl TaskOptions {
    /// Output form selected by `convert_to_mp4`
    pub fn output_format(&self) -> OutputFormat {
        if self.convert_to_mp4 {
            OutputFormat::Mp4
        } else {
            OutputFormat::Ts
        }
    }
}

/// Point-in-time view of a task, sent with every progress event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Task ID
    pub id: TaskId,
    /// Playlist URL
    pub url: String,
    /// Output title
    pub title: String,
    /// Current status
    pub status: Status,
    /// Percentage of segments downloaded (0 to 100)
    pub progress: u8,
    /// Segments in the working range
    pub total_segments: usize,
    /// Segments persisted to the temp directory
    pub downloaded_segments: usize,
    /// Segments whose last attempt failed
    pub failed_segments: usize,
    /// Recent download rate in bytes per second
    pub speed_bps: u64,
    /// Bytes fetched from the network by this task
    pub downloaded_bytes: u64,
    /// Estimated seconds to finish (None if unknown)
    pub eta_seconds: Option<u64>,
    /// Sum of segment durations in seconds
    pub total_duration: f64,
    /// Output form
    pub output_format: OutputFormat,
    /// Final artifact path once merged
    pub output_path: Option<PathBuf>,
    /// Final artifact size once merged
    pub output_size: Option<u64>,
    /// Last error message
    pub error: Option<String>,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// When the task last changed
    pub updated_at: DateTime<Utc>,
}

/// Event emitted during the task lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task accepted and registered
    Created {
        /// Task ID
        id: TaskId,
        /// Playlist URL
        url: String,
    },

    /// Any state-affecting change: status, segment completion or failure
    Progress(TaskSnapshot),

    /// Task dropped from the store
    Removed {
        /// Task ID
        id: TaskId,
    },
}
