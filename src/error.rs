//! Error types for hls-dl
//!
//! This module provides the error taxonomy for the library:
//! - Playlist errors (malformed, master playlist, empty)
//! - Crypto errors (key length, unsupported method, decrypt failure)
//! - Merge errors (missing artifact, I/O during concatenation)
//! - Task control errors (not found, invalid state transitions)
//! - Machine-readable error codes for callers that relay errors elsewhere

use std::path::PathBuf;
use thiserror::Error;

use crate::types::{Status, TaskId};

/// Result type alias for hls-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for hls-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "temp_dir")
        key: Option<String>,
    },

    /// Playlist could not be used
    #[error("playlist error: {0}")]
    Parse(#[from] ParseError),

    /// Key or segment decryption failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Concatenating segment artifacts failed
    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    /// Task lookup or state transition failed
    #[error("task error: {0}")]
    Task(#[from] TaskError),

    /// Fetching the encryption key failed
    #[error("key fetch failed for {uri}: {reason}")]
    KeyFetch {
        /// Key URI (empty when the playlist did not provide one)
        uri: String,
        /// The reason the fetch failed
        reason: String,
    },

    /// Server answered with a non-success status
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Playlist parsing errors
#[derive(Debug, Error)]
pub enum ParseError {
    /// Source URL could not be parsed
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Parser message
        reason: String,
    },

    /// Playlist references variant streams instead of media segments
    #[error("master playlist at {url}: pick a variant stream playlist")]
    MasterPlaylist {
        /// Playlist URL
        url: String,
    },

    /// Playlist contained no media URIs
    #[error("playlist at {url} contains no segments")]
    EmptyPlaylist {
        /// Playlist URL
        url: String,
    },

    /// First line was not the playlist header
    #[error("missing #EXTM3U header in {url}")]
    MissingHeader {
        /// Playlist URL
        url: String,
    },

    /// A segment reference could not be resolved against the playlist URL
    #[error("cannot resolve segment URI '{uri}': {reason}")]
    UnresolvableUri {
        /// The URI as written in the playlist
        uri: String,
        /// Resolver message
        reason: String,
    },

    /// Media sequence number of a segment does not fit in 64 bits
    #[error("media sequence {base} + {index} overflows in {url}")]
    InvalidSequence {
        /// Playlist URL
        url: String,
        /// `#EXT-X-MEDIA-SEQUENCE` value
        base: u64,
        /// Segment position
        index: usize,
    },

    /// Requested segment range selects nothing
    #[error("segment range {start}..={end} is empty")]
    EmptyRange {
        /// 1-based start after clamping
        start: usize,
        /// 1-based end after clamping
        end: usize,
    },
}

/// Decryption errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AES-128 keys are exactly 16 bytes
    #[error("key has {0} bytes, expected 16")]
    KeyLength(usize),

    /// Encryption method is not AES-128
    #[error("unsupported encryption method '{0}'")]
    UnsupportedMethod(String),

    /// Explicit IV is not valid hex
    #[error("invalid IV '{iv}': {reason}")]
    InvalidIv {
        /// IV as written in the playlist
        iv: String,
        /// Decoder message
        reason: String,
    },

    /// Ciphertext could not be decrypted (e.g. not a multiple of the block size)
    #[error("cannot decrypt {len} bytes: {reason}")]
    Decrypt {
        /// Ciphertext length
        len: usize,
        /// Cipher message
        reason: String,
    },
}

/// Merge errors
#[derive(Debug, Error)]
pub enum MergeError {
    /// An expected segment artifact does not exist
    #[error("segment {index} artifact missing at {path}")]
    MissingSegment {
        /// Segment index
        index: usize,
        /// Expected artifact path
        path: PathBuf,
    },

    /// Output file could not be written
    #[error("failed to write {path}: {source}")]
    Write {
        /// Output path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Output path collides with an existing file and collisions are not allowed
    #[error("output file already exists at {0}")]
    Collision(PathBuf),
}

/// Task lookup and state errors
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task is not in the store
    #[error("task {0} not found")]
    NotFound(TaskId),

    /// Cannot perform operation in current state
    #[error("cannot {operation} task {id} in state {current}")]
    InvalidState {
        /// Task ID
        id: TaskId,
        /// The operation that was attempted (e.g., "pause", "retry")
        operation: &'static str,
        /// The current state that prevents the operation
        current: Status,
    },

    /// State machine edge does not exist
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: Status,
        /// Requested status
        to: Status,
    },
}

impl Error {
    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Parse(e) => match e {
                ParseError::InvalidUrl { .. } => "invalid_url",
                ParseError::MasterPlaylist { .. } => "master_playlist",
                ParseError::EmptyPlaylist { .. } => "empty_playlist",
                ParseError::MissingHeader { .. } => "missing_header",
                ParseError::UnresolvableUri { .. } => "unresolvable_uri",
                ParseError::InvalidSequence { .. } => "invalid_sequence",
                ParseError::EmptyRange { .. } => "empty_range",
            },
            Error::Crypto(e) => match e {
                CryptoError::KeyLength(_) => "key_length",
                CryptoError::UnsupportedMethod(_) => "unsupported_method",
                CryptoError::InvalidIv { .. } => "invalid_iv",
                CryptoError::Decrypt { .. } => "decrypt_failed",
            },
            Error::Merge(e) => match e {
                MergeError::MissingSegment { .. } => "missing_segment",
                MergeError::Write { .. } => "merge_write_failed",
                MergeError::Collision(_) => "file_collision",
            },
            Error::Task(e) => match e {
                TaskError::NotFound(_) => "task_not_found",
                TaskError::InvalidState { .. } => "invalid_state",
                TaskError::InvalidTransition { .. } => "invalid_transition",
            },
            Error::KeyFetch { .. } => "key_fetch_failed",
            Error::HttpStatus { .. } => "http_status",
            Error::Network(_) => "network_error",
            Error::Io(_) => "io_error",
        }
    }

    /// Whether this error ends the whole task rather than a single segment
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Network(_)
                | Error::HttpStatus { .. }
                | Error::Io(_)
                | Error::Crypto(CryptoError::Decrypt { .. })
        )
    }
}
