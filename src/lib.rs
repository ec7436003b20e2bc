//! # hls-dl
//!
//! Backend library for downloading HTTP Live Streaming (HLS) media.
//!
//! A task fetches a media playlist, resolves AES-128 keys, downloads every
//! segment through a bounded worker pool and concatenates the decrypted
//! segments, in playlist order, into a single output file.
//!
//! - **Library-first** - no CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - consumers subscribe to progress snapshots
//! - **Recoverable** - failed segments leave the task `partial`; `retry`
//!   re-fetches only those segments
//!
//! ## Quick Start
//!
//! ```no_run
//! use hls_dl::{Config, HlsDownloader, TaskOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = HlsDownloader::new(Config::default()).await?;
//!
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let id = downloader
//!         .create_task(
//!             "https://cdn.example.com/show/index.m3u8",
//!             TaskOptions {
//!                 title: Some("episode-01".into()),
//!                 ..Default::default()
//!             },
//!         )
//!         .await?;
//!
//!     let snapshot = downloader.wait(id).await?;
//!     println!("{} -> {:?}", snapshot.status, snapshot.output_path);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// AES-128-CBC segment decryption
pub mod crypto;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Shared HTTP client and key resolution
pub mod http;
/// Segment concatenation into the final artifact
pub mod merge;
/// Media playlist parsing
pub mod playlist;
/// Retry logic with exponential backoff
pub mod retry;
/// Registry of active tasks
pub mod store;
/// Per-task state machine and bookkeeping
pub mod task;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, FileCollisionAction};
pub use crypto::SegmentDecryptor;
pub use downloader::HlsDownloader;
pub use error::{CryptoError, Error, MergeError, ParseError, Result, TaskError};
pub use http::{HttpClient, KeyResolver};
pub use merge::{MergedOutput, Merger};
pub use playlist::{EncryptionDescriptor, Playlist, PlaylistParser, Segment};
pub use store::TaskStore;
pub use types::{Event, OutputFormat, Status, TaskId, TaskOptions, TaskSnapshot};
