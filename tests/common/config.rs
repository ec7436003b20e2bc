//! Test configuration helpers for creating downloaders in temporary directories

use std::time::Duration;
use tempfile::TempDir;
use hls_dl::config::RetryConfig;
use hls_dl::{Config, HlsDownloader};

/// Config rooted in `root`: `workers` per task, short timeouts, no in-place retry
pub fn test_config(root: &std::path::Path, workers: usize) -> Config {
    let mut config = Config::default();
    config.download.output_dir = root.join("downloads");
    config.download.temp_dir = root.join("temp");
    config.download.max_concurrent_segments = workers;
    config.http.playlist_timeout = Duration::from_secs(5);
    config.http.key_timeout = Duration::from_secs(5);
    config.http.segment_timeout = Duration::from_secs(5);
    config.retry = RetryConfig::disabled();
    config
}

/// Downloader with `workers` per task; keep the TempDir alive for the test
pub async fn create_downloader(workers: usize) -> (HlsDownloader, TempDir) {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let downloader = HlsDownloader::new(test_config(temp_dir.path(), workers))
        .await
        .expect("failed to create downloader");
    (downloader, temp_dir)
}
