//! Shared test helpers for creating HlsDownloader instances in tests.

use std::path::Path;
use std::time::Duration;

use tempfile::{TempDir, tempdir};
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::{Config, RetryConfig};
use crate::downloader::HlsDownloader;
use crate::types::{Event, Status, TaskId, TaskSnapshot};

/// Config rooted in `root` with two workers and no transient retry.
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.download.output_dir = root.join("downloads");
    config.download.temp_dir = root.join("temp");
    config.download.max_concurrent_segments = 2;
    config.http.segment_timeout = Duration::from_secs(5);
    config.retry = RetryConfig::disabled();
    config
}

/// Helper to create a test HlsDownloader instance.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader() -> (HlsDownloader, TempDir) {
    let temp_dir = tempdir().unwrap();
    let downloader = HlsDownloader::new(test_config(temp_dir.path()))
        .await
        .unwrap();
    (downloader, temp_dir)
}

/// Media playlist listing `names` with 4-second durations.
pub(crate) fn media_playlist(names: &[&str]) -> String {
    let mut body = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n");
    for name in names {
        body.push_str(&format!("#EXTINF:4.0,\n{name}\n"));
    }
    body.push_str("#EXT-X-ENDLIST\n");
    body
}

/// Serve `body` at `route`.
pub(crate) async fn mount_body(server: &MockServer, route: &str, body: impl Into<Vec<u8>>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.into()))
        .mount(server)
        .await;
}

/// Wait for a progress event reporting `status` for `id`.
pub(crate) async fn wait_for_status(
    rx: &mut broadcast::Receiver<Event>,
    id: TaskId,
    status: Status,
) -> TaskSnapshot {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Ok(Event::Progress(snapshot)) if snapshot.id == id && snapshot.status == status => {
                    return snapshot;
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {status}"))
}
