//! Media playlist parsing
//!
//! Turns playlist text into an ordered [`Segment`] list. Only media playlists are
//! accepted; a master playlist (one listing variant streams) is rejected instead of
//! guessing a variant.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ParseError, Result};
use crate::http::HttpClient;

const HEADER_TAG: &str = "#EXTM3U";
const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF";
const KEY_TAG: &str = "#EXT-X-KEY:";
const DURATION_TAG: &str = "#EXTINF:";
const MEDIA_SEQUENCE_TAG: &str = "#EXT-X-MEDIA-SEQUENCE:";

/// Attribute list entries: `NAME=value` or `NAME="quoted, value"`
static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r#"([A-Z0-9-]+)=("[^"]*"|[^,]*)"#).expect("attribute regex is valid")
});

/// Encryption parameters from an `#EXT-X-KEY` tag
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionDescriptor {
    /// METHOD attribute, e.g. `AES-128`
    pub method: String,
    /// Absolute key URI
    pub uri: Option<String>,
    /// Explicit IV as hex digits, without the `0x` prefix
    pub iv: Option<String>,
}

impl EncryptionDescriptor {
    /// Whether the method is whole-segment AES-128-CBC
    pub fn is_aes128(&self) -> bool {
        self.method.eq_ignore_ascii_case("AES-128")
    }
}

/// One media segment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Position in the working list; defines artifact name and merge order
    pub index: usize,
    /// Media sequence number, used for the implicit IV
    pub sequence: u64,
    /// Absolute segment URL
    pub uri: String,
    /// Duration in seconds from the preceding `#EXTINF`
    pub duration: f64,
    /// Key in effect where the segment appeared
    pub encryption: Option<EncryptionDescriptor>,
}

/// Parsed media playlist
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    /// Segments in playlist order
    pub segments: Vec<Segment>,
    /// Last key descriptor seen in the playlist
    pub encryption: Option<EncryptionDescriptor>,
    /// Sum of segment durations in seconds
    pub total_duration: f64,
    /// Directory of the playlist URL, with trailing slash
    pub base_url: String,
}

/// Fetches and parses media playlists
#[derive(Clone)]
pub struct PlaylistParser {
    http: HttpClient,
}

impl PlaylistParser {
    /// Create a parser that fetches through `http`
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Fetch `url` and parse it as a media playlist
    pub async fn parse(&self, url: &str, headers: &HashMap<String, String>) -> Result<Playlist> {
        let parsed = parse_source_url(url)?;
        let text = self
            .http
            .get_text(parsed.as_str(), self.http.config().playlist_timeout, headers)
            .await?;
        let playlist = parse_playlist(&text, &parsed)?;
        tracing::debug!(
            url = %parsed,
            segments = playlist.segments.len(),
            encrypted = playlist.encryption.is_some(),
            "Parsed playlist"
        );
        Ok(playlist)
    }
}

/// Validate a playlist URL
pub fn parse_source_url(url: &str) -> std::result::Result<Url, ParseError> {
    let parsed = Url::parse(url.trim()).map_err(|e| ParseError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ParseError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

/// Parse playlist text fetched from `playlist_url`
pub fn parse_playlist(content: &str, playlist_url: &Url) -> std::result::Result<Playlist, ParseError> {
    let mut lines = content
        .lines()
        .map(|line| line.trim_start_matches('\u{feff}').trim())
        .filter(|line| !line.is_empty())
        .peekable();

    if !lines.peek().is_some_and(|first| first.starts_with(HEADER_TAG)) {
        return Err(ParseError::MissingHeader {
            url: playlist_url.to_string(),
        });
    }

    let mut segments = Vec::new();
    let mut encryption: Option<EncryptionDescriptor> = None;
    let mut pending_duration = 0.0;
    let mut media_sequence = 0u64;

    for line in lines {
        if line.starts_with(STREAM_INF_TAG) {
            return Err(ParseError::MasterPlaylist {
                url: playlist_url.to_string(),
            });
        }

        if let Some(attributes) = line.strip_prefix(KEY_TAG) {
            encryption = parse_key_tag(attributes, playlist_url)?;
        } else if let Some(value) = line.strip_prefix(DURATION_TAG) {
            let duration = value.split(',').next().unwrap_or_default().trim();
            pending_duration = duration.parse().unwrap_or(0.0);
        } else if let Some(value) = line.strip_prefix(MEDIA_SEQUENCE_TAG) {
            media_sequence = value.trim().parse().unwrap_or(0);
        } else if !line.starts_with('#') {
            let index = segments.len();
            let sequence = media_sequence.checked_add(index as u64).ok_or_else(|| {
                ParseError::InvalidSequence {
                    url: playlist_url.to_string(),
                    base: media_sequence,
                    index,
                }
            })?;
            segments.push(Segment {
                index,
                sequence,
                uri: resolve_uri(line, playlist_url)?,
                duration: pending_duration,
                encryption: encryption.clone(),
            });
            pending_duration = 0.0;
        }
    }

    if segments.is_empty() {
        return Err(ParseError::EmptyPlaylist {
            url: playlist_url.to_string(),
        });
    }

    let total_duration = segments.iter().map(|s| s.duration).sum();
    Ok(Playlist {
        segments,
        encryption,
        total_duration,
        base_url: base_url(playlist_url),
    })
}

/// `METHOD=NONE` clears the key; anything else replaces it.
fn parse_key_tag(
    attributes: &str,
    playlist_url: &Url,
) -> std::result::Result<Option<EncryptionDescriptor>, ParseError> {
    let mut method = None;
    let mut uri = None;
    let mut iv = None;

    for caps in ATTRIBUTE_RE.captures_iter(attributes) {
        let value = caps[2].trim_matches('"');
        match &caps[1] {
            "METHOD" => method = Some(value.to_string()),
            "URI" => uri = Some(resolve_uri(value, playlist_url)?),
            "IV" => {
                let hex = value
                    .strip_prefix("0x")
                    .or_else(|| value.strip_prefix("0X"))
                    .unwrap_or(value);
                iv = Some(hex.to_string());
            }
            _ => {}
        }
    }

    let method = method.unwrap_or_default();
    if method.eq_ignore_ascii_case("NONE") {
        return Ok(None);
    }
    Ok(Some(EncryptionDescriptor { method, uri, iv }))
}

/// Absolute URLs pass through; `/path` resolves against the host; anything else
/// against the playlist's directory.
fn resolve_uri(reference: &str, playlist_url: &Url) -> std::result::Result<String, ParseError> {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return Ok(reference.to_string());
    }
    playlist_url
        .join(reference)
        .map(String::from)
        .map_err(|e| ParseError::UnresolvableUri {
            uri: reference.to_string(),
            reason: e.to_string(),
        })
}

fn base_url(playlist_url: &Url) -> String {
    playlist_url
        .join("./")
        .map(String::from)
        .unwrap_or_else(|_| playlist_url.to_string())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn playlist_url() -> Url {
        Url::parse("https://cdn.example.com/vod/show/index.m3u8?token=abc").unwrap()
    }

    const SIMPLE: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:10
#EXTINF:9.5,
seg0.ts
#EXTINF:10.0,
/root/seg1.ts
#EXTINF:4.25,title
https://other.example.org/seg2.ts
#EXT-X-ENDLIST
";

    #[test]
    fn resolves_relative_root_relative_and_absolute_uris() {
        let playlist = parse_playlist(SIMPLE, &playlist_url()).unwrap();
        let uris: Vec<_> = playlist.segments.iter().map(|s| s.uri.as_str()).collect();

        assert_eq!(
            uris,
            vec![
                "https://cdn.example.com/vod/show/seg0.ts",
                "https://cdn.example.com/root/seg1.ts",
                "https://other.example.org/seg2.ts",
            ]
        );
        assert_eq!(playlist.base_url, "https://cdn.example.com/vod/show/");
    }

    #[test]
    fn assigns_sequential_indices_and_durations() {
        let playlist = parse_playlist(SIMPLE, &playlist_url()).unwrap();

        let indices: Vec<_> = playlist.segments.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(playlist.segments[0].duration, 9.5);
        assert_eq!(playlist.segments[2].duration, 4.25);
        assert!((playlist.total_duration - 23.75).abs() < f64::EPSILON);
        assert!(playlist.encryption.is_none());
    }

    #[test]
    fn duration_resets_after_each_segment() {
        let content = "#EXTM3U\n#EXTINF:6,\na.ts\nb.ts\n";
        let playlist = parse_playlist(content, &playlist_url()).unwrap();

        assert_eq!(playlist.segments[0].duration, 6.0);
        assert_eq!(
            playlist.segments[1].duration, 0.0,
            "a URI without its own #EXTINF must not inherit the previous duration"
        );
    }

    #[test]
    fn stream_variant_tag_is_rejected() {
        let content = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=1280000,RESOLUTION=1280x720
720p/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2560000,RESOLUTION=1920x1080
1080p/index.m3u8
";
        match parse_playlist(content, &playlist_url()) {
            Err(ParseError::MasterPlaylist { url }) => assert!(url.contains("index.m3u8")),
            other => panic!("expected MasterPlaylist, got {other:?}"),
        }
    }

    #[test]
    fn stream_variant_after_segments_still_rejected() {
        let content = "#EXTM3U\n#EXTINF:5,\na.ts\n#EXT-X-STREAM-INF:BANDWIDTH=1\nv.m3u8\n";
        assert!(matches!(
            parse_playlist(content, &playlist_url()),
            Err(ParseError::MasterPlaylist { .. })
        ));
    }

    #[test]
    fn playlist_without_uris_is_empty_error() {
        let content = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-ENDLIST\n";
        assert!(matches!(
            parse_playlist(content, &playlist_url()),
            Err(ParseError::EmptyPlaylist { .. })
        ));
    }

    #[test]
    fn missing_header_is_rejected() {
        let content = "<html><body>Not found</body></html>";
        assert!(matches!(
            parse_playlist(content, &playlist_url()),
            Err(ParseError::MissingHeader { .. })
        ));
    }

    #[test]
    fn byte_order_mark_and_crlf_are_tolerated() {
        let content = "\u{feff}#EXTM3U\r\n#EXTINF:2.0,\r\nseg.ts\r\n";
        let playlist = parse_playlist(content, &playlist_url()).unwrap();
        assert_eq!(
            playlist.segments[0].uri,
            "https://cdn.example.com/vod/show/seg.ts"
        );
    }

    #[test]
    fn key_tag_attaches_snapshot_to_following_segments() {
        let content = r#"#EXTM3U
#EXTINF:4,
clear.ts
#EXT-X-KEY:METHOD=AES-128,URI="keys/k1.bin",IV=0x000102030405060708090A0B0C0D0E0F
#EXTINF:4,
enc1.ts
#EXT-X-KEY:METHOD=AES-128,URI="https://keys.example.com/k2"
#EXTINF:4,
enc2.ts
"#;
        let playlist = parse_playlist(content, &playlist_url()).unwrap();

        assert!(playlist.segments[0].encryption.is_none());

        let first = playlist.segments[1].encryption.as_ref().unwrap();
        assert!(first.is_aes128());
        assert_eq!(
            first.uri.as_deref(),
            Some("https://cdn.example.com/vod/show/keys/k1.bin")
        );
        assert_eq!(first.iv.as_deref(), Some("000102030405060708090A0B0C0D0E0F"));

        let second = playlist.segments[2].encryption.as_ref().unwrap();
        assert_eq!(second.uri.as_deref(), Some("https://keys.example.com/k2"));
        assert_eq!(second.iv, None);

        assert_eq!(playlist.encryption.as_ref(), Some(second));
    }

    #[test]
    fn quoted_uri_may_contain_commas() {
        let content = "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"/key?a=1,b=2\"\na.ts\n";
        let playlist = parse_playlist(content, &playlist_url()).unwrap();
        let key = playlist.encryption.unwrap();
        assert_eq!(
            key.uri.as_deref(),
            Some("https://cdn.example.com/key?a=1,b=2")
        );
    }

    #[test]
    fn method_none_clears_encryption() {
        let content = "#EXTM3U
#EXT-X-KEY:METHOD=AES-128,URI=\"k.bin\"
a.ts
#EXT-X-KEY:METHOD=NONE
b.ts
";
        let playlist = parse_playlist(content, &playlist_url()).unwrap();

        assert!(playlist.segments[0].encryption.is_some());
        assert!(playlist.segments[1].encryption.is_none());
        assert!(playlist.encryption.is_none());
    }

    #[test]
    fn media_sequence_offsets_sequence_numbers() {
        let content = "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:120\na.ts\nb.ts\n";
        let playlist = parse_playlist(content, &playlist_url()).unwrap();

        assert_eq!(playlist.segments[0].index, 0);
        assert_eq!(playlist.segments[0].sequence, 120);
        assert_eq!(playlist.segments[1].sequence, 121);
    }

    #[test]
    fn media_sequence_overflow_is_a_parse_error() {
        let content = "#EXTM3U
#EXT-X-MEDIA-SEQUENCE:18446744073709551615
#EXTINF:4,
a.ts
#EXTINF:4,
b.ts
";
        match parse_playlist(content, &playlist_url()) {
            Err(ParseError::InvalidSequence { base, index, .. }) => {
                assert_eq!(base, u64::MAX);
                assert_eq!(index, 1);
            }
            other => panic!("expected InvalidSequence, got {other:?}"),
        }
    }

    #[test]
    fn media_sequence_at_max_fits_a_single_segment() {
        let content = "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:18446744073709551615\na.ts\n";
        let playlist = parse_playlist(content, &playlist_url()).unwrap();
        assert_eq!(playlist.segments[0].sequence, u64::MAX);
    }

    #[test]
    fn sequence_equals_index_without_media_sequence() {
        let playlist = parse_playlist(SIMPLE, &playlist_url()).unwrap();
        assert!(
            playlist
                .segments
                .iter()
                .all(|s| s.sequence == s.index as u64)
        );
    }

    #[test]
    fn unknown_tags_are_ignored() {
        let content = "#EXTM3U
#EXT-X-PROGRAM-DATE-TIME:2024-01-01T00:00:00Z
#EXT-X-DISCONTINUITY
#EXTINF:3,
a.ts
";
        let playlist = parse_playlist(content, &playlist_url()).unwrap();
        assert_eq!(playlist.segments.len(), 1);
    }

    #[test]
    fn source_url_validation() {
        assert!(parse_source_url("https://cdn.example.com/a.m3u8").is_ok());
        assert!(matches!(
            parse_source_url("not a url"),
            Err(ParseError::InvalidUrl { .. })
        ));
        assert!(matches!(
            parse_source_url("ftp://cdn.example.com/a.m3u8"),
            Err(ParseError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn parse_fetches_playlist_over_http() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/live/index.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SIMPLE))
            .expect(1)
            .mount(&server)
            .await;

        let http = HttpClient::new(&crate::config::HttpConfig::default()).unwrap();
        let parser = PlaylistParser::new(http);
        let url = format!("{}/live/index.m3u8", server.uri());
        let playlist = parser.parse(&url, &HashMap::new()).await.unwrap();

        assert_eq!(playlist.segments.len(), 3);
        assert_eq!(
            playlist.segments[0].uri,
            format!("{}/live/seg0.ts", server.uri())
        );
    }

    #[tokio::test]
    async fn parse_surfaces_http_errors() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let http = HttpClient::new(&crate::config::HttpConfig::default()).unwrap();
        let parser = PlaylistParser::new(http);
        let err = parser
            .parse(&format!("{}/missing.m3u8", server.uri()), &HashMap::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            crate::Error::HttpStatus { status: 404, .. }
        ));
    }
}
