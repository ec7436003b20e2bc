//! Mock HLS server fixtures

use std::time::Duration;

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Key served by encrypted fixtures
pub const TEST_KEY: [u8; 16] = *b"an-aes-128-key!!";

/// Media playlist listing `names`, each 4 seconds long, with optional extra header lines
pub fn media_playlist(header_lines: &[&str], names: &[String]) -> String {
    let mut body = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n");
    for line in header_lines {
        body.push_str(line);
        body.push('\n');
    }
    for name in names {
        body.push_str(&format!("#EXTINF:4.000,\n{name}\n"));
    }
    body.push_str("#EXT-X-ENDLIST\n");
    body
}

/// Segment file names `seg0.ts` .. `seg{count-1}.ts`
pub fn segment_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("seg{i}.ts")).collect()
}

/// Payload of segment `index`
pub fn segment_payload(index: usize) -> Vec<u8> {
    format!("<segment {index} payload>").into_bytes()
}

/// AES-128-CBC with PKCS#7 padding
pub fn encrypt(plain: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Vec<u8> {
    cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
        .expect("valid key and IV length")
        .encrypt_padded_vec_mut::<Pkcs7>(plain)
}

/// IV equal to `n` as a 128-bit big-endian integer
pub fn sequence_iv(n: u64) -> [u8; 16] {
    u128::from(n).to_be_bytes()
}

/// Serve `body` at `route`, expecting exactly `calls` requests
pub async fn mount_expect(server: &MockServer, route: &str, body: Vec<u8>, calls: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(calls)
        .mount(server)
        .await;
}

/// Serve `body` at `route` after `delay`
pub async fn mount_delayed(server: &MockServer, route: &str, body: Vec<u8>, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body).set_delay(delay))
        .mount(server)
        .await;
}

/// Serve `status` at `route` for the first `times` requests
pub async fn mount_status_once(server: &MockServer, route: &str, status: u16, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .up_to_n_times(times)
        .with_priority(1)
        .expect(times)
        .mount(server)
        .await;
}
