//! Key resolution: fetch every distinct key the working segments reference.

use std::collections::HashMap;

use crate::crypto::SegmentDecryptor;
use crate::error::{CryptoError, Result};
use crate::http::KeyResolver;
use crate::playlist::Segment;
use crate::task::KeyRing;

use super::context::DownloadTaskContext;

/// Fetch and validate each key once, in playlist order.
///
/// Any failure is fatal for the task: an unsupported method, a missing or
/// unreachable key URI, or a key that is not 16 bytes.
pub(super) async fn resolve_keys(
    ctx: &DownloadTaskContext,
    segments: &[Segment],
    headers: &HashMap<String, String>,
) -> Result<KeyRing> {
    let resolver = KeyResolver::new(ctx.http.clone());
    let mut keys = KeyRing::new();

    for descriptor in segments.iter().filter_map(|s| s.encryption.as_ref()) {
        if !descriptor.is_aes128() {
            return Err(CryptoError::UnsupportedMethod(descriptor.method.clone()).into());
        }

        let uri = descriptor.uri.clone().unwrap_or_default();
        if keys.contains_key(&uri) {
            continue;
        }

        let bytes = resolver.fetch(descriptor.uri.as_deref(), headers).await?;
        keys.insert(uri, SegmentDecryptor::new(&bytes)?);
    }

    if !keys.is_empty() {
        tracing::debug!(task_id = %ctx.id(), keys = keys.len(), "Resolved encryption keys");
    }
    Ok(keys)
}
