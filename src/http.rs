//! HTTP access for playlists, keys and segments

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::config::HttpConfig;
use crate::error::{Error, Result};

/// Shared HTTP client
///
/// Cheap to clone; all clones share one connection pool. Every request carries the
/// configured User-Agent, the configured default headers and the per-task headers
/// (task headers win on conflicts).
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    config: Arc<HttpConfig>,
}

impl HttpClient {
    /// Build a client from configuration
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            config: Arc::new(config.clone()),
        })
    }

    /// Configuration this client was built with
    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// GET `url` and return the body; non-2xx becomes [`Error::HttpStatus`]
    pub async fn get_bytes(
        &self,
        url: &str,
        timeout: Duration,
        headers: &HashMap<String, String>,
    ) -> Result<Bytes> {
        let response = self.send(url, timeout, headers).await?;
        Ok(response.bytes().await?)
    }

    /// GET `url` and return the body as text
    pub async fn get_text(
        &self,
        url: &str,
        timeout: Duration,
        headers: &HashMap<String, String>,
    ) -> Result<String> {
        let response = self.send(url, timeout, headers).await?;
        Ok(response.text().await?)
    }

    async fn send(
        &self,
        url: &str,
        timeout: Duration,
        headers: &HashMap<String, String>,
    ) -> Result<reqwest::Response> {
        let mut request = self.client.get(url).timeout(timeout);
        for (name, value) in self.config.headers.iter() {
            if !headers.keys().any(|key| key.eq_ignore_ascii_case(name)) {
                request = request.header(name, value);
            }
        }
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

/// Fetches raw AES-128 key bytes
#[derive(Clone)]
pub struct KeyResolver {
    http: HttpClient,
}

impl KeyResolver {
    /// Create a resolver that fetches through `http`
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Fetch the key at `uri`
    ///
    /// Every failure, including a missing URI, is reported as [`Error::KeyFetch`].
    /// Length is not checked here.
    pub async fn fetch(&self, uri: Option<&str>, headers: &HashMap<String, String>) -> Result<Bytes> {
        let Some(uri) = uri.filter(|u| !u.is_empty()) else {
            return Err(Error::KeyFetch {
                uri: String::new(),
                reason: "key tag has no URI".to_string(),
            });
        };

        let key = self
            .http
            .get_bytes(uri, self.http.config().key_timeout, headers)
            .await
            .map_err(|e| Error::KeyFetch {
                uri: uri.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(uri, len = key.len(), "Fetched encryption key");
        Ok(key)
    }
}
