use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::ArchiveSource;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_ATTEMPTS: u32 = 10;
/// Largest up-front allocation taken from a `Content-Length` header.
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// Archive served over HTTP(S), downloaded in full.
///
/// Timeouts and connection failures are retried with a linear back-off;
/// any other failure, including a non-success status, ends the download.
pub struct HttpSource {
    client: Client,
    url: String,
    max_attempts: u32,
    received: AtomicU64,
}

impl HttpSource {
    pub fn new(url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("cannot build HTTP client")?;

        Ok(Self {
            client,
            url,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            received: AtomicU64::new(0),
        })
    }

    /// Give up after `attempts` failed connection attempts (at least one).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Body bytes received so far, across all attempts.
    pub fn transferred_bytes(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    async fn send(&self) -> Result<Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(&self.url).send().await {
                Ok(response) => return Ok(response),
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < self.max_attempts => {
                    log::warn!(
                        "request to {} failed (attempt {}/{}): {}",
                        self.url,
                        attempt,
                        self.max_attempts,
                        e
                    );
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("request to {} failed after {} attempt(s)", self.url, attempt)
                    });
                }
            }
        }
    }
}

/// Delay before the next attempt.
fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(500 * attempt as u64)
}

#[async_trait]
impl ArchiveSource for HttpSource {
    async fn load(&self) -> Result<Vec<u8>> {
        let mut response = self.send().await?;
        let status = response.status();
        if !status.is_success() {
            bail!("{} answered with status {}", self.url, status);
        }

        let capacity = response.content_length().unwrap_or(0).min(MAX_PREALLOCATION);
        let mut body = Vec::with_capacity(capacity as usize);
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("download of {} interrupted", self.url))?
        {
            self.received
                .fetch_add(chunk.len() as u64, Ordering::Relaxed);
            body.extend_from_slice(&chunk);
        }

        log::debug!("downloaded {} bytes from {}", body.len(), self.url);
        Ok(body)
    }

    fn location(&self) -> &str {
        &self.url
    }
}
