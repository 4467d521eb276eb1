//! Remote fetching: manifests and release archives over HTTP(S).
//!
//! [`RemoteSource`] is the seam the resolver and installer consume; the
//! production implementation is [`HttpFetcher`], a reqwest client with
//! explicit per-request timeouts and a bounded exponential-backoff retry for
//! transient transport failures. Non-success statuses are never retried: a
//! 404 today will be a 404 in two seconds as well.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, warn};

use crate::config::NetworkSettings;
use crate::constants::{MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS, USER_AGENT};
use crate::core::UpgradeError;

/// Source of remote manifests and archives.
///
/// The two methods mirror the two external HTTP interfaces of an upgrade:
/// a small JSON manifest and a (potentially large) archive download.
#[allow(async_fn_in_trait)]
pub trait RemoteSource: Send + Sync {
    /// Fetch a manifest body as text.
    async fn fetch_manifest(&self, url: &str) -> Result<String, UpgradeError>;
    /// Fetch a release archive as raw bytes.
    async fn fetch_archive(&self, url: &str) -> Result<Vec<u8>, UpgradeError>;
}

/// HTTP implementation of [`RemoteSource`].
pub struct HttpFetcher {
    client: reqwest::Client,
    manifest_timeout: Duration,
    download_timeout: Duration,
    attempts: u32,
}

impl HttpFetcher {
    /// Build a fetcher from the network settings.
    pub fn new(network: &NetworkSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            manifest_timeout: Duration::from_secs(network.manifest_timeout_secs),
            download_timeout: Duration::from_secs(network.download_timeout_secs),
            attempts: network.retries.max(1),
        })
    }

    /// Transient transport failures are worth another attempt; everything
    /// else is reported immediately.
    fn is_transient(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect()
    }

    async fn get_with_retry(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<reqwest::Response, UpgradeError> {
        let mut backoff = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
            .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS));

        let mut attempt = 1;
        loop {
            debug!(url, attempt, "Fetching");
            match self.client.get(url).timeout(timeout).send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        return Err(UpgradeError::Http {
                            url: url.to_string(),
                            status: status.as_u16(),
                        });
                    }
                    return Ok(response);
                }
                Err(e) if Self::is_transient(&e) && attempt < self.attempts => {
                    let delay = backoff.next().unwrap_or(Duration::from_millis(MAX_BACKOFF_DELAY_MS));
                    warn!(url, attempt, error = %e, "Transient fetch failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(UpgradeError::Network {
                        url: url.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

impl RemoteSource for HttpFetcher {
    async fn fetch_manifest(&self, url: &str) -> Result<String, UpgradeError> {
        let response = self.get_with_retry(url, self.manifest_timeout).await?;
        let body = response.text().await.map_err(|e| UpgradeError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if body.trim().is_empty() {
            return Err(UpgradeError::EmptyResponse {
                url: url.to_string(),
            });
        }
        Ok(body)
    }

    async fn fetch_archive(&self, url: &str) -> Result<Vec<u8>, UpgradeError> {
        let mut response = self.get_with_retry(url, self.download_timeout).await?;

        let progress = response.content_length().map(|total| {
            ProgressBar::new(total).with_style(ProgressStyle::default_bar())
        });

        let mut bytes: Vec<u8> = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    bytes.extend_from_slice(&chunk);
                    if let Some(pb) = &progress {
                        pb.inc(chunk.len() as u64);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    if let Some(pb) = &progress {
                        pb.finish_and_clear();
                    }
                    return Err(UpgradeError::Network {
                        url: url.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        if let Some(pb) = &progress {
            pb.finish_and_clear();
        }

        if bytes.is_empty() {
            return Err(UpgradeError::EmptyResponse {
                url: url.to_string(),
            });
        }
        debug!(url, size = bytes.len(), "Archive downloaded");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetcher_builds_from_default_settings() {
        let fetcher = HttpFetcher::new(&NetworkSettings::default()).unwrap();
        assert_eq!(fetcher.manifest_timeout, Duration::from_secs(30));
        assert_eq!(fetcher.download_timeout, Duration::from_secs(300));
        assert_eq!(fetcher.attempts, 3);
    }

    #[test]
    fn zero_retries_still_attempts_once() {
        let network = NetworkSettings {
            retries: 0,
            ..NetworkSettings::default()
        };
        let fetcher = HttpFetcher::new(&network).unwrap();
        assert_eq!(fetcher.attempts, 1);
    }
}
