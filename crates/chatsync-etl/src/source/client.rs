//! Authenticated GET client for the chat platform's data API

use crate::config::SourceConfig;
use crate::error::{EtlError, Result};
use crate::models::Page;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Statuses worth another attempt
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

// Keeps `2^(n-1)` from overflowing with absurd retry counts
const MAX_BACKOFF_SHIFT: u32 = 16;

pub fn is_retryable(status: StatusCode) -> bool {
    RETRYABLE_STATUSES.contains(&status.as_u16())
}

/// Delay before retry `retry` (1-based). The first retry is immediate.
pub fn backoff_delay(factor: Duration, retry: u32) -> Duration {
    if retry <= 1 {
        return Duration::ZERO;
    }
    factor.saturating_mul(1u32 << (retry - 1).min(MAX_BACKOFF_SHIFT))
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

pub struct SourceClient {
    client: Client,
    config: SourceConfig,
}

impl SourceClient {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("chatsync-etl/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        self.config.endpoint_url.trim_end_matches('/')
    }

    /// GET `uri`, retrying retryable statuses and transport failures.
    ///
    /// Once retries run out on a retryable status the last response is returned as-is,
    /// so callers see the real status and body.
    pub async fn get(&self, uri: &str) -> Result<Response> {
        let max_retries = self.config.max_retries;
        let mut retry = 0;

        loop {
            let outcome = self
                .client
                .get(uri)
                .bearer_auth(self.config.api_key.expose())
                .send()
                .await;

            let delay = match outcome {
                Ok(response) if is_retryable(response.status()) && retry < max_retries => {
                    let delay = retry_after(&response)
                        .unwrap_or_else(|| backoff_delay(self.config.backoff_factor, retry + 1));
                    warn!(
                        status = response.status().as_u16(),
                        attempt = retry + 1,
                        max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Source request failed, retrying"
                    );
                    delay
                },
                Ok(response) => return Ok(response),
                Err(e) if (e.is_connect() || e.is_timeout()) && retry < max_retries => {
                    let delay = backoff_delay(self.config.backoff_factor, retry + 1);
                    warn!(
                        error = %e,
                        attempt = retry + 1,
                        max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Source request failed, retrying"
                    );
                    delay
                },
                Err(e) => return Err(e.into()),
            };

            retry += 1;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Fetch and decode one page. Anything but a 200 is a [`EtlError::FetchFailed`].
    pub async fn get_page(&self, uri: &str) -> Result<Page> {
        debug!(uri = %uri, "Requesting page");
        let response = self.get(uri).await?;
        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            error!(status = status.as_u16(), body = %body, "Source API request failed");
            return Err(EtlError::FetchFailed {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| EtlError::InvalidPage {
            uri: uri.to_string(),
            reason: e.to_string(),
        })
    }
}
