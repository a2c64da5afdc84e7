//! Cursor pagination over the data API

use super::client::SourceClient;
use crate::config::SourceConfig;
use crate::error::Result;
use crate::models::{RawRecord, RecordType};
use crate::window::TimeWindow;
use std::time::Duration;
use tracing::{info, instrument};

/// Walks `next_page_uri` links until the API runs out of pages
pub struct PaginatedFetcher {
    client: SourceClient,
    page_delay: Duration,
}

impl PaginatedFetcher {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let page_delay = config.page_delay;
        Ok(Self {
            client: SourceClient::new(config)?,
            page_delay,
        })
    }

    /// First page of `record_type` created inside `window`.
    pub fn initial_uri(&self, window: &TimeWindow, record_type: RecordType) -> String {
        format!(
            "{}/data_api/v1/{}?{}",
            self.client.base_url(),
            record_type.collection(),
            window.query_string()
        )
    }

    /// Absolute URI for a `next_page_uri`; relative links hang off the base URL.
    pub fn resolve(&self, next: &str) -> String {
        if next.starts_with("http://") || next.starts_with("https://") {
            next.to_string()
        } else {
            format!("{}/{}", self.client.base_url(), next.trim_start_matches('/'))
        }
    }

    /// Every record in the window, in the order the API serves them.
    #[instrument(skip(self), fields(record_type = %record_type, window = %window))]
    pub async fn fetch(&self, window: &TimeWindow, record_type: RecordType) -> Result<Vec<RawRecord>> {
        let mut records = Vec::new();
        let mut uri = self.initial_uri(window, record_type);
        let mut pages = 0usize;

        loop {
            let page = self.client.get_page(&uri).await?;
            pages += 1;
            info!(page = pages, records = page.data.len(), "Fetched page");

            let next = page.next_uri().map(|next| self.resolve(next));
            records.extend(page.data);
            self.pause().await;

            match next {
                Some(next) => uri = next,
                None => break,
            }
        }

        info!(pages, records = records.len(), "Fetch complete");
        Ok(records)
    }

    async fn pause(&self) {
        if !self.page_delay.is_zero() {
            tokio::time::sleep(self.page_delay).await;
        }
    }
}
