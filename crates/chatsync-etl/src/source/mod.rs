//! Chat platform data API
//!
//! [`SourceClient`] owns the HTTP concerns (auth, timeout, retry); [`PaginatedFetcher`]
//! turns a window and record type into the full list of raw records.

pub mod client;
pub mod fetcher;

pub use client::{backoff_delay, SourceClient, RETRYABLE_STATUSES};
pub use fetcher::PaginatedFetcher;
