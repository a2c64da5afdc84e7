//! Chatsync ETL Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Daily extract of chat-platform conversations and messages into a date-partitioned
//! analytics warehouse.
//!
//! # Stages
//!
//! - **Fetch**: [`source::PaginatedFetcher`] walks the data API for one day's window
//! - **Normalize**: [`normalize::normalize`] flattens each record, redacting customer text
//!   through [`redaction::Redactor`]
//! - **Load**: [`warehouse::PartitionSink`] replaces the day's partition in one operation
//!
//! # Example
//!
//! ```no_run
//! use chatsync_etl::{EtlConfig, EtlPipeline, RunRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EtlConfig::from_env()?;
//!     let pipeline = EtlPipeline::from_config(&config).await?;
//!     pipeline
//!         .handle(&RunRequest::new("2024-05-02T00:00:00+00:00", "message"))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod redaction;
pub mod source;
pub mod warehouse;
pub mod window;

pub use config::EtlConfig;
pub use error::{EtlError, Result};
pub use models::{NormalizedRecord, Page, RawRecord, RecordType};
pub use pipeline::{EtlPipeline, RunRequest, RunSummary};
pub use window::TimeWindow;
