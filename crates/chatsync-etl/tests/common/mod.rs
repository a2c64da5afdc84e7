//! Shared helpers for chatsync-etl integration tests
//!
//! - [`StubRedactor`]: deterministic stand-in for the DLP service that counts calls
//! - [`RotatingTokens`]: token source that issues a new token on every request
//! - Fixture loaders for the golden source responses and their normalized rows
//! - Config builders pointed at a `wiremock` server with delays switched off

#![allow(dead_code)]

use async_trait::async_trait;
use chatsync_etl::config::{SourceConfig, WarehouseConfig};
use chatsync_etl::credentials::{AccessToken, TokenSource};
use chatsync_etl::redaction::{RedactionService, Redactor};
use chatsync_etl::Result;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Replacement text returned by [`StubRedactor`]
pub const REDACTED: &str = "example_text";

pub const API_KEY: &str = "test-api-key";

/// Redaction service double that always answers [`REDACTED`]
#[derive(Clone, Default)]
pub struct StubRedactor {
    calls: Arc<AtomicUsize>,
}

impl StubRedactor {
    pub fn redactor(&self) -> Redactor {
        Redactor::new(self.clone())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RedactionService for StubRedactor {
    async fn deidentify(&self, _text: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(REDACTED.to_string())
    }
}

fn fixture(json: &str) -> Vec<Value> {
    serde_json::from_str(json).expect("Fixture is not a JSON array")
}

pub fn conversations_response() -> Vec<Value> {
    fixture(include_str!("../fixtures/response_conversations.json"))
}

pub fn conversations_normalized() -> Vec<Value> {
    fixture(include_str!("../fixtures/normalized_conversations.json"))
}

pub fn messages_response() -> Vec<Value> {
    fixture(include_str!("../fixtures/response_messages.json"))
}

pub fn messages_normalized() -> Vec<Value> {
    fixture(include_str!("../fixtures/normalized_messages.json"))
}

/// Hands out `tok-1`, `tok-2`, ... so tests can see which request got which token
#[derive(Default)]
pub struct RotatingTokens {
    issued: AtomicUsize,
}

#[async_trait]
impl TokenSource for RotatingTokens {
    async fn access_token(&self) -> Result<AccessToken> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AccessToken::new(format!("tok-{}", n)))
    }
}

/// Source settings for a mock server: no politeness delay, millisecond backoff
pub fn source_config(base_url: &str) -> SourceConfig {
    let mut config = SourceConfig::new(base_url, API_KEY);
    config.page_delay = Duration::ZERO;
    config.backoff_factor = Duration::from_millis(1);
    config.timeout = Duration::from_secs(5);
    config
}

pub fn warehouse_config(base_url: &str) -> WarehouseConfig {
    let mut config = WarehouseConfig::new("analytics-prod", "chatbot");
    config.base_url = base_url.to_string();
    config.poll_interval = Duration::from_millis(10);
    config.job_timeout = Duration::from_secs(5);
    config
}
