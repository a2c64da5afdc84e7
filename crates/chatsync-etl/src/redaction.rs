//! Redaction of free-text fields
//!
//! Customer-typed text is passed through the DLP `content:deidentify` API, which swaps
//! detected names, contact details and card numbers for info-type placeholders such as
//! `[EMAIL_ADDRESS]`. The service is opaque to us: one request per text value, no retry.
//! A failure aborts the batch being normalized.

use crate::config::RedactionConfig;
use crate::credentials::SharedTokenSource;
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Categories the classifier is asked to detect
pub const INFO_TYPES: [&str; 7] = [
    "CREDIT_CARD_NUMBER",
    "EMAIL_ADDRESS",
    "FIRST_NAME",
    "LAST_NAME",
    "PERSON_NAME",
    "PHONE_NUMBER",
    "STREET_ADDRESS",
];

/// Lowest confidence at which a finding is replaced
pub const MIN_LIKELIHOOD: &str = "UNLIKELY";

/// The external deidentification call
#[async_trait]
pub trait RedactionService: Send + Sync {
    async fn deidentify(&self, text: &str) -> Result<String>;
}

/// Applies a [`RedactionService`] to optional text.
///
/// Null and empty values are returned unchanged and never reach the service.
#[derive(Clone)]
pub struct Redactor {
    service: Arc<dyn RedactionService>,
}

impl Redactor {
    pub fn new<S: RedactionService + 'static>(service: S) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    pub fn from_shared(service: Arc<dyn RedactionService>) -> Self {
        Self { service }
    }

    pub async fn redact(&self, text: Option<&str>) -> Result<Option<String>> {
        match text {
            None => Ok(None),
            Some("") => Ok(Some(String::new())),
            Some(text) => self.service.deidentify(text).await.map(Some),
        }
    }
}

/// HTTP client for the DLP deidentify endpoint
pub struct DlpClient {
    client: Client,
    endpoint: String,
    parent: String,
    tokens: SharedTokenSource,
}

impl DlpClient {
    pub fn new(config: &RedactionConfig, tokens: SharedTokenSource) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let parent = format!("projects/{}", config.project);
        let endpoint = format!(
            "{}/v2/{}/content:deidentify",
            config.base_url.trim_end_matches('/'),
            parent
        );

        Ok(Self {
            client,
            endpoint,
            parent,
            tokens,
        })
    }

    fn request_body(&self, text: &str) -> Value {
        let info_types: Vec<Value> = INFO_TYPES.iter().map(|name| json!({ "name": name })).collect();

        json!({
            "parent": self.parent,
            "inspectConfig": {
                "infoTypes": info_types,
                "minLikelihood": MIN_LIKELIHOOD,
            },
            "deidentifyConfig": {
                "infoTypeTransformations": {
                    "transformations": [
                        { "primitiveTransformation": { "replaceWithInfoTypeConfig": {} } }
                    ]
                }
            },
            "item": { "value": text },
        })
    }
}

#[derive(Debug, Deserialize)]
struct DeidentifyResponse {
    item: ContentItem,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    #[serde(default)]
    value: String,
}

#[async_trait]
impl RedactionService for DlpClient {
    async fn deidentify(&self, text: &str) -> Result<String> {
        debug!(chars = text.len(), "Requesting deidentification");
        let token = self.tokens.access_token().await?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token.secret())
            .json(&self.request_body(text))
            .send()
            .await
            .map_err(|e| EtlError::redaction(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EtlError::redaction(format!("{} returned {}: {}", self.endpoint, status, body)));
        }

        let parsed: DeidentifyResponse = response
            .json()
            .await
            .map_err(|e| EtlError::redaction(format!("unexpected response body: {}", e)))?;

        Ok(parsed.item.value)
    }
}
