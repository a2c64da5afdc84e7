//! Configuration management
//!
//! Every setting is read from the environment (a local `.env` is honoured) into an
//! [`EtlConfig`] that is passed explicitly to the components that need it.

use crate::error::{EtlError, Result};
use chatsync_common::env;
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

/// Per-request timeout for the source API.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Retries on top of the first attempt for retryable source responses.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Backoff factor; retry `n` (from the second on) waits `factor * 2^(n-1)`.
pub const DEFAULT_BACKOFF_FACTOR_MS: u64 = 2_000;

/// Pause between page requests, and once after the last page.
pub const DEFAULT_PAGE_DELAY_MS: u64 = 1_000;

pub const DEFAULT_BIGQUERY_BASE_URL: &str = "https://bigquery.googleapis.com";

/// Interval between load-job status checks.
pub const DEFAULT_JOB_POLL_INTERVAL_MS: u64 = 1_000;

/// Upper bound on how long a load job may take.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 600;

pub const DEFAULT_DLP_BASE_URL: &str = "https://dlp.googleapis.com";

pub const DEFAULT_DLP_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_VAULT_MOUNT: &str = "datascience";

/// A string that never appears in `Debug` output
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Complete ETL configuration
#[derive(Debug, Clone)]
pub struct EtlConfig {
    pub source: SourceConfig,
    pub warehouse: WarehouseConfig,
    pub redaction: RedactionConfig,
    pub vault: VaultConfig,

    /// Pre-issued cloud access token; when set, Vault is not consulted
    pub access_token: Option<Secret>,
}

/// Chat platform data API
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub endpoint_url: String,
    pub api_key: Secret,
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_factor: Duration,
    pub page_delay: Duration,
}

/// Destination warehouse
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub project: String,
    pub dataset: String,
    pub location: Option<String>,
    pub base_url: String,
    pub poll_interval: Duration,
    pub job_timeout: Duration,
}

/// Deidentification service
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub base_url: String,
    pub project: String,
    pub timeout_secs: u64,
}

/// Secret store holding the warehouse service-account key
#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub addr: Option<String>,
    pub token: Option<Secret>,
    pub mount: String,
    pub secret_key: Option<String>,
}

impl SourceConfig {
    /// Source settings with production defaults for everything but the endpoint.
    pub fn new(endpoint_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            api_key: Secret::new(api_key),
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_factor: Duration::from_millis(DEFAULT_BACKOFF_FACTOR_MS),
            page_delay: Duration::from_millis(DEFAULT_PAGE_DELAY_MS),
        }
    }

    fn from_env() -> Result<Self> {
        Ok(Self {
            endpoint_url: env::var_required("CHATSYNC_ENDPOINT_URL")?,
            api_key: Secret::new(env::var_required("CHATSYNC_API_KEY")?),
            timeout: Duration::from_secs(env::parse_or(
                "CHATSYNC_HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
            max_retries: env::parse_or("CHATSYNC_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            backoff_factor: Duration::from_millis(env::parse_or(
                "CHATSYNC_BACKOFF_FACTOR_MS",
                DEFAULT_BACKOFF_FACTOR_MS,
            )?),
            page_delay: Duration::from_millis(env::parse_or(
                "CHATSYNC_PAGE_DELAY_MS",
                DEFAULT_PAGE_DELAY_MS,
            )?),
        })
    }
}

impl WarehouseConfig {
    pub fn new(project: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            location: None,
            base_url: DEFAULT_BIGQUERY_BASE_URL.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_JOB_POLL_INTERVAL_MS),
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
        }
    }

    fn from_env() -> Result<Self> {
        Ok(Self {
            project: env::var_required("CHATSYNC_BQ_PROJECT")?,
            dataset: env::var_required("CHATSYNC_BQ_DATASET")?,
            location: env::var_opt("CHATSYNC_BQ_LOCATION"),
            base_url: env::var_or("CHATSYNC_BQ_BASE_URL", DEFAULT_BIGQUERY_BASE_URL),
            poll_interval: Duration::from_millis(env::parse_or(
                "CHATSYNC_BQ_POLL_INTERVAL_MS",
                DEFAULT_JOB_POLL_INTERVAL_MS,
            )?),
            job_timeout: Duration::from_secs(env::parse_or(
                "CHATSYNC_BQ_JOB_TIMEOUT_SECS",
                DEFAULT_JOB_TIMEOUT_SECS,
            )?),
        })
    }
}

impl RedactionConfig {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_DLP_BASE_URL.to_string(),
            project: project.into(),
            timeout_secs: DEFAULT_DLP_TIMEOUT_SECS,
        }
    }

    /// DLP requests are billed to the warehouse project unless overridden.
    fn from_env(warehouse_project: &str) -> Result<Self> {
        Ok(Self {
            base_url: env::var_or("CHATSYNC_DLP_BASE_URL", DEFAULT_DLP_BASE_URL),
            project: env::var_or("CHATSYNC_DLP_PROJECT", warehouse_project),
            timeout_secs: env::parse_or("CHATSYNC_DLP_TIMEOUT_SECS", DEFAULT_DLP_TIMEOUT_SECS)?,
        })
    }
}

impl VaultConfig {
    fn from_env() -> Self {
        Self {
            addr: env::var_opt("VAULT_ADDR"),
            token: env::var_opt("VAULT_TOKEN").map(Secret::new),
            mount: env::var_or("CHATSYNC_VAULT_MOUNT", DEFAULT_VAULT_MOUNT),
            secret_key: env::var_opt("CHATSYNC_VAULT_SECRET_KEY"),
        }
    }
}

impl EtlConfig {
    /// Load configuration from `.env` and the process environment
    pub fn from_env() -> Result<Self> {
        env::load_dotenv();

        let warehouse = WarehouseConfig::from_env()?;
        let redaction = RedactionConfig::from_env(&warehouse.project)?;
        let config = Self {
            source: SourceConfig::from_env()?,
            redaction,
            warehouse,
            vault: VaultConfig::from_env(),
            access_token: env::var_opt("CHATSYNC_GCP_ACCESS_TOKEN").map(Secret::new),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let source = &self.source;
        if !source.endpoint_url.starts_with("http://") && !source.endpoint_url.starts_with("https://")
        {
            return Err(EtlError::config(format!(
                "Endpoint URL must be http(s), got '{}'",
                source.endpoint_url
            )));
        }
        if source.api_key.expose().is_empty() {
            return Err(EtlError::config("API key cannot be empty"));
        }
        if source.timeout.is_zero() {
            return Err(EtlError::config("HTTP timeout must be greater than 0"));
        }

        if self.warehouse.project.is_empty() || self.warehouse.dataset.is_empty() {
            return Err(EtlError::config("Warehouse project and dataset are required"));
        }
        if self.warehouse.job_timeout.is_zero() {
            return Err(EtlError::config("Load job timeout must be greater than 0"));
        }

        if self.redaction.project.is_empty() {
            return Err(EtlError::config("Redaction project cannot be empty"));
        }

        if self.access_token.is_none() {
            let vault = &self.vault;
            if vault.addr.is_none() || vault.token.is_none() || vault.secret_key.is_none() {
                return Err(EtlError::config(
                    "Set CHATSYNC_GCP_ACCESS_TOKEN, or VAULT_ADDR, VAULT_TOKEN and CHATSYNC_VAULT_SECRET_KEY",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn config() -> EtlConfig {
        EtlConfig {
            source: SourceConfig::new("https://chat.example.com", "key"),
            warehouse: WarehouseConfig::new("analytics-prod", "chatbot"),
            redaction: RedactionConfig::new("analytics-prod"),
            vault: VaultConfig {
                addr: None,
                token: None,
                mount: DEFAULT_VAULT_MOUNT.to_string(),
                secret_key: None,
            },
            access_token: Some(Secret::new("ya29.token")),
        }
    }

    #[test]
    fn test_defaults() {
        let source = SourceConfig::new("https://chat.example.com", "key");
        assert_eq!(source.timeout, Duration::from_secs(60));
        assert_eq!(source.max_retries, 5);
        assert_eq!(source.page_delay, Duration::from_secs(1));
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let mut config = config();
        config.source.endpoint_url = "chat.example.com".to_string();
        assert!(matches!(config.validate(), Err(EtlError::Config(_))));
    }

    #[test]
    fn test_validate_requires_credentials() {
        let mut config = config();
        config.access_token = None;
        assert!(config.validate().is_err());

        config.vault.addr = Some("https://vault.example.com".to_string());
        config.vault.token = Some(Secret::new("s.token"));
        config.vault.secret_key = Some("chatsync-loader".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_secret_debug_is_masked() {
        let rendered = format!("{:?}", config().source);
        assert!(!rendered.contains("key\""));
        assert!(rendered.contains("Secret(***)"));
    }
}
