//! Cloud credentials for the warehouse and redaction clients
//!
//! The service-account key lives in Vault's KV store. It is read into memory and handed
//! to a yup-oauth2 authenticator, which caches the short-lived OAuth token and renews it
//! before it expires. The key is never written to disk. Clients ask their
//! [`TokenSource`] for a token on every request, so a long run never sends a stale one.

use crate::config::{EtlConfig, Secret, VaultConfig};
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use yup_oauth2::authenticator::DefaultAuthenticator;
use yup_oauth2::ServiceAccountAuthenticator;

/// Scope covering both the load-job and deidentify APIs
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const VAULT_TIMEOUT_SECS: u64 = 30;

/// OAuth bearer token for Google APIs
#[derive(Clone)]
pub struct AccessToken(Secret);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Secret::new(token))
    }

    pub fn secret(&self) -> &str {
        self.0.expose()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Bearer tokens for Google APIs, asked for once per request
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<AccessToken>;
}

/// Token source shared by every client in a run
pub type SharedTokenSource = Arc<dyn TokenSource>;

/// A pre-issued token is used as-is; whoever issued it owns its lifetime.
#[async_trait]
impl TokenSource for AccessToken {
    async fn access_token(&self) -> Result<AccessToken> {
        Ok(self.clone())
    }
}

/// Service-account credentials with a cached, self-renewing token
pub struct ServiceAccountTokens {
    auth: DefaultAuthenticator,
}

impl ServiceAccountTokens {
    /// Build the authenticator from a key document. The key is consumed.
    pub async fn from_key(key: Value) -> Result<Self> {
        let key = yup_oauth2::parse_service_account_key(serde_json::to_vec(&key)?)
            .map_err(|e| EtlError::credentials(format!("Invalid service-account key: {}", e)))?;

        let auth = ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(|e| EtlError::credentials(e.to_string()))?;

        Ok(Self { auth })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokens {
    async fn access_token(&self) -> Result<AccessToken> {
        let token = self
            .auth
            .token(&[CLOUD_PLATFORM_SCOPE])
            .await
            .map_err(|e| EtlError::credentials(e.to_string()))?;

        if let Some(expires_at) = token.expiration_time() {
            debug!(expires_at = %expires_at, "Access token ready");
        }

        token
            .token()
            .map(AccessToken::new)
            .ok_or_else(|| EtlError::credentials("OAuth token was empty"))
    }
}

/// Key/value secret lookup
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn read_secret(&self, key: &str) -> Result<Value>;
}

/// Vault KV v2 reader authenticated with a client token
pub struct VaultClient {
    client: Client,
    addr: String,
    mount: String,
    token: Secret,
}

#[derive(Debug, Deserialize)]
struct KvResponse {
    data: KvData,
}

#[derive(Debug, Deserialize)]
struct KvData {
    data: Value,
}

impl VaultClient {
    pub fn new(addr: impl Into<String>, mount: impl Into<String>, token: Secret) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(VAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            addr: addr.into().trim_end_matches('/').to_string(),
            mount: mount.into(),
            token,
        })
    }

    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        let addr = config
            .addr
            .clone()
            .ok_or_else(|| EtlError::credentials("VAULT_ADDR is not set"))?;
        let token = config
            .token
            .clone()
            .ok_or_else(|| EtlError::credentials("VAULT_TOKEN is not set"))?;

        Self::new(addr, config.mount.clone(), token)
    }
}

#[async_trait]
impl SecretStore for VaultClient {
    async fn read_secret(&self, key: &str) -> Result<Value> {
        let url = format!("{}/v1/{}/data/{}", self.addr, self.mount, key);

        let response = self
            .client
            .get(&url)
            .header("X-Vault-Token", self.token.expose())
            .send()
            .await
            .map_err(|e| EtlError::credentials(format!("Vault request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EtlError::credentials(format!(
                "Vault returned {} for secret '{}'",
                status, key
            )));
        }

        let body: KvResponse = response
            .json()
            .await
            .map_err(|e| EtlError::credentials(format!("Unexpected Vault response: {}", e)))?;

        Ok(body.data.data)
    }
}

/// Token source for this run, from the environment override or from Vault.
///
/// With Vault, one token is fetched up front so bad credentials fail the run before any
/// data is pulled.
pub async fn token_source(config: &EtlConfig) -> Result<SharedTokenSource> {
    if let Some(token) = &config.access_token {
        info!("Using access token from environment");
        return Ok(Arc::new(AccessToken(token.clone())));
    }

    let key_name = config
        .vault
        .secret_key
        .as_deref()
        .ok_or_else(|| EtlError::credentials("CHATSYNC_VAULT_SECRET_KEY is not set"))?;
    let vault = VaultClient::from_config(&config.vault)?;

    info!(mount = %config.vault.mount, key = %key_name, "Getting secret from vault");
    let key = vault.read_secret(key_name).await?;

    let tokens = ServiceAccountTokens::from_key(key).await?;
    tokens.access_token().await?;
    info!("Service-account credentials ready");
    Ok(Arc::new(tokens))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_malformed_key_is_rejected_locally() {
        let err = ServiceAccountTokens::from_key(json!({"type": "service_account"}))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EtlError::Credentials(_)));
    }

    #[test]
    fn test_access_token_debug_is_masked() {
        let token = AccessToken::new("ya29.secret");
        assert_eq!(format!("{:?}", token), "AccessToken(***)");
        assert_eq!(token.secret(), "ya29.secret");
    }

    #[tokio::test]
    async fn test_environment_token_skips_vault() {
        let config = EtlConfig {
            source: crate::config::SourceConfig::new("https://chat.example.com", "key"),
            warehouse: crate::config::WarehouseConfig::new("analytics-prod", "chatbot"),
            redaction: crate::config::RedactionConfig::new("analytics-prod"),
            vault: VaultConfig {
                addr: None,
                token: None,
                mount: "datascience".to_string(),
                secret_key: None,
            },
            access_token: Some(Secret::new("ya29.env")),
        };

        let tokens = token_source(&config).await.unwrap();
        assert_eq!(tokens.access_token().await.unwrap().secret(), "ya29.env");
    }

    #[test]
    fn test_vault_client_requires_addr() {
        let config = VaultConfig {
            addr: None,
            token: Some(Secret::new("s.token")),
            mount: "datascience".to_string(),
            secret_key: Some("loader".to_string()),
        };
        assert!(matches!(
            VaultClient::from_config(&config),
            Err(EtlError::Credentials(_))
        ));
    }
}
