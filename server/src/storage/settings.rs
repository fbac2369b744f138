//! System settings store
//!
//! Process-wide key/value configuration. Values are re-read from disk
//! at point of use so edits take effect without a restart; nothing is
//! cached beyond a single operation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use secrecy::SecretString;

use crate::errors::Error;

/// Cloudflare API token
pub const CF_API_TOKEN: &str = "CF_API_TOKEN";
/// Cloudflare account id
pub const CF_ACCOUNT_ID: &str = "CF_ACCOUNT_ID";
/// Default base domain for generated hostnames
pub const CF_BASE_DOMAIN: &str = "CF_BASE_DOMAIN";
/// Token injected into github.com clone urls
pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
/// Whether the periodic domain validation runs
pub const DOMAIN_VALIDATION_ENABLED: &str = "DOMAIN_VALIDATION_ENABLED";
/// Validation interval in hours
pub const DOMAIN_VALIDATION_INTERVAL: &str = "DOMAIN_VALIDATION_INTERVAL";
/// RFC3339 timestamp of the last validation run
pub const DOMAIN_VALIDATION_LAST_RUN: &str = "DOMAIN_VALIDATION_LAST_RUN";

/// Provider credentials, resolved at call time
#[derive(Clone)]
pub struct ProviderCredentials {
    pub api_token: SecretString,
    pub account_id: String,
}

/// Settings store handle
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>, Error> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::StorageError(format!("corrupt settings file: {}", e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read a single setting
    pub async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.read_all().await?.get(key).cloned())
    }

    /// Upsert a single setting
    pub async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut all = self.read_all().await?;
        all.insert(key.to_string(), value.to_string());
        let bytes = serde_json::to_vec_pretty(&all)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), Error> {
        let mut all = self.read_all().await?;
        if all.remove(key).is_some() {
            let bytes = serde_json::to_vec_pretty(&all)?;
            tokio::fs::write(&self.path, bytes).await?;
        }
        Ok(())
    }

    /// Provider credentials, or an error when unconfigured
    pub async fn provider_credentials(&self) -> Result<ProviderCredentials, Error> {
        let all = self.read_all().await?;
        let api_token = all
            .get(CF_API_TOKEN)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::ConfigError("Cloudflare credentials not configured".into()))?;
        let account_id = all
            .get(CF_ACCOUNT_ID)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::ConfigError("Cloudflare credentials not configured".into()))?;
        Ok(ProviderCredentials {
            api_token: SecretString::from(api_token.clone()),
            account_id: account_id.clone(),
        })
    }

    /// Whether provider credentials are present at all
    pub async fn provider_configured(&self) -> bool {
        self.provider_credentials().await.is_ok()
    }

    pub async fn base_domain(&self) -> Result<Option<String>, Error> {
        Ok(self
            .get(CF_BASE_DOMAIN)
            .await?
            .filter(|v| !v.is_empty()))
    }

    pub async fn github_token(&self) -> Result<Option<String>, Error> {
        Ok(self.get(GITHUB_TOKEN).await?.filter(|v| !v.is_empty()))
    }

    /// Validation schedule: (enabled, interval in hours)
    pub async fn validation_schedule(&self) -> Result<(bool, u64), Error> {
        let all = self.read_all().await?;
        let enabled = all
            .get(DOMAIN_VALIDATION_ENABLED)
            .map(|v| v == "true")
            .unwrap_or(false);
        let interval_hours = all
            .get(DOMAIN_VALIDATION_INTERVAL)
            .and_then(|v| v.parse().ok())
            .unwrap_or(24);
        Ok((enabled, interval_hours))
    }

    pub async fn record_validation_run(&self) -> Result<(), Error> {
        self.set(DOMAIN_VALIDATION_LAST_RUN, &chrono::Utc::now().to_rfc3339())
            .await
    }
}
