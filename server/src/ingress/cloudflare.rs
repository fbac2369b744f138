//! Cloudflare REST implementation of the tunnel provider
//!
//! Responses cross the wire as the v4 `{success, result, errors}`
//! envelope; payloads are narrowed from untyped JSON at this boundary
//! and typed structs are handed to the rest of the ingress layer.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::Error;
use crate::models::ingress::IngressRule;
use crate::storage::settings::{ProviderCredentials, SettingsStore};

use super::provider::{
    DnsRecord, DnsRecordSpec, ProviderSource, Tunnel, TunnelProvider, Zone,
};

const API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Cloudflare API client scoped to one account
pub struct CloudflareApi {
    client: Client,
    api_token: SecretString,
    account_id: String,
    base_url: String,
}

impl CloudflareApi {
    pub fn new(credentials: ProviderCredentials) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_token: credentials.api_token,
            account_id: credentials.account_id,
            base_url: API_BASE.to_string(),
        })
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_token.expose_secret())
    }

    /// Issue a request and unwrap the v4 envelope.
    ///
    /// A 404 comes back as `Ok(None)`; any other non-success status or
    /// `success: false` body is a provider error.
    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Option<Value>, Error> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .header(header::AUTHORIZATION, self.auth_header());
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::ProviderError(format!("{}: {}", status, text)));
        }

        let envelope: Value = response.json().await?;
        if envelope.get("success").and_then(Value::as_bool) == Some(false) {
            return Err(Error::ProviderError(format!(
                "API call failed: {}",
                envelope.get("errors").unwrap_or(&Value::Null)
            )));
        }
        Ok(Some(envelope.get("result").cloned().unwrap_or(Value::Null)))
    }

    fn required(result: Option<Value>, what: &str) -> Result<Value, Error> {
        result.ok_or_else(|| Error::ProviderError(format!("{} not found", what)))
    }
}

fn parse_record(value: &Value) -> Result<DnsRecord, Error> {
    serde_json::from_value(value.clone())
        .map_err(|e| Error::ProviderError(format!("unreadable DNS record: {}", e)))
}

fn record_body(spec: &DnsRecordSpec) -> Value {
    json!({
        "type": "CNAME",
        "name": spec.name,
        "content": spec.content,
        "proxied": true,
        "ttl": 1,
        "comment": spec.comment,
    })
}

#[async_trait]
impl TunnelProvider for CloudflareApi {
    async fn find_tunnel(&self, name: &str) -> Result<Option<Tunnel>, Error> {
        let result = self
            .request(
                reqwest::Method::GET,
                &format!(
                    "/accounts/{}/cfd_tunnel?name={}&is_deleted=false",
                    self.account_id, name
                ),
                None,
            )
            .await?;
        let Some(result) = result else { return Ok(None) };
        let first = result.get(0).cloned();
        match first {
            Some(value) => Ok(Some(serde_json::from_value(value).map_err(|e| {
                Error::ProviderError(format!("unreadable tunnel: {}", e))
            })?)),
            None => Ok(None),
        }
    }

    async fn create_tunnel(&self, name: &str, secret_base64: &str) -> Result<Tunnel, Error> {
        let result = self
            .request(
                reqwest::Method::POST,
                &format!("/accounts/{}/cfd_tunnel", self.account_id),
                Some(json!({
                    "name": name,
                    "tunnel_secret": secret_base64,
                    "config_src": "cloudflare",
                })),
            )
            .await?;
        let value = Self::required(result, "created tunnel")?;
        serde_json::from_value(value)
            .map_err(|e| Error::ProviderError(format!("unreadable tunnel: {}", e)))
    }

    async fn tunnel_token(&self, tunnel_id: &str) -> Result<String, Error> {
        let result = self
            .request(
                reqwest::Method::GET,
                &format!("/accounts/{}/cfd_tunnel/{}/token", self.account_id, tunnel_id),
                None,
            )
            .await?;
        Self::required(result, "tunnel token")?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::ProviderError("tunnel token is not a string".into()))
    }

    async fn read_ingress(&self, tunnel_id: &str) -> Result<Vec<IngressRule>, Error> {
        let result = self
            .request(
                reqwest::Method::GET,
                &format!(
                    "/accounts/{}/cfd_tunnel/{}/configurations",
                    self.account_id, tunnel_id
                ),
                None,
            )
            .await?;
        let Some(result) = result else {
            return Ok(Vec::new());
        };
        let rules = result
            .pointer("/config/ingress")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        rules
            .iter()
            .map(|r| {
                serde_json::from_value(r.clone())
                    .map_err(|e| Error::ProviderError(format!("unreadable ingress rule: {}", e)))
            })
            .collect()
    }

    async fn replace_ingress(
        &self,
        tunnel_id: &str,
        rules: &[IngressRule],
    ) -> Result<(), Error> {
        self.request(
            reqwest::Method::PUT,
            &format!(
                "/accounts/{}/cfd_tunnel/{}/configurations",
                self.account_id, tunnel_id
            ),
            Some(json!({ "config": { "ingress": rules } })),
        )
        .await?;
        Ok(())
    }

    async fn find_zone(&self, name: &str) -> Result<Option<Zone>, Error> {
        let result = self
            .request(reqwest::Method::GET, &format!("/zones?name={}", name), None)
            .await?;
        let Some(result) = result else { return Ok(None) };
        match result.get(0).cloned() {
            Some(value) => Ok(Some(serde_json::from_value(value).map_err(|e| {
                Error::ProviderError(format!("unreadable zone: {}", e))
            })?)),
            None => Ok(None),
        }
    }

    async fn list_dns_records(
        &self,
        zone_id: &str,
        full_name: &str,
    ) -> Result<Vec<DnsRecord>, Error> {
        let result = self
            .request(
                reqwest::Method::GET,
                &format!(
                    "/zones/{}/dns_records?name={}&type=CNAME",
                    zone_id, full_name
                ),
                None,
            )
            .await?;
        let Some(result) = result else {
            return Ok(Vec::new());
        };
        result
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(parse_record)
            .collect()
    }

    async fn create_dns_record(
        &self,
        zone_id: &str,
        spec: &DnsRecordSpec,
    ) -> Result<DnsRecord, Error> {
        let result = self
            .request(
                reqwest::Method::POST,
                &format!("/zones/{}/dns_records", zone_id),
                Some(record_body(spec)),
            )
            .await?;
        parse_record(&Self::required(result, "created DNS record")?)
    }

    async fn update_dns_record(
        &self,
        zone_id: &str,
        record_id: &str,
        spec: &DnsRecordSpec,
    ) -> Result<DnsRecord, Error> {
        let result = self
            .request(
                reqwest::Method::PATCH,
                &format!("/zones/{}/dns_records/{}", zone_id, record_id),
                Some(record_body(spec)),
            )
            .await?;
        parse_record(&Self::required(result, "updated DNS record")?)
    }

    async fn delete_dns_record(&self, zone_id: &str, record_id: &str) -> Result<(), Error> {
        let result = self
            .request(
                reqwest::Method::DELETE,
                &format!("/zones/{}/dns_records/{}", zone_id, record_id),
                None,
            )
            .await?;
        if result.is_none() {
            return Err(Error::NotFound(format!("DNS record {}", record_id)));
        }
        Ok(())
    }

    async fn get_dns_record(
        &self,
        zone_id: &str,
        record_id: &str,
    ) -> Result<Option<DnsRecord>, Error> {
        let result = self
            .request(
                reqwest::Method::GET,
                &format!("/zones/{}/dns_records/{}", zone_id, record_id),
                None,
            )
            .await?;
        match result {
            Some(value) => Ok(Some(parse_record(&value)?)),
            None => Ok(None),
        }
    }
}

/// Builds Cloudflare connections from the settings store at call time
pub struct CloudflareSource {
    settings: Arc<SettingsStore>,
}

impl CloudflareSource {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ProviderSource for CloudflareSource {
    async fn connect(&self) -> Result<Arc<dyn TunnelProvider>, Error> {
        let credentials = self.settings.provider_credentials().await?;
        Ok(Arc::new(CloudflareApi::new(credentials)?))
    }

    async fn configured(&self) -> bool {
        self.settings.provider_configured().await
    }
}
