//! Tunnel provider seam
//!
//! Everything the ingress layer needs from the edge provider, behind a
//! trait so reconciliation logic can be exercised against an in-memory
//! implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::models::ingress::IngressRule;

/// A named tunnel at the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tunnel {
    pub id: String,
    pub name: String,
}

/// A DNS zone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
}

/// An existing DNS record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    pub name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub record_type: String,
}

/// Fields for creating or updating a CNAME record
#[derive(Debug, Clone)]
pub struct DnsRecordSpec {
    /// Record name relative to the zone (the subdomain)
    pub name: String,
    pub content: String,
    pub comment: String,
}

/// Provider operations used by the ingress layer.
///
/// `get_dns_record` and `find_*` return `Ok(None)` when the provider
/// answers but the object is gone; `Err` is reserved for failures
/// where the answer is unknown.
#[async_trait]
pub trait TunnelProvider: Send + Sync {
    async fn find_tunnel(&self, name: &str) -> Result<Option<Tunnel>, Error>;
    async fn create_tunnel(&self, name: &str, secret_base64: &str) -> Result<Tunnel, Error>;
    async fn tunnel_token(&self, tunnel_id: &str) -> Result<String, Error>;

    async fn read_ingress(&self, tunnel_id: &str) -> Result<Vec<IngressRule>, Error>;
    async fn replace_ingress(
        &self,
        tunnel_id: &str,
        rules: &[IngressRule],
    ) -> Result<(), Error>;

    async fn find_zone(&self, name: &str) -> Result<Option<Zone>, Error>;
    async fn list_dns_records(
        &self,
        zone_id: &str,
        full_name: &str,
    ) -> Result<Vec<DnsRecord>, Error>;
    async fn create_dns_record(
        &self,
        zone_id: &str,
        spec: &DnsRecordSpec,
    ) -> Result<DnsRecord, Error>;
    async fn update_dns_record(
        &self,
        zone_id: &str,
        record_id: &str,
        spec: &DnsRecordSpec,
    ) -> Result<DnsRecord, Error>;
    async fn delete_dns_record(&self, zone_id: &str, record_id: &str) -> Result<(), Error>;
    async fn get_dns_record(
        &self,
        zone_id: &str,
        record_id: &str,
    ) -> Result<Option<DnsRecord>, Error>;
}

/// Builds a provider connection from current settings.
///
/// Credentials are read at call time, so a connection is constructed
/// per operation rather than held.
#[async_trait]
pub trait ProviderSource: Send + Sync {
    async fn connect(&self) -> Result<std::sync::Arc<dyn TunnelProvider>, Error>;

    /// Whether credentials are present at all, without connecting
    async fn configured(&self) -> bool;
}
