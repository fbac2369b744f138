//! Public routing binding models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A public hostname bound to one service's internal port
///
/// `full_url` is globally unique. `dns_record_id` is null for bindings
/// imported from the provider or created without a reachable zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposedUrl {
    pub id: String,
    pub subdomain: String,
    pub domain_suffix: String,
    /// `{subdomain}.{domain_suffix}`
    pub full_url: String,
    pub internal_port: u16,
    pub service_id: String,
    #[serde(default)]
    pub tunnel_id: Option<String>,
    #[serde(default)]
    pub dns_record_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExposedUrl {
    pub fn new(
        subdomain: impl Into<String>,
        domain_suffix: impl Into<String>,
        internal_port: u16,
        service_id: impl Into<String>,
    ) -> Self {
        let subdomain = subdomain.into();
        let domain_suffix = domain_suffix.into();
        Self {
            id: crate::utils::generate_uuid(),
            full_url: format!("{}.{}", subdomain, domain_suffix),
            subdomain,
            domain_suffix,
            internal_port,
            service_id: service_id.into(),
            tunnel_id: None,
            dns_record_id: None,
            created_at: Utc::now(),
        }
    }
}

/// One provider-side ingress rule, published as part of the full set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub service: String,
}

impl IngressRule {
    pub fn route(hostname: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            hostname: Some(hostname.into()),
            service: service.into(),
        }
    }

    /// The fixed fallback rule closing every ingress set
    pub fn catch_all() -> Self {
        Self {
            hostname: None,
            service: "http_status:404".to_string(),
        }
    }
}
