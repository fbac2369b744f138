//! Hostname binding operations
//!
//! `expose`, `unexpose` and custom domains. The tunnel ingress config
//! is never diffed: every change rebuilds the complete rule set from
//! the store and replaces the remote config wholesale, with the 404
//! catch-all closing the list.

use std::sync::Arc;

use tracing::{info, warn};

use crate::errors::Error;
use crate::models::ingress::{ExposedUrl, IngressRule};
use crate::storage::settings::SettingsStore;
use crate::storage::store::Store;

use super::provider::{DnsRecordSpec, ProviderSource, TunnelProvider};
use super::{tunnel_cname_target, TUNNEL_NAME};

/// Custom domain binding request
#[derive(Debug, Clone)]
pub struct CustomDomainRequest {
    pub hostname: String,
    pub protocol: String,
    pub target_ip: String,
    pub port: u16,
    pub service_id: Option<String>,
}

/// Ingress layer entry point shared by handlers and workers
pub struct IngressManager {
    pub(crate) store: Arc<Store>,
    pub(crate) settings: Arc<SettingsStore>,
    pub(crate) provider: Arc<dyn ProviderSource>,
}

impl IngressManager {
    pub fn new(
        store: Arc<Store>,
        settings: Arc<SettingsStore>,
        provider: Arc<dyn ProviderSource>,
    ) -> Self {
        Self {
            store,
            settings,
            provider,
        }
    }

    /// Rebuild the full ingress rule set and replace the remote config.
    ///
    /// A missing tunnel is a no-op; the bindings stay local-only until
    /// one exists.
    pub async fn publish_ingress(&self) -> Result<(), Error> {
        let provider = self.provider.connect().await?;
        let Some(tunnel) = provider.find_tunnel(TUNNEL_NAME).await? else {
            return Ok(());
        };

        let mut rules = Vec::new();
        for url in self.store.list_exposed_urls().await {
            let Ok(service) = self.store.get_service(&url.service_id).await else {
                warn!(hostname = %url.full_url, "binding references a missing service, skipping");
                continue;
            };
            rules.push(IngressRule::route(
                url.full_url.clone(),
                format!("http://{}:{}", service.container_name(), url.internal_port),
            ));
        }
        rules.push(IngressRule::catch_all());

        provider.replace_ingress(&tunnel.id, &rules).await
    }

    async fn publish_best_effort(&self) {
        if let Err(e) = self.publish_ingress().await {
            warn!("failed to update tunnel config: {}", e);
        }
    }

    /// Create or repoint a CNAME for `{subdomain}.{suffix}` at the
    /// tunnel. DNS failures are non-fatal and leave the record id null.
    async fn provision_dns(
        &self,
        provider: &Arc<dyn TunnelProvider>,
        tunnel_id: &str,
        subdomain: &str,
        domain_suffix: &str,
    ) -> Option<String> {
        let full_name = format!("{}.{}", subdomain, domain_suffix);
        let target = tunnel_cname_target(tunnel_id);

        let result: Result<Option<String>, Error> = async {
            let Some(zone) = provider.find_zone(domain_suffix).await? else {
                return Ok(None);
            };
            let existing = provider.list_dns_records(&zone.id, &full_name).await?;
            let spec = DnsRecordSpec {
                name: subdomain.to_string(),
                content: target.clone(),
                comment: "dockhand managed".to_string(),
            };
            if let Some(record) = existing.first() {
                if record.content != target {
                    info!("updating existing DNS record for {}", full_name);
                    provider.update_dns_record(&zone.id, &record.id, &spec).await?;
                }
                return Ok(Some(record.id.clone()));
            }
            info!("creating new DNS record for {}", full_name);
            let record = provider.create_dns_record(&zone.id, &spec).await?;
            Ok(Some(record.id))
        }
        .await;

        match result {
            Ok(id) => id,
            Err(e) => {
                warn!("DNS record operation failed for {}: {}", full_name, e);
                None
            }
        }
    }

    /// Bind `{subdomain}.{domain_suffix}` to one service port
    pub async fn expose(
        &self,
        service_id: &str,
        subdomain: &str,
        domain_suffix: &str,
        internal_port: u16,
    ) -> Result<ExposedUrl, Error> {
        let full_url = format!("{}.{}", subdomain, domain_suffix);

        // Reject duplicates before touching the provider.
        if self.store.find_exposed_url_by_hostname(&full_url).await.is_some() {
            return Err(Error::ValidationError(format!(
                "hostname {} is already in use",
                full_url
            )));
        }
        self.store.get_service(service_id).await?;

        let provider = self.provider.connect().await?;
        let tunnel = provider.find_tunnel(TUNNEL_NAME).await?;

        let mut exposed = ExposedUrl::new(subdomain, domain_suffix, internal_port, service_id);
        if let Some(tunnel) = &tunnel {
            exposed.tunnel_id = Some(tunnel.id.clone());
            exposed.dns_record_id = self
                .provision_dns(&provider, &tunnel.id, subdomain, domain_suffix)
                .await;
        }

        let exposed = self.store.insert_exposed_url(exposed).await?;
        self.publish_best_effort().await;
        Ok(exposed)
    }

    /// Remove a binding.
    ///
    /// The local record goes away no matter what the provider says;
    /// an already-deleted DNS record is not an error.
    pub async fn unexpose(&self, exposed_url_id: &str) -> Result<(), Error> {
        let exposed = self.store.get_exposed_url(exposed_url_id).await?;

        if let Some(record_id) = &exposed.dns_record_id {
            let cleanup: Result<(), Error> = async {
                let provider = self.provider.connect().await?;
                if let Some(zone) = provider.find_zone(&exposed.domain_suffix).await? {
                    match provider.delete_dns_record(&zone.id, record_id).await {
                        Ok(()) | Err(Error::NotFound(_)) => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            }
            .await;
            if let Err(e) = cleanup {
                warn!("failed to clean up DNS for {}: {}", exposed.full_url, e);
            }
        }

        self.store.delete_exposed_url(exposed_url_id).await?;
        self.publish_best_effort().await;
        Ok(())
    }

    /// Bind an arbitrary hostname, falling back to the most recently
    /// updated running service when none is named.
    pub async fn add_custom_domain(
        &self,
        request: CustomDomainRequest,
    ) -> Result<ExposedUrl, Error> {
        if request.hostname.is_empty() || request.target_ip.is_empty() || request.port == 0 {
            return Err(Error::ValidationError("all fields required".into()));
        }

        let (subdomain, domain_suffix) = request
            .hostname
            .split_once('.')
            .ok_or_else(|| {
                Error::ValidationError(
                    "invalid hostname format (need subdomain.domain.tld)".into(),
                )
            })?;
        if domain_suffix.is_empty() {
            return Err(Error::ValidationError(
                "invalid hostname format (need subdomain.domain.tld)".into(),
            ));
        }

        let service_id = match &request.service_id {
            Some(id) => {
                self.store.get_service(id).await?;
                id.clone()
            }
            None => self
                .store
                .latest_running_service()
                .await
                .map(|s| s.id)
                .ok_or_else(|| Error::ValidationError("no service available to bind".into()))?,
        };

        if self
            .store
            .find_exposed_url_by_hostname(&request.hostname)
            .await
            .is_some()
        {
            return Err(Error::ValidationError(format!(
                "hostname {} is already in use",
                request.hostname
            )));
        }

        let provider = self.provider.connect().await?;
        let tunnel = provider.find_tunnel(TUNNEL_NAME).await?;

        let mut exposed = ExposedUrl::new(subdomain, domain_suffix, request.port, service_id);
        if let Some(tunnel) = &tunnel {
            exposed.tunnel_id = Some(tunnel.id.clone());
            exposed.dns_record_id = self
                .provision_dns(&provider, &tunnel.id, subdomain, domain_suffix)
                .await;
        }

        let exposed = self.store.insert_exposed_url(exposed).await?;
        self.publish_best_effort().await;
        Ok(exposed)
    }
}
