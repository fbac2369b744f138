//! Reverse import of provider-side ingress rules
//!
//! Bindings created at the provider outside this process become local
//! records on startup, so they show up and survive the next full
//! ingress publish.

use tracing::{error, info};
use url::Url;

use crate::errors::Error;
use crate::models::ingress::ExposedUrl;

use super::manager::IngressManager;
use super::TUNNEL_NAME;

impl IngressManager {
    /// Import untracked ingress rules from the provider.
    ///
    /// Skipped: the catch-all, hostnames already tracked, hostnames
    /// with fewer than three labels, and rules no service can be
    /// matched to. Returns the number of bindings imported.
    pub async fn import_bindings(&self) -> Result<usize, Error> {
        if !self.provider.configured().await {
            info!("provider not configured, skipping tunnel sync");
            return Ok(0);
        }
        let provider = self.provider.connect().await?;

        let Some(tunnel) = provider.find_tunnel(TUNNEL_NAME).await? else {
            info!("no tunnel found, skipping binding sync");
            return Ok(0);
        };
        let rules = provider.read_ingress(&tunnel.id).await?;

        let tracked: std::collections::HashSet<String> = self
            .store
            .list_exposed_urls()
            .await
            .into_iter()
            .map(|u| u.full_url)
            .collect();
        let services = self.store.list_services().await;

        let mut imported = 0usize;
        for rule in rules {
            let Some(hostname) = &rule.hostname else {
                // The catch-all carries no hostname.
                continue;
            };
            if tracked.contains(hostname) {
                continue;
            }

            let labels: Vec<&str> = hostname.split('.').collect();
            if labels.len() < 3 {
                info!("skipping {} - not enough domain parts", hostname);
                continue;
            }
            let subdomain = labels[0];
            let domain_suffix = labels[1..].join(".");

            let target = Url::parse(&rule.service).ok();
            let port = target
                .as_ref()
                .and_then(|u| u.port())
                .unwrap_or_else(|| match target.as_ref().map(Url::scheme) {
                    Some("https") => 443,
                    _ => 80,
                });

            // Reverse the container naming convention back to a service.
            let service_id = target
                .as_ref()
                .and_then(|u| u.host_str())
                .and_then(|host| {
                    services
                        .iter()
                        .find(|s| s.container_name() == host)
                        .map(|s| s.id.clone())
                });
            let service_id = match service_id {
                Some(id) => Some(id),
                None => self.store.latest_running_service().await.map(|s| s.id),
            };
            let Some(service_id) = service_id else {
                info!("skipping {} - no service to bind to", hostname);
                continue;
            };

            // DNS stays externally managed for imported bindings.
            let mut exposed = ExposedUrl::new(subdomain, domain_suffix, port, service_id);
            exposed.tunnel_id = Some(tunnel.id.clone());
            match self.store.insert_exposed_url(exposed).await {
                Ok(_) => {
                    info!("imported tunnel binding: {}", hostname);
                    imported += 1;
                }
                Err(e) => error!("failed to import {}: {}", hostname, e),
            }
        }

        if imported > 0 {
            info!("imported {} tunnel binding(s)", imported);
        } else {
            info!("all tunnel bindings already tracked");
        }
        Ok(imported)
    }
}
