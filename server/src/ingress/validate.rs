//! Binding reconciliation against provider state
//!
//! Records whose zone or DNS record vanished upstream are deleted
//! locally. Only a definitive "gone" answer removes anything; a
//! provider failure on one binding is logged and that binding skipped.

use tracing::{error, info};

use crate::errors::Error;

use super::manager::IngressManager;

impl IngressManager {
    /// Check every tracked DNS record and drop the orphans.
    ///
    /// Returns the number of bindings removed.
    pub async fn validate_bindings(&self) -> Result<usize, Error> {
        if !self.provider.configured().await {
            info!("provider not configured, skipping domain validation");
            return Ok(0);
        }
        let provider = self.provider.connect().await?;

        let tracked: Vec<_> = self
            .store
            .list_exposed_urls()
            .await
            .into_iter()
            .filter(|u| u.dns_record_id.is_some())
            .collect();
        if tracked.is_empty() {
            info!("no domain records to validate");
            return Ok(0);
        }
        info!("checking {} DNS records...", tracked.len());

        let mut removed = 0usize;
        for url in tracked {
            let record_id = url.dns_record_id.as_deref().unwrap_or_default();

            let zone = match provider.find_zone(&url.domain_suffix).await {
                Ok(zone) => zone,
                Err(e) => {
                    error!("error validating {}: {}", url.full_url, e);
                    continue;
                }
            };
            let Some(zone) = zone else {
                info!("zone not found for {}, removing {}", url.domain_suffix, url.full_url);
                self.store.delete_exposed_url(&url.id).await?;
                removed += 1;
                continue;
            };

            match provider.get_dns_record(&zone.id, record_id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    info!("DNS record not found for {}, removing binding", url.full_url);
                    self.store.delete_exposed_url(&url.id).await?;
                    removed += 1;
                }
                Err(e) => {
                    error!("error checking DNS record for {}: {}", url.full_url, e);
                }
            }
        }

        if removed > 0 {
            info!("removed {} orphaned domain record(s)", removed);
        } else {
            info!("all domain records validated successfully");
        }
        Ok(removed)
    }

    /// Manual validation trigger: validate, then stamp the run time
    pub async fn run_validation(&self) -> Result<usize, Error> {
        let removed = self.validate_bindings().await?;
        self.settings.record_validation_run().await?;
        Ok(removed)
    }
}
