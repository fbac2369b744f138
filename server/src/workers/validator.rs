//! Periodic domain validation worker
//!
//! The supervisor owns the ticker task. `restart` reads the schedule
//! from current settings, aborts whatever ticker is running, and spawns
//! a fresh one; settings changes take effect by calling it again. Both
//! `restart` and `stop` are idempotent.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::errors::Error;
use crate::ingress::IngressManager;
use crate::storage::settings::SettingsStore;

/// Run the validation ticker: one pass immediately, then every
/// `interval`. A failed pass never stops the loop.
pub async fn run<S, F>(interval: Duration, ingress: Arc<IngressManager>, sleep_fn: S)
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Domain validation worker starting...");
    loop {
        match ingress.run_validation().await {
            Ok(removed) => {
                info!("scheduled domain validation finished ({} removed)", removed);
            }
            Err(e) => {
                error!("scheduled domain validation failed: {}", e);
            }
        }
        sleep_fn(interval).await;
    }
}

/// Owns and restarts the validation ticker
pub struct ValidatorSupervisor {
    ingress: Arc<IngressManager>,
    settings: Arc<SettingsStore>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ValidatorSupervisor {
    pub fn new(ingress: Arc<IngressManager>, settings: Arc<SettingsStore>) -> Self {
        Self {
            ingress,
            settings,
            handle: Mutex::new(None),
        }
    }

    /// (Re)start the ticker from current settings.
    ///
    /// Disabled in settings means any running ticker is stopped and
    /// nothing new is spawned.
    pub async fn restart(&self) -> Result<(), Error> {
        let mut slot = self.handle.lock().await;
        if let Some(handle) = slot.take() {
            handle.abort();
        }

        let (enabled, interval_hours) = self.settings.validation_schedule().await?;
        if !enabled {
            info!("domain validation scheduler is disabled");
            return Ok(());
        }

        info!("starting domain validation scheduler (every {} hours)", interval_hours);
        let interval = Duration::from_secs(interval_hours * 60 * 60);
        let ingress = self.ingress.clone();
        *slot = Some(tokio::spawn(async move {
            run(interval, ingress, tokio::time::sleep).await;
        }));
        Ok(())
    }

    /// Stop the ticker if one is running
    pub async fn stop(&self) {
        let mut slot = self.handle.lock().await;
        if let Some(handle) = slot.take() {
            handle.abort();
            info!("domain validation scheduler stopped");
        }
    }

    /// Whether a ticker is currently running
    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}
