//! Shared application state

use std::sync::Arc;

use crate::app::locks::ScopeLocks;
use crate::app::options::AppOptions;
use crate::deploy::executor::Deployer;
use crate::errors::Error;
use crate::ingress::cloudflare::CloudflareSource;
use crate::ingress::IngressManager;
use crate::storage::build_logs::BuildLogs;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::SettingsStore;
use crate::storage::store::Store;
use crate::workers::validator::ValidatorSupervisor;

/// Application state shared across handlers and workers
pub struct AppState {
    pub layout: StorageLayout,
    pub store: Arc<Store>,
    pub settings: Arc<SettingsStore>,
    pub logs: BuildLogs,
    pub deployer: Arc<Deployer>,
    pub ingress: Arc<IngressManager>,
    pub validator: Arc<ValidatorSupervisor>,
}

impl AppState {
    /// Build the full state graph from options
    pub async fn init(options: &AppOptions) -> Result<Arc<Self>, Error> {
        let layout = options.storage.layout.clone();
        layout.setup().await?;

        let store = Arc::new(Store::open(layout.store_file()).await?);
        let settings = Arc::new(SettingsStore::new(layout.settings_file()));
        let logs = BuildLogs::new(layout.logs_dir());
        let locks = Arc::new(ScopeLocks::new());

        let deployer = Arc::new(Deployer::new(
            store.clone(),
            settings.clone(),
            layout.clone(),
            logs.clone(),
            locks.clone(),
        ));

        let provider = Arc::new(CloudflareSource::new(settings.clone()));
        let ingress = Arc::new(IngressManager::new(
            store.clone(),
            settings.clone(),
            provider,
        ));
        let validator = Arc::new(ValidatorSupervisor::new(ingress.clone(), settings.clone()));

        Ok(Arc::new(Self {
            layout,
            store,
            settings,
            logs,
            deployer,
            ingress,
            validator,
        }))
    }
}
