//! Server state

use std::sync::Arc;

use crate::app::state::AppState;
use crate::deploy::executor::Deployer;
use crate::ingress::IngressManager;
use crate::storage::build_logs::BuildLogs;
use crate::storage::settings::SettingsStore;
use crate::storage::store::Store;
use crate::workers::validator::ValidatorSupervisor;

/// Server state shared across handlers
pub struct ServerState {
    pub store: Arc<Store>,
    pub settings: Arc<SettingsStore>,
    pub logs: BuildLogs,
    pub deployer: Arc<Deployer>,
    pub ingress: Arc<IngressManager>,
    pub validator: Arc<ValidatorSupervisor>,
}

impl ServerState {
    pub fn new(app: Arc<AppState>) -> Self {
        Self {
            store: app.store.clone(),
            settings: app.settings.clone(),
            logs: app.logs.clone(),
            deployer: app.deployer.clone(),
            ingress: app.ingress.clone(),
            validator: app.validator.clone(),
        }
    }
}
