//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::Error;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::validator::ValidatorSupervisor;

/// Run the dockhand server
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Error> {
    info!("Initializing dockhand...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(options.lifecycle.clone());

    let _app_state = match init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to start server: {}", e);
            shutdown_manager.shutdown().await?;
            return Err(e);
        }
    };

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, Error> {
    let app_state = AppState::init(options).await?;

    if options.enable_startup_import {
        // Fire-and-forget by contract: the import outcome is observable
        // in the store and the logs, not awaited here.
        let ingress = app_state.ingress.clone();
        tokio::spawn(async move {
            if let Err(e) = ingress.import_bindings().await {
                error!("startup tunnel sync failed: {}", e);
            }
        });
    }

    if options.enable_validator {
        if let Err(e) = app_state.validator.restart().await {
            error!("failed to start domain validation scheduler: {}", e);
        }
        shutdown_manager.with_validator(app_state.validator.clone())?;
    }

    let mut shutdown_rx = shutdown_tx.subscribe();
    let server_state = Arc::new(ServerState::new(app_state.clone()));
    let server_handle = serve(&options.server, server_state, async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;
    shutdown_manager.with_server_handle(server_handle)?;

    Ok(app_state)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    lifecycle_options: LifecycleOptions,
    server_handle: Option<JoinHandle<Result<(), Error>>>,
    validator: Option<Arc<ValidatorSupervisor>>,
}

impl ShutdownManager {
    fn new(lifecycle_options: LifecycleOptions) -> Self {
        Self {
            lifecycle_options,
            server_handle: None,
            validator: None,
        }
    }

    fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), Error>>,
    ) -> Result<(), Error> {
        if self.server_handle.is_some() {
            return Err(Error::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    fn with_validator(&mut self, validator: Arc<ValidatorSupervisor>) -> Result<(), Error> {
        if self.validator.is_some() {
            return Err(Error::ShutdownError("validator already set".to_string()));
        }
        self.validator = Some(validator);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Error> {
        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), Error> {
        info!("Shutting down dockhand...");

        // 1. Validation scheduler
        if let Some(validator) = self.validator.take() {
            validator.stop().await;
        }

        // 2. HTTP server
        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| Error::ShutdownError(e.to_string()))??;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
