//! Build & run executor for single-service deployments
//!
//! Every mutating operation takes the per-scope lock first, so
//! overlapping triggers for one service serialize. Attempt progress
//! goes to the scoped log sink; failures convert to Error status plus
//! a log line rather than leaving the record mid-flight.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::app::locks::ScopeLocks;
use crate::deploy::git;
use crate::deploy::status::ServiceStatus;
use crate::docker;
use crate::errors::Error;
use crate::models::project::ProjectKind;
use crate::models::service::{Service, SourceKind};
use crate::storage::build_logs::{BuildLogs, LogScope};
use crate::storage::layout::StorageLayout;
use crate::storage::settings::SettingsStore;
use crate::storage::store::Store;

/// Container lifecycle verb on an attached container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl FromStr for ServiceAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(ServiceAction::Start),
            "stop" => Ok(ServiceAction::Stop),
            "restart" => Ok(ServiceAction::Restart),
            other => Err(Error::ValidationError(format!(
                "unknown service action '{}'",
                other
            ))),
        }
    }
}

/// Deployment engine shared by the API handlers and workers
pub struct Deployer {
    pub(crate) store: Arc<Store>,
    pub(crate) settings: Arc<SettingsStore>,
    pub(crate) layout: StorageLayout,
    pub(crate) logs: BuildLogs,
    pub(crate) locks: Arc<ScopeLocks>,
}

impl Deployer {
    pub fn new(
        store: Arc<Store>,
        settings: Arc<SettingsStore>,
        layout: StorageLayout,
        logs: BuildLogs,
        locks: Arc<ScopeLocks>,
    ) -> Self {
        Self {
            store,
            settings,
            layout,
            logs,
            locks,
        }
    }

    pub(crate) async fn log_line(&self, scope: LogScope<'_>, message: &str) {
        self.logs.append(scope, message).await;
    }

    async fn set_status(&self, service_id: &str, next: ServiceStatus) -> Result<(), Error> {
        let current = self.store.get_service(service_id).await?.status;
        let next = current
            .transition(next)
            .map_err(Error::ValidationError)?;
        self.store
            .update_service(service_id, |s| s.status = next)
            .await?;
        Ok(())
    }

    /// Deploy (or redeploy) a single service from its declared source.
    ///
    /// Rebuild is this same operation under the same identity.
    pub async fn deploy_service(&self, service_id: &str) -> Result<(), Error> {
        let _guard = self.locks.acquire(service_id).await;

        let service = self.store.get_service(service_id).await?;
        // Stack-managed services are rebuilt through their project;
        // reject before touching the status or the attempt log.
        if service.source_kind == SourceKind::ComposeRaw {
            return Err(Error::ValidationError(
                "service is managed by its compose stack".to_string(),
            ));
        }
        let scope = LogScope::Service(service_id);

        self.logs.clear(scope).await?;
        self.log_line(scope, &format!("# Deployment started at {}", Utc::now().to_rfc3339()))
            .await;
        self.log_line(scope, &format!("# Service: {}", service.name)).await;
        self.log_line(scope, "---").await;

        self.set_status(service_id, ServiceStatus::Building).await?;

        let result = match service.source_kind {
            SourceKind::Image => self.deploy_image(&service, scope).await,
            SourceKind::Github => self.deploy_git(&service, scope).await,
            SourceKind::ComposeRaw => unreachable!("rejected before status transition"),
        };

        match result {
            Ok(()) => {
                info!(service_id, "deployment finished");
                Ok(())
            }
            Err(e) => {
                error!(service_id, "deployment failed: {}", e);
                self.log_line(scope, &format!("\nERROR: {}", e)).await;
                let _ = self
                    .store
                    .update_service(service_id, |s| s.status = ServiceStatus::Error)
                    .await;
                Err(e)
            }
        }
    }

    async fn deploy_image(&self, service: &Service, scope: LogScope<'_>) -> Result<(), Error> {
        let image = service
            .image_name
            .clone()
            .ok_or_else(|| Error::ValidationError("service has no image configured".into()))?;

        self.log_line(scope, &format!("Pulling image {}...", image)).await;
        let output = docker::pull(&image).await?;
        self.log_line(scope, output.trim_end()).await;

        // A previous attempt may have left a container under our name.
        let _ = docker::remove(&service.container_name()).await;

        let env = self.env_strings(&service.id).await;
        let labels = self.labels(service);
        let container_id =
            docker::create_and_start(&service.container_name(), &image, &env, &labels).await?;

        self.log_line(scope, "Successfully deployed and started container").await;
        self.store
            .update_service(&service.id, |s| {
                s.container_id = Some(container_id.clone());
                s.status = ServiceStatus::Running;
            })
            .await?;
        Ok(())
    }

    async fn deploy_git(&self, service: &Service, scope: LogScope<'_>) -> Result<(), Error> {
        let repo_url = service
            .git_repo_url
            .clone()
            .ok_or_else(|| Error::ValidationError("service has no repository configured".into()))?;
        let branch = service.git_branch.clone().unwrap_or_else(|| "main".into());

        let dest = self
            .layout
            .service_workspace(&service.project_id, &service.name);
        let token = self.settings.github_token().await?;

        self.log_line(scope, &format!("Step 1: Cloning {} (branch: {})...", repo_url, branch))
            .await;
        let checkout = git::acquire(
            &repo_url,
            &branch,
            &dest,
            "docker-compose.yml",
            token.as_deref(),
        )
        .await?;
        self.log_line(scope, "Step 1: DONE").await;

        // Step 2: materialize this service's env vars next to the source
        let env = self.env_strings(&service.id).await;
        tokio::fs::write(checkout.path.join(".env"), env.join("\n")).await?;

        if checkout.compose_content.is_some() {
            // The checkout ships its own stack definition.
            self.log_line(scope, "Step 3: Deploying using Docker Compose...").await;
            let stack_name = service.container_name().to_lowercase();
            let output = docker::compose_up(&stack_name, &checkout.path).await?;
            self.log_line(scope, output.trim_end()).await;
            self.log_line(scope, "Successfully deployed with Docker Compose").await;

            self.store
                .update_service(&service.id, |s| s.status = ServiceStatus::Running)
                .await?;
            return Ok(());
        }

        self.log_line(scope, "Step 3: Building Docker image...").await;
        let image = format!(
            "{}:latest",
            crate::deploy::container_name(&service.project_id, &service.name)
        );
        let dockerfile = service
            .git_dockerfile_path
            .clone()
            .unwrap_or_else(|| "Dockerfile".into());
        let output = docker::build(&checkout.path, &dockerfile, &image).await?;
        self.log_line(scope, output.trim_end()).await;

        // Recreate: drop whatever ran before under this identity.
        if let Some(old_id) = &service.container_id {
            if let Ok(Some(state)) = docker::inspect(old_id).await {
                if state.running {
                    let _ = docker::stop(old_id).await;
                }
                let _ = docker::remove(old_id).await;
            }
        }
        let _ = docker::remove(&service.container_name()).await;

        let labels = self.labels(service);
        let container_id =
            docker::create_and_start(&service.container_name(), &image, &env, &labels).await?;

        self.log_line(scope, "Successfully deployed and started container").await;
        self.store
            .update_service(&service.id, |s| {
                s.container_id = Some(container_id.clone());
                s.image_name = Some(image.clone());
                s.status = ServiceStatus::Running;
            })
            .await?;
        Ok(())
    }

    /// Start, stop or restart the attached container
    pub async fn service_action(
        &self,
        service_id: &str,
        action: ServiceAction,
    ) -> Result<(), Error> {
        let _guard = self.locks.acquire(service_id).await;

        let service = self.store.get_service(service_id).await?;
        let container_id = service
            .container_id
            .clone()
            .ok_or_else(|| Error::RuntimeError("no container attached".to_string()))?;

        let next = match action {
            ServiceAction::Start => {
                docker::start(&container_id).await?;
                ServiceStatus::Running
            }
            ServiceAction::Stop => {
                docker::stop(&container_id).await?;
                ServiceStatus::Stopped
            }
            ServiceAction::Restart => {
                docker::restart(&container_id).await?;
                ServiceStatus::Running
            }
        };
        self.set_status(service_id, next).await
    }

    /// Delete a service and its container.
    ///
    /// Record deletion always proceeds; a vanished container or a
    /// runtime refusal never strands the record.
    pub async fn delete_service(&self, service_id: &str) -> Result<(), Error> {
        let _guard = self.locks.acquire(service_id).await;

        let service = self.store.get_service(service_id).await?;
        if let Some(container_id) = &service.container_id {
            match docker::inspect(container_id).await {
                Ok(Some(state)) => {
                    if state.running {
                        let _ = docker::stop(container_id).await;
                    }
                    let _ = docker::remove(container_id).await;
                }
                Ok(None) => {}
                Err(e) => error!(service_id, "error removing container: {}", e),
            }
        }

        self.store.delete_service_records(service_id).await
    }

    /// Delete a project: containers first, then every scoped record
    pub async fn delete_project(&self, project_id: &str) -> Result<(), Error> {
        let _guard = self.locks.acquire(project_id).await;

        let project = self.store.get_project(project_id).await?;
        let services = self.store.list_services_for_project(project_id).await;

        for service in &services {
            if let Some(container_id) = &service.container_id {
                if let Ok(Some(state)) = docker::inspect(container_id).await {
                    if state.running {
                        let _ = docker::stop(container_id).await;
                    }
                    let _ = docker::remove(container_id).await;
                }
            }
        }

        if project.kind == ProjectKind::Compose {
            let workdir = super::compose::project_workdir(&self.layout, &project);
            if workdir.exists() {
                let name = docker::compose_project_name(project_id);
                let _ = docker::compose_lifecycle(&name, "down", &workdir).await;
            }
        }

        self.store.delete_project_records(project_id).await
    }

    pub(crate) async fn env_strings(&self, service_id: &str) -> Vec<String> {
        self.store
            .env_for_service(service_id)
            .await
            .iter()
            .map(|e| format!("{}={}", e.key, e.value))
            .collect()
    }

    fn labels(&self, service: &Service) -> Vec<(String, String)> {
        vec![
            (super::LABEL_SERVICE_ID.to_string(), service.id.clone()),
            (super::LABEL_PROJECT_ID.to_string(), service.project_id.clone()),
        ]
    }
}
