//! Compose stack deployment and lifecycle
//!
//! Stack operations run under the project's scope lock. After every
//! `up`, the parsed sub-services are reconciled into the store by
//! (project, name) so the record set mirrors what the runtime is
//! actually running.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use crate::deploy::compose_parser::parse_compose;
use crate::deploy::executor::Deployer;
use crate::deploy::git;
use crate::deploy::network::inject_network;
use crate::deploy::status::ServiceStatus;
use crate::docker;
use crate::errors::Error;
use crate::models::project::{Project, ProjectKind};
use crate::models::service::{Service, SourceKind};
use crate::storage::build_logs::LogScope;
use crate::storage::layout::StorageLayout;

/// Working directory for compose commands.
///
/// Git-sourced projects run from the directory containing the
/// configured compose path inside the checkout; everything else runs
/// from the project workspace root.
pub fn project_workdir(layout: &StorageLayout, project: &Project) -> PathBuf {
    let root = layout.project_workspace(&project.id);
    match &project.git_compose_path {
        Some(rel) => root
            .join(rel)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(root),
        None => root,
    }
}

fn manifest_path(layout: &StorageLayout, project: &Project) -> PathBuf {
    let root = layout.project_workspace(&project.id);
    match &project.git_compose_path {
        Some(rel) => root.join(rel),
        None => root.join("docker-compose.yml"),
    }
}

impl Deployer {
    /// Fresh clone of a git-sourced project into its workspace,
    /// caching the manifest and env text on the project record.
    pub async fn clone_project_repo(&self, project_id: &str) -> Result<Project, Error> {
        let project = self.store.get_project(project_id).await?;
        let repo_url = project
            .git_repo_url
            .clone()
            .ok_or_else(|| Error::ValidationError("no git repository configured".into()))?;
        let branch = project.git_branch.clone().unwrap_or_else(|| "main".into());
        let compose_path = project
            .git_compose_path
            .clone()
            .unwrap_or_else(|| "docker-compose.yml".into());

        let dest = self.layout.project_workspace(project_id);
        let token = self.settings.github_token().await?;
        let checkout = git::acquire(&repo_url, &branch, &dest, &compose_path, token.as_deref()).await?;

        self.store
            .update_project(project_id, |p| {
                if checkout.compose_content.is_some() {
                    p.compose_content = checkout.compose_content.clone();
                }
                if checkout.env_content.is_some() {
                    p.env_content = checkout.env_content.clone();
                }
            })
            .await
    }

    /// Deploy a compose stack from manifest text.
    ///
    /// Persists the text first, so a failed attempt is still
    /// redeployable from the record.
    pub async fn deploy_compose_project(
        &self,
        project_id: &str,
        compose_content: &str,
        env_content: &str,
    ) -> Result<(), Error> {
        let _guard = self.locks.acquire(project_id).await;
        let scope = LogScope::Project(project_id);

        self.logs.clear(scope).await?;
        self.log_line(scope, &format!("[{}] Starting deployment...", Utc::now().to_rfc3339()))
            .await;

        let result = self
            .run_compose_deploy(project_id, scope, Some((compose_content, env_content)))
            .await;

        match result {
            Ok(()) => {
                self.log_line(
                    scope,
                    &format!("\n[{}] Deployment completed successfully.", Utc::now().to_rfc3339()),
                )
                .await;
                info!(project_id, "compose deployment finished");
                Ok(())
            }
            Err(e) => {
                self.log_line(scope, &format!("\nERROR: {}", e)).await;
                Err(e)
            }
        }
    }

    /// Rebuild the stack from its recorded source
    pub async fn compose_rebuild(&self, project_id: &str) -> Result<(), Error> {
        let _guard = self.locks.acquire(project_id).await;
        let scope = LogScope::Project(project_id);

        self.logs.clear(scope).await?;
        self.log_line(scope, &format!("[{}] Starting rebuild...", Utc::now().to_rfc3339()))
            .await;

        let result = self.run_compose_deploy(project_id, scope, None).await;
        match result {
            Ok(()) => {
                self.log_line(
                    scope,
                    &format!("\n[{}] Rebuild completed successfully.", Utc::now().to_rfc3339()),
                )
                .await;
                Ok(())
            }
            Err(e) => {
                self.log_line(scope, &format!("\nERROR: {}", e)).await;
                Err(e)
            }
        }
    }

    /// Shared deploy/rebuild path. `content` carries fresh manifest and
    /// env text on an explicit deploy; a rebuild reuses the record.
    async fn run_compose_deploy(
        &self,
        project_id: &str,
        scope: LogScope<'_>,
        content: Option<(&str, &str)>,
    ) -> Result<(), Error> {
        if let Some((compose_content, env_content)) = content {
            let compose_content = compose_content.to_string();
            let env_content = env_content.to_string();
            self.store
                .update_project(project_id, |p| {
                    p.kind = ProjectKind::Compose;
                    p.compose_content = Some(compose_content);
                    p.env_content = Some(env_content);
                })
                .await?;
        }

        let mut project = self.store.get_project(project_id).await?;
        let workspace = self.layout.project_workspace(project_id);
        tokio::fs::create_dir_all(&workspace).await?;

        if project.git_repo_url.is_some() {
            self.log_line(
                scope,
                &format!(
                    "Cloning repository {}...",
                    project.git_repo_url.as_deref().unwrap_or_default()
                ),
            )
            .await;
            project = self.clone_project_repo(project_id).await?;
            self.log_line(scope, "Repository cloned successfully.").await;
        }

        let raw_manifest = project
            .compose_content
            .clone()
            .ok_or_else(|| Error::ValidationError("project has no compose content".into()))?;

        // Patch in the shared network and deterministic container names,
        // then write the manifest where compose will look for it.
        let manifest = inject_network(&raw_manifest, project_id)?;
        let manifest_file = manifest_path(&self.layout, &project);
        if let Some(parent) = manifest_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&manifest_file, &manifest).await?;
        if project.git_repo_url.is_none() {
            tokio::fs::write(
                workspace.join(".env"),
                project.env_content.as_deref().unwrap_or(""),
            )
            .await?;
        }

        docker::ensure_shared_network().await?;

        let workdir = project_workdir(&self.layout, &project);
        let stack_name = docker::compose_project_name(project_id);

        self.log_line(scope, "\n--- docker compose up --build ---").await;
        let output = docker::compose_up(&stack_name, &workdir).await?;
        self.log_line(scope, output.trim_end()).await;

        // Reconcile sub-service records against what is now running.
        let parsed = parse_compose(&manifest);
        for svc in &parsed.services {
            let container_id =
                docker::compose_container_id(&stack_name, &svc.name, &workdir).await;
            if container_id.is_none() {
                warn!(project_id, service = %svc.name, "no container found after compose up");
            }
            let project_id_owned = project_id.to_string();
            let name = svc.name.clone();
            self.store
                .upsert_service_by_name(
                    project_id,
                    &svc.name,
                    move || Service::new(project_id_owned, name, SourceKind::ComposeRaw),
                    |s| {
                        s.status = ServiceStatus::Running;
                        s.container_id = container_id.clone();
                        s.compose_managed = true;
                    },
                )
                .await?;
        }

        Ok(())
    }

    /// start / stop / restart / down across the whole stack
    pub async fn compose_lifecycle(&self, project_id: &str, verb: &str) -> Result<(), Error> {
        let _guard = self.locks.acquire(project_id).await;

        let project = self.store.get_project(project_id).await?;
        let workdir = project_workdir(&self.layout, &project);
        let stack_name = docker::compose_project_name(project_id);

        docker::compose_lifecycle(&stack_name, verb, &workdir).await?;

        let status = match verb {
            "stop" | "down" => ServiceStatus::Stopped,
            _ => ServiceStatus::Running,
        };
        self.sync_stack_statuses(project_id, status).await
    }

    async fn sync_stack_statuses(
        &self,
        project_id: &str,
        status: ServiceStatus,
    ) -> Result<(), Error> {
        let services = self.store.list_services_for_project(project_id).await;
        for service in services.iter().filter(|s| s.compose_managed) {
            self.store
                .update_service(&service.id, |s| s.status = status)
                .await?;
        }
        Ok(())
    }
}
