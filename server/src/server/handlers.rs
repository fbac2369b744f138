//! HTTP request handlers
//!
//! Every response is a `{success, ...}` envelope. Deploy triggers
//! return immediately and run as detached tasks; callers poll the
//! service record or the attempt log for progress.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::deploy::executor::ServiceAction;
use crate::deploy::template::resolve_template;
use crate::errors::Error;
use crate::ingress::manager::CustomDomainRequest;
use crate::models::project::{Project, ProjectKind};
use crate::models::service::{Service, SourceKind};
use crate::server::state::ServerState;
use crate::storage::build_logs::LogScope;
use crate::utils::version_info;

fn success(data: Value) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

fn failure(error: &Error) -> Json<Value> {
    Json(json!({ "success": false, "error": error.to_string() }))
}

fn respond(result: Result<Value, Error>) -> Json<Value> {
    match result {
        Ok(data) => success(data),
        Err(e) => failure(&e),
    }
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(json!({
        "status": "healthy",
        "service": "dockhand",
        "version": version.version,
    }))
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(json!({
        "version": version.version,
        "git_hash": version.git_hash,
        "build_time": version.build_time,
    }))
}

// ── Projects ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub kind: Option<ProjectKind>,
    #[serde(default)]
    pub git_repo_url: Option<String>,
    #[serde(default)]
    pub git_branch: Option<String>,
    #[serde(default)]
    pub git_compose_path: Option<String>,
}

pub async fn create_project_handler(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<CreateProjectRequest>,
) -> impl IntoResponse {
    let result: Result<Value, Error> = async {
        if req.name.trim().is_empty() {
            return Err(Error::ValidationError("name is required".into()));
        }
        let mut project = Project::new(req.name.trim(), req.kind.unwrap_or(ProjectKind::Standard));
        project.git_repo_url = req.git_repo_url;
        project.git_branch = req.git_branch;
        project.git_compose_path = req.git_compose_path;
        let project = state.store.insert_project(project).await?;

        // Git-sourced stacks get an eager first clone so the manifest
        // is visible before the first deploy.
        if project.kind == ProjectKind::Compose && project.git_repo_url.is_some() {
            let deployer = state.deployer.clone();
            let project_id = project.id.clone();
            tokio::spawn(async move {
                if let Err(e) = deployer.clone_project_repo(&project_id).await {
                    error!("failed to clone repo at project creation: {}", e);
                }
            });
        }
        Ok(serde_json::to_value(&project)?)
    }
    .await;
    respond(result)
}

pub async fn list_projects_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let projects = state.store.list_projects().await;
    respond(serde_json::to_value(&projects).map_err(Error::from))
}

pub async fn delete_project_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    respond(state.deployer.delete_project(&id).await.map(|()| Value::Null))
}

// ── Single-service deploys ───────────────────────────────────────────

fn validate_service_name(name: &str) -> Result<(), Error> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(Error::ValidationError(
            "name must be lowercase, alphanumeric, and hyphens only".into(),
        ));
    }
    Ok(())
}

/// `KEY=VALUE` lines, blank/invalid lines skipped
fn parse_env_lines(raw: &str) -> Vec<(String, String)> {
    raw.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

async fn store_env(state: &ServerState, service_id: &str, raw: &str) -> Result<(), Error> {
    for (key, value) in parse_env_lines(raw) {
        state.store.set_env_variable(service_id, &key, &value).await?;
    }
    Ok(())
}

fn spawn_deploy(state: &ServerState, service_id: String) {
    let deployer = state.deployer.clone();
    // Handle deliberately dropped; progress is polled via the record
    // and the attempt log.
    tokio::spawn(async move {
        let _ = deployer.deploy_service(&service_id).await;
    });
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployImageRequest {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub env: String,
}

pub async fn deploy_image_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
    Json(req): Json<DeployImageRequest>,
) -> impl IntoResponse {
    let result: Result<Value, Error> = async {
        validate_service_name(&req.name)?;
        if req.image.is_empty() {
            return Err(Error::ValidationError("image is required".into()));
        }
        state.store.get_project(&project_id).await?;

        let mut service = Service::new(&project_id, &req.name, SourceKind::Image);
        service.image_name = Some(req.image.clone());
        let service = state.store.insert_service(service).await?;
        store_env(&state, &service.id, &req.env).await?;

        spawn_deploy(&state, service.id.clone());
        Ok(json!({ "serviceId": service.id }))
    }
    .await;
    respond(result)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployGitRequest {
    pub name: String,
    pub repo_url: String,
    pub branch: String,
    pub dockerfile_path: String,
    #[serde(default)]
    pub env: String,
}

pub async fn deploy_git_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
    Json(req): Json<DeployGitRequest>,
) -> impl IntoResponse {
    let result: Result<Value, Error> = async {
        validate_service_name(&req.name)?;
        if req.repo_url.is_empty() || req.branch.is_empty() || req.dockerfile_path.is_empty() {
            return Err(Error::ValidationError(
                "repoUrl, branch and dockerfilePath are required".into(),
            ));
        }
        state.store.get_project(&project_id).await?;

        let mut service = Service::new(&project_id, &req.name, SourceKind::Github);
        service.git_repo_url = Some(req.repo_url.clone());
        service.git_branch = Some(req.branch.clone());
        service.git_dockerfile_path = Some(req.dockerfile_path.clone());
        let service = state.store.insert_service(service).await?;
        store_env(&state, &service.id, &req.env).await?;

        spawn_deploy(&state, service.id.clone());
        Ok(json!({ "serviceId": service.id }))
    }
    .await;
    respond(result)
}

pub async fn rebuild_service_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let result: Result<Value, Error> = async {
        let service = state.store.get_service(&id).await?;
        // Stack-managed services rebuild through their project's
        // compose endpoints; fail here instead of in the spawned task.
        if service.source_kind == SourceKind::ComposeRaw {
            return Err(Error::ValidationError(
                "service is managed by its compose stack".to_string(),
            ));
        }
        spawn_deploy(&state, id);
        Ok(Value::Null)
    }
    .await;
    respond(result)
}

#[derive(Debug, Deserialize)]
pub struct ServiceActionRequest {
    pub action: String,
}

pub async fn service_action_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(req): Json<ServiceActionRequest>,
) -> impl IntoResponse {
    let result: Result<Value, Error> = async {
        let action: ServiceAction = req.action.parse()?;
        state.deployer.service_action(&id, action).await?;
        Ok(Value::Null)
    }
    .await;
    respond(result)
}

pub async fn delete_service_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    respond(state.deployer.delete_service(&id).await.map(|()| Value::Null))
}

pub async fn service_logs_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let result = state
        .logs
        .read(LogScope::Service(&id))
        .await
        .map(|log| json!({ "log": log }));
    respond(result)
}

// ── Compose stacks ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeDeployRequest {
    pub compose_content: String,
    #[serde(default)]
    pub env_content: String,
}

pub async fn compose_deploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
    Json(req): Json<ComposeDeployRequest>,
) -> impl IntoResponse {
    let result: Result<Value, Error> = async {
        state.store.get_project(&project_id).await?;
        let deployer = state.deployer.clone();
        tokio::spawn(async move {
            let _ = deployer
                .deploy_compose_project(&project_id, &req.compose_content, &req.env_content)
                .await;
        });
        Ok(Value::Null)
    }
    .await;
    respond(result)
}

pub async fn compose_rebuild_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    let result: Result<Value, Error> = async {
        state.store.get_project(&project_id).await?;
        let deployer = state.deployer.clone();
        tokio::spawn(async move {
            let _ = deployer.compose_rebuild(&project_id).await;
        });
        Ok(Value::Null)
    }
    .await;
    respond(result)
}

pub async fn compose_lifecycle_handler(
    State(state): State<Arc<ServerState>>,
    Path((project_id, verb)): Path<(String, String)>,
) -> impl IntoResponse {
    let result: Result<Value, Error> = async {
        if !matches!(verb.as_str(), "start" | "stop" | "restart" | "down") {
            return Err(Error::ValidationError(format!(
                "unknown compose action '{}'",
                verb
            )));
        }
        state.deployer.compose_lifecycle(&project_id, &verb).await?;
        Ok(Value::Null)
    }
    .await;
    respond(result)
}

pub async fn project_logs_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let result = state
        .logs
        .read(LogScope::Project(&id))
        .await
        .map(|log| json!({ "log": log }));
    respond(result)
}

// ── Template deploys ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployTemplateRequest {
    pub template_id: String,
    #[serde(default)]
    pub project_name: Option<String>,
    /// Template definition text (variables + config sections)
    pub template: String,
    pub compose_content: String,
}

/// Resolve a template and deploy it as a fresh compose project.
///
/// The primary declared domain is auto-exposed after the stack is up,
/// but only when a default domain is configured; expose failures do
/// not fail the deploy.
pub async fn deploy_template_handler(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<DeployTemplateRequest>,
) -> impl IntoResponse {
    let result: Result<Value, Error> = async {
        if req.template_id.is_empty() {
            return Err(Error::ValidationError("templateId is required".into()));
        }
        let default_domain = state.settings.base_domain().await?;
        let resolved = resolve_template(
            &req.template,
            default_domain.as_deref(),
            Some(&req.template_id),
        );

        let name = req
            .project_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| req.template_id.clone());
        let project = state
            .store
            .insert_project(Project::new(name, ProjectKind::Compose))
            .await?;

        let env_content = resolved
            .env_vars
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("\n");

        let deployer = state.deployer.clone();
        let ingress = state.ingress.clone();
        let store = state.store.clone();
        let project_id = project.id.clone();
        let template_id = req.template_id.clone();
        let compose_content = req.compose_content.clone();
        let primary = resolved.domains.first().cloned();
        tokio::spawn(async move {
            if deployer
                .deploy_compose_project(&project_id, &compose_content, &env_content)
                .await
                .is_err()
            {
                return;
            }
            // Auto-expose the primary declared domain.
            let (Some(domain), Some(suffix)) = (primary, default_domain) else {
                return;
            };
            let service = store
                .list_services_for_project(&project_id)
                .await
                .into_iter()
                .find(|s| s.name == domain.service_name);
            if let Some(service) = service {
                if let Err(e) = ingress
                    .expose(&service.id, &template_id, &suffix, domain.port)
                    .await
                {
                    error!("auto-expose failed for template {}: {}", template_id, e);
                }
            }
        });

        Ok(json!({ "projectId": project.id }))
    }
    .await;
    respond(result)
}

// ── Ingress ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposeRequest {
    pub service_id: String,
    pub subdomain: String,
    pub domain_suffix: String,
    pub port: u16,
}

pub async fn expose_handler(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<ExposeRequest>,
) -> impl IntoResponse {
    let result: Result<Value, Error> = async {
        if req.subdomain.is_empty() || req.domain_suffix.is_empty() || req.port == 0 {
            return Err(Error::ValidationError(
                "subdomain, domainSuffix and port are required".into(),
            ));
        }
        let exposed = state
            .ingress
            .expose(&req.service_id, &req.subdomain, &req.domain_suffix, req.port)
            .await?;
        Ok(json!({ "url": exposed.full_url, "id": exposed.id }))
    }
    .await;
    respond(result)
}

pub async fn unexpose_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    respond(state.ingress.unexpose(&id).await.map(|()| Value::Null))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomDomainBody {
    pub hostname: String,
    pub protocol: String,
    pub target_ip: String,
    pub port: u16,
    #[serde(default)]
    pub service_id: Option<String>,
}

pub async fn add_custom_domain_handler(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<CustomDomainBody>,
) -> impl IntoResponse {
    let result = state
        .ingress
        .add_custom_domain(CustomDomainRequest {
            hostname: req.hostname,
            protocol: req.protocol,
            target_ip: req.target_ip,
            port: req.port,
            service_id: req.service_id,
        })
        .await
        .map(|exposed| json!({ "url": exposed.full_url, "id": exposed.id }));
    respond(result)
}

pub async fn trigger_validation_handler(
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    let result = state
        .ingress
        .run_validation()
        .await
        .map(|removed| json!({ "removed": removed }));
    respond(result)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationScheduleRequest {
    pub enabled: bool,
    pub interval_hours: u64,
}

pub async fn validation_schedule_handler(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<ValidationScheduleRequest>,
) -> impl IntoResponse {
    let result: Result<Value, Error> = async {
        if req.interval_hours < 1 {
            return Err(Error::ValidationError(
                "interval must be at least 1 hour".into(),
            ));
        }
        state
            .settings
            .set(
                crate::storage::settings::DOMAIN_VALIDATION_ENABLED,
                if req.enabled { "true" } else { "false" },
            )
            .await?;
        state
            .settings
            .set(
                crate::storage::settings::DOMAIN_VALIDATION_INTERVAL,
                &req.interval_hours.to_string(),
            )
            .await?;
        state.validator.restart().await?;
        Ok(Value::Null)
    }
    .await;
    respond(result)
}

pub async fn tunnel_setup_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let result = state
        .ingress
        .setup_tunnel()
        .await
        .map(|message| json!({ "message": message }));
    respond(result)
}

// ── Settings ─────────────────────────────────────────────────────────

pub async fn get_setting_handler(
    State(state): State<Arc<ServerState>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    let result = state
        .settings
        .get(&key)
        .await
        .map(|value| json!({ "key": key, "value": value }));
    respond(result)
}

#[derive(Debug, Deserialize)]
pub struct SetSettingRequest {
    pub value: String,
}

pub async fn set_setting_handler(
    State(state): State<Arc<ServerState>>,
    Path(key): Path<String>,
    Json(req): Json<SetSettingRequest>,
) -> impl IntoResponse {
    respond(
        state
            .settings
            .set(&key, &req.value)
            .await
            .map(|()| Value::Null),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_lines() {
        let parsed = parse_env_lines("A=1\nB=two=2\n\nbroken\nC= \n =x");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], ("A".to_string(), "1".to_string()));
        assert_eq!(parsed[1], ("B".to_string(), "two=2".to_string()));
    }

    #[test]
    fn test_validate_service_name() {
        assert!(validate_service_name("my-app2").is_ok());
        assert!(validate_service_name("MyApp").is_err());
        assert!(validate_service_name("app_1").is_err());
        assert!(validate_service_name("").is_err());
    }
}
