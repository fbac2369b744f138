//! Deployment engine: source acquisition, manifest handling, executors

pub mod compose;
pub mod compose_parser;
pub mod executor;
pub mod git;
pub mod network;
pub mod status;
pub mod template;

/// Deterministic container name for a (project, service) pair.
///
/// Also the convention the ingress importer reverses when mapping
/// provider-side rules back onto services.
pub fn container_name(project_id: &str, service_name: &str) -> String {
    format!("dockhand-{}-{}", project_id, service_name)
}

/// Label identifying the owning service on a managed container
pub const LABEL_SERVICE_ID: &str = "dockhand.service.id";
/// Label identifying the owning project on a managed container
pub const LABEL_PROJECT_ID: &str = "dockhand.project.id";
