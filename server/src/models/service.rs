//! Service and environment variable models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::status::ServiceStatus;

/// Where a service's runnable artifact comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    /// Pull a prebuilt image
    Image,
    /// Clone a repository and build from a Dockerfile
    Github,
    /// Declared by a compose manifest, managed at the stack level
    ComposeRaw,
}

/// One deployable unit
///
/// `container_id` is a weak reference: the runtime owns the truth about
/// whether that container still exists, so it is re-verified before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub project_id: String,
    /// Unique within the owning project
    pub name: String,
    pub source_kind: SourceKind,

    #[serde(default)]
    pub image_name: Option<String>,
    #[serde(default)]
    pub git_repo_url: Option<String>,
    #[serde(default)]
    pub git_branch: Option<String>,
    #[serde(default)]
    pub git_dockerfile_path: Option<String>,

    #[serde(default)]
    pub container_id: Option<String>,
    pub status: ServiceStatus,

    /// True when this record mirrors a compose sub-service
    #[serde(default)]
    pub compose_managed: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    pub fn new(project_id: impl Into<String>, name: impl Into<String>, source_kind: SourceKind) -> Self {
        let now = Utc::now();
        Self {
            id: crate::utils::generate_uuid(),
            project_id: project_id.into(),
            name: name.into(),
            source_kind,
            image_name: None,
            git_repo_url: None,
            git_branch: None,
            git_dockerfile_path: None,
            container_id: None,
            status: ServiceStatus::Starting,
            compose_managed: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Deterministic container name for this service
    pub fn container_name(&self) -> String {
        crate::deploy::container_name(&self.project_id, &self.name)
    }
}

/// Key/value pair scoped to one service; values are opaque
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvVariable {
    pub id: String,
    pub service_id: String,
    pub key: String,
    pub value: String,
}

impl EnvVariable {
    pub fn new(service_id: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: crate::utils::generate_uuid(),
            service_id: service_id.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}
