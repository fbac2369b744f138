//! Project model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Project kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectKind {
    /// Single-service project
    Standard,
    /// Multi-service compose stack
    Compose,
}

/// A deployment unit grouping zero or more services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub kind: ProjectKind,

    /// Git source for compose stacks cloned from a repository
    #[serde(default)]
    pub git_repo_url: Option<String>,
    #[serde(default)]
    pub git_branch: Option<String>,
    /// Path of the compose file inside the repository
    #[serde(default)]
    pub git_compose_path: Option<String>,

    /// Cached manifest text, written on deploy and after each clone
    #[serde(default)]
    pub compose_content: Option<String>,
    /// Cached env-file text
    #[serde(default)]
    pub env_content: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>, kind: ProjectKind) -> Self {
        let now = Utc::now();
        Self {
            id: crate::utils::generate_uuid(),
            name: name.into(),
            kind,
            git_repo_url: None,
            git_branch: None,
            git_compose_path: None,
            compose_content: None,
            env_content: None,
            created_at: now,
            updated_at: now,
        }
    }
}
