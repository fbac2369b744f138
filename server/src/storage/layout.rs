//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::Error;

/// On-disk layout for all server state
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Path of the datastore file
    pub fn store_file(&self) -> PathBuf {
        self.base_dir.join("store.json")
    }

    /// Path of the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("settings.json")
    }

    /// Directory holding per-scope attempt logs
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Workspace of a single-service git checkout
    pub fn service_workspace(&self, project_id: &str, service_name: &str) -> PathBuf {
        self.base_dir.join("apps").join(project_id).join(service_name)
    }

    /// Workspace of a compose project
    pub fn project_workspace(&self, project_id: &str) -> PathBuf {
        self.base_dir.join("compose").join(project_id)
    }

    /// Create the directory tree
    pub async fn setup(&self) -> Result<(), Error> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        tokio::fs::create_dir_all(self.logs_dir()).await?;
        tokio::fs::create_dir_all(self.base_dir.join("apps")).await?;
        tokio::fs::create_dir_all(self.base_dir.join("compose")).await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/var/lib/dockhand");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dockhand");

        Self::new(base_dir)
    }
}
