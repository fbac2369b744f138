//! JSON-file datastore
//!
//! Keyed CRUD plus upsert-by-(project, name) over a single JSON file.
//! The whole database lives behind one `RwLock` and is flushed after
//! every mutation; this core never needs more than that from its
//! datastore.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::Error;
use crate::models::ingress::ExposedUrl;
use crate::models::project::Project;
use crate::models::service::{EnvVariable, Service};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Database {
    #[serde(default)]
    projects: Vec<Project>,
    #[serde(default)]
    services: Vec<Service>,
    #[serde(default)]
    env_variables: Vec<EnvVariable>,
    #[serde(default)]
    exposed_urls: Vec<ExposedUrl>,
}

/// Datastore handle
pub struct Store {
    path: PathBuf,
    db: RwLock<Database>,
}

impl Store {
    /// Open the store, reading the existing file if present
    pub async fn open(path: PathBuf) -> Result<Self, Error> {
        let db = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::StorageError(format!("corrupt store file: {}", e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Database::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            db: RwLock::new(db),
        })
    }

    async fn flush(&self, db: &Database) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(db)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }

    // ── Projects ─────────────────────────────────────────────────────

    pub async fn insert_project(&self, project: Project) -> Result<Project, Error> {
        let mut db = self.db.write().await;
        db.projects.push(project.clone());
        self.flush(&db).await?;
        Ok(project)
    }

    pub async fn get_project(&self, id: &str) -> Result<Project, Error> {
        let db = self.db.read().await;
        db.projects
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("project {}", id)))
    }

    pub async fn list_projects(&self) -> Vec<Project> {
        self.db.read().await.projects.clone()
    }

    pub async fn update_project<F>(&self, id: &str, mutate: F) -> Result<Project, Error>
    where
        F: FnOnce(&mut Project),
    {
        let mut db = self.db.write().await;
        let project = db
            .projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::NotFound(format!("project {}", id)))?;
        mutate(project);
        project.updated_at = chrono::Utc::now();
        let updated = project.clone();
        self.flush(&db).await?;
        Ok(updated)
    }

    /// Delete the project record and everything scoped to it.
    ///
    /// Containers are the executor's problem; this only removes records.
    pub async fn delete_project_records(&self, id: &str) -> Result<(), Error> {
        let mut db = self.db.write().await;
        let service_ids: Vec<String> = db
            .services
            .iter()
            .filter(|s| s.project_id == id)
            .map(|s| s.id.clone())
            .collect();
        db.env_variables.retain(|e| !service_ids.contains(&e.service_id));
        db.exposed_urls.retain(|u| !service_ids.contains(&u.service_id));
        db.services.retain(|s| s.project_id != id);
        db.projects.retain(|p| p.id != id);
        self.flush(&db).await?;
        debug!(project_id = id, "deleted project records");
        Ok(())
    }

    // ── Services ─────────────────────────────────────────────────────

    pub async fn insert_service(&self, service: Service) -> Result<Service, Error> {
        let mut db = self.db.write().await;
        if db
            .services
            .iter()
            .any(|s| s.project_id == service.project_id && s.name == service.name)
        {
            return Err(Error::ValidationError(format!(
                "service '{}' already exists in project",
                service.name
            )));
        }
        db.services.push(service.clone());
        self.flush(&db).await?;
        Ok(service)
    }

    pub async fn get_service(&self, id: &str) -> Result<Service, Error> {
        let db = self.db.read().await;
        db.services
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("service {}", id)))
    }

    pub async fn list_services(&self) -> Vec<Service> {
        self.db.read().await.services.clone()
    }

    pub async fn list_services_for_project(&self, project_id: &str) -> Vec<Service> {
        self.db
            .read()
            .await
            .services
            .iter()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect()
    }

    /// The most recently updated RUNNING service, if any
    pub async fn latest_running_service(&self) -> Option<Service> {
        let db = self.db.read().await;
        db.services
            .iter()
            .filter(|s| s.status == crate::deploy::status::ServiceStatus::Running)
            .max_by_key(|s| s.updated_at)
            .cloned()
    }

    pub async fn update_service<F>(&self, id: &str, mutate: F) -> Result<Service, Error>
    where
        F: FnOnce(&mut Service),
    {
        let mut db = self.db.write().await;
        let service = db
            .services
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("service {}", id)))?;
        mutate(service);
        service.updated_at = chrono::Utc::now();
        let updated = service.clone();
        self.flush(&db).await?;
        Ok(updated)
    }

    /// Upsert keyed by (project, name); used when reconciling compose
    /// sub-services against the runtime.
    pub async fn upsert_service_by_name<F>(
        &self,
        project_id: &str,
        name: &str,
        create: impl FnOnce() -> Service,
        mutate: F,
    ) -> Result<Service, Error>
    where
        F: FnOnce(&mut Service),
    {
        let mut db = self.db.write().await;
        let service = match db
            .services
            .iter_mut()
            .find(|s| s.project_id == project_id && s.name == name)
        {
            Some(existing) => {
                mutate(existing);
                existing.updated_at = chrono::Utc::now();
                existing.clone()
            }
            None => {
                let mut fresh = create();
                mutate(&mut fresh);
                db.services.push(fresh.clone());
                fresh
            }
        };
        self.flush(&db).await?;
        Ok(service)
    }

    pub async fn delete_service_records(&self, id: &str) -> Result<(), Error> {
        let mut db = self.db.write().await;
        if !db.services.iter().any(|s| s.id == id) {
            return Err(Error::NotFound(format!("service {}", id)));
        }
        db.env_variables.retain(|e| e.service_id != id);
        db.exposed_urls.retain(|u| u.service_id != id);
        db.services.retain(|s| s.id != id);
        self.flush(&db).await?;
        Ok(())
    }

    // ── Env variables ────────────────────────────────────────────────

    pub async fn env_for_service(&self, service_id: &str) -> Vec<EnvVariable> {
        self.db
            .read()
            .await
            .env_variables
            .iter()
            .filter(|e| e.service_id == service_id)
            .cloned()
            .collect()
    }

    /// Set one variable; keys are unique per service, values overwrite
    pub async fn set_env_variable(
        &self,
        service_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error> {
        let mut db = self.db.write().await;
        match db
            .env_variables
            .iter_mut()
            .find(|e| e.service_id == service_id && e.key == key)
        {
            Some(existing) => existing.value = value.to_string(),
            None => db
                .env_variables
                .push(EnvVariable::new(service_id, key, value)),
        }
        self.flush(&db).await?;
        Ok(())
    }

    // ── Exposed URLs ─────────────────────────────────────────────────

    /// Insert a binding; the full hostname must be unique system-wide
    pub async fn insert_exposed_url(&self, url: ExposedUrl) -> Result<ExposedUrl, Error> {
        let mut db = self.db.write().await;
        if db.exposed_urls.iter().any(|u| u.full_url == url.full_url) {
            return Err(Error::ValidationError(format!(
                "hostname {} is already in use",
                url.full_url
            )));
        }
        db.exposed_urls.push(url.clone());
        self.flush(&db).await?;
        Ok(url)
    }

    pub async fn get_exposed_url(&self, id: &str) -> Result<ExposedUrl, Error> {
        let db = self.db.read().await;
        db.exposed_urls
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("exposed url {}", id)))
    }

    pub async fn find_exposed_url_by_hostname(&self, full_url: &str) -> Option<ExposedUrl> {
        let db = self.db.read().await;
        db.exposed_urls.iter().find(|u| u.full_url == full_url).cloned()
    }

    pub async fn list_exposed_urls(&self) -> Vec<ExposedUrl> {
        self.db.read().await.exposed_urls.clone()
    }

    pub async fn delete_exposed_url(&self, id: &str) -> Result<(), Error> {
        let mut db = self.db.write().await;
        let before = db.exposed_urls.len();
        db.exposed_urls.retain(|u| u.id != id);
        if db.exposed_urls.len() == before {
            return Err(Error::NotFound(format!("exposed url {}", id)));
        }
        self.flush(&db).await?;
        Ok(())
    }
}
