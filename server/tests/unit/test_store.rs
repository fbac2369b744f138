//! Datastore unit tests

use dockhand::models::ingress::ExposedUrl;
use dockhand::models::project::{Project, ProjectKind};
use dockhand::models::service::{Service, SourceKind};
use dockhand::storage::store::Store;

async fn open_store(dir: &tempfile::TempDir) -> Store {
    Store::open(dir.path().join("store.json")).await.unwrap()
}

#[tokio::test]
async fn test_insert_and_get_project() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let project = store
        .insert_project(Project::new("my-app", ProjectKind::Standard))
        .await
        .unwrap();

    let fetched = store.get_project(&project.id).await.unwrap();
    assert_eq!(fetched.name, "my-app");
    assert_eq!(fetched.kind, ProjectKind::Standard);
    assert!(store.get_project("nope").await.is_err());
}

#[tokio::test]
async fn test_duplicate_service_name_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let project = store
        .insert_project(Project::new("p", ProjectKind::Standard))
        .await
        .unwrap();

    store
        .insert_service(Service::new(&project.id, "web", SourceKind::Image))
        .await
        .unwrap();
    let result = store
        .insert_service(Service::new(&project.id, "web", SourceKind::Github))
        .await;
    assert!(result.is_err());

    // Same name in another project is fine.
    let other = store
        .insert_project(Project::new("q", ProjectKind::Standard))
        .await
        .unwrap();
    assert!(store
        .insert_service(Service::new(&other.id, "web", SourceKind::Image))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_delete_project_cascades() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let project = store
        .insert_project(Project::new("p", ProjectKind::Standard))
        .await
        .unwrap();
    let service = store
        .insert_service(Service::new(&project.id, "web", SourceKind::Image))
        .await
        .unwrap();
    store
        .set_env_variable(&service.id, "KEY", "value")
        .await
        .unwrap();
    store
        .insert_exposed_url(ExposedUrl::new("app", "example.com", 3000, &service.id))
        .await
        .unwrap();

    store.delete_project_records(&project.id).await.unwrap();

    assert!(store.get_project(&project.id).await.is_err());
    assert!(store.get_service(&service.id).await.is_err());
    assert!(store.env_for_service(&service.id).await.is_empty());
    assert!(store
        .find_exposed_url_by_hostname("app.example.com")
        .await
        .is_none());
}

#[tokio::test]
async fn test_upsert_service_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let project = store
        .insert_project(Project::new("stack", ProjectKind::Compose))
        .await
        .unwrap();

    let created = store
        .upsert_service_by_name(
            &project.id,
            "db",
            || Service::new(&project.id, "db", SourceKind::ComposeRaw),
            |s| s.container_id = Some("abc123".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(created.container_id.as_deref(), Some("abc123"));

    // Second upsert mutates the same record instead of duplicating.
    let updated = store
        .upsert_service_by_name(
            &project.id,
            "db",
            || Service::new(&project.id, "db", SourceKind::ComposeRaw),
            |s| s.container_id = Some("def456".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.container_id.as_deref(), Some("def456"));
    assert_eq!(store.list_services_for_project(&project.id).await.len(), 1);
}

#[tokio::test]
async fn test_env_variable_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let project = store
        .insert_project(Project::new("p", ProjectKind::Standard))
        .await
        .unwrap();
    let service = store
        .insert_service(Service::new(&project.id, "web", SourceKind::Image))
        .await
        .unwrap();

    store.set_env_variable(&service.id, "PORT", "80").await.unwrap();
    store.set_env_variable(&service.id, "PORT", "8080").await.unwrap();

    let env = store.env_for_service(&service.id).await;
    assert_eq!(env.len(), 1);
    assert_eq!(env[0].value, "8080");
}

#[tokio::test]
async fn test_duplicate_hostname_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let project = store
        .insert_project(Project::new("p", ProjectKind::Standard))
        .await
        .unwrap();
    let service = store
        .insert_service(Service::new(&project.id, "web", SourceKind::Image))
        .await
        .unwrap();

    store
        .insert_exposed_url(ExposedUrl::new("app", "example.com", 3000, &service.id))
        .await
        .unwrap();
    let result = store
        .insert_exposed_url(ExposedUrl::new("app", "example.com", 8080, &service.id))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_reopen_preserves_data() {
    let dir = tempfile::tempdir().unwrap();

    let project_id = {
        let store = open_store(&dir).await;
        let project = store
            .insert_project(Project::new("persisted", ProjectKind::Standard))
            .await
            .unwrap();
        project.id
    };

    let reopened = open_store(&dir).await;
    let project = reopened.get_project(&project_id).await.unwrap();
    assert_eq!(project.name, "persisted");
}
