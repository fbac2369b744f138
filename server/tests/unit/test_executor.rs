//! Deployer unit tests: rebuild guards, record resilience, and
//! per-scope write ordering

use std::sync::Arc;
use std::time::Duration;

use dockhand::app::locks::ScopeLocks;
use dockhand::deploy::executor::Deployer;
use dockhand::deploy::status::ServiceStatus;
use dockhand::models::project::{Project, ProjectKind};
use dockhand::models::service::{Service, SourceKind};
use dockhand::storage::build_logs::BuildLogs;
use dockhand::storage::layout::StorageLayout;
use dockhand::storage::settings::SettingsStore;
use dockhand::storage::store::Store;

struct Fixture {
    _dir: tempfile::TempDir,
    store: Arc<Store>,
    locks: Arc<ScopeLocks>,
    deployer: Arc<Deployer>,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(dir.path());
    layout.setup().await.unwrap();
    let store = Arc::new(Store::open(layout.store_file()).await.unwrap());
    let settings = Arc::new(SettingsStore::new(layout.settings_file()));
    let logs = BuildLogs::new(layout.logs_dir());
    let locks = Arc::new(ScopeLocks::new());
    let deployer = Arc::new(Deployer::new(
        store.clone(),
        settings,
        layout,
        logs,
        locks.clone(),
    ));
    Fixture {
        _dir: dir,
        store,
        locks,
        deployer,
    }
}

async fn seed_stack_member(fx: &Fixture, project_id: &str) -> Service {
    let mut member = Service::new(project_id, "web", SourceKind::ComposeRaw);
    member.compose_managed = true;
    member.status = ServiceStatus::Running;
    member.container_id = Some("abc123def456".to_string());
    fx.store.insert_service(member).await.unwrap()
}

#[tokio::test]
async fn test_rebuild_of_stack_managed_service_is_rejected() {
    let fx = fixture().await;
    let project = fx
        .store
        .insert_project(Project::new("stack", ProjectKind::Compose))
        .await
        .unwrap();
    let member = seed_stack_member(&fx, &project.id).await;

    let result = fx.deployer.deploy_service(&member.id).await;
    assert!(result.is_err());

    // A healthy stack member keeps its status; the rejection happens
    // before any Building or Error transition is written.
    let after = fx.store.get_service(&member.id).await.unwrap();
    assert_eq!(after.status, ServiceStatus::Running);
    assert_eq!(after.container_id.as_deref(), Some("abc123def456"));
}

#[tokio::test]
async fn test_delete_service_with_vanished_container() {
    let fx = fixture().await;
    let project = fx
        .store
        .insert_project(Project::new("p", ProjectKind::Standard))
        .await
        .unwrap();
    let mut service = Service::new(&project.id, "web", SourceKind::Image);
    service.status = ServiceStatus::Running;
    // Points at a container the runtime no longer knows about.
    service.container_id = Some("0123456789ab".to_string());
    let service = fx.store.insert_service(service).await.unwrap();
    fx.store
        .set_env_variable(&service.id, "PORT", "80")
        .await
        .unwrap();

    fx.deployer.delete_service(&service.id).await.unwrap();

    assert!(fx.store.get_service(&service.id).await.is_err());
    assert!(fx.store.env_for_service(&service.id).await.is_empty());
}

#[tokio::test]
async fn test_concurrent_rebuild_and_down_both_complete() {
    let fx = fixture().await;
    let project = fx
        .store
        .insert_project(Project::new("stack", ProjectKind::Compose))
        .await
        .unwrap();
    // Nested compose path keeps the working directory nonexistent, so
    // both operations fail fast without a container runtime.
    fx.store
        .update_project(&project.id, |p| {
            p.git_compose_path = Some("nested/docker-compose.yml".to_string());
        })
        .await
        .unwrap();
    let member = seed_stack_member(&fx, &project.id).await;

    let rebuild = {
        let deployer = fx.deployer.clone();
        let id = project.id.clone();
        tokio::spawn(async move { deployer.compose_rebuild(&id).await })
    };
    let down = {
        let deployer = fx.deployer.clone();
        let id = project.id.clone();
        tokio::spawn(async move { deployer.compose_lifecycle(&id, "down").await })
    };

    let rebuild = rebuild.await.unwrap();
    let down = down.await.unwrap();

    // Neither operation wedges the other; both fail cleanly (no
    // manifest recorded, no working directory) and the records are
    // left exactly as they were.
    assert!(rebuild.is_err());
    assert!(down.is_err());
    let after = fx.store.get_service(&member.id).await.unwrap();
    assert_eq!(after.status, ServiceStatus::Running);
    assert!(fx.store.get_project(&project.id).await.is_ok());
}

#[tokio::test]
async fn test_last_completed_stack_writer_wins() {
    let fx = fixture().await;
    let project = fx
        .store
        .insert_project(Project::new("stack", ProjectKind::Compose))
        .await
        .unwrap();
    let member = seed_stack_member(&fx, &project.id).await;

    let (started_tx, started_rx) = tokio::sync::oneshot::channel();
    let first = {
        let locks = fx.locks.clone();
        let store = fx.store.clone();
        let project_id = project.id.clone();
        let service_id = member.id.clone();
        tokio::spawn(async move {
            let _guard = locks.acquire(&project_id).await;
            started_tx.send(()).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            store
                .update_service(&service_id, |s| s.status = ServiceStatus::Running)
                .await
                .unwrap();
        })
    };
    // Queue behind the holder; this write must land second.
    started_rx.await.unwrap();
    let second = {
        let locks = fx.locks.clone();
        let store = fx.store.clone();
        let project_id = project.id.clone();
        let service_id = member.id.clone();
        tokio::spawn(async move {
            let _guard = locks.acquire(&project_id).await;
            store
                .update_service(&service_id, |s| s.status = ServiceStatus::Stopped)
                .await
                .unwrap();
        })
    };

    first.await.unwrap();
    second.await.unwrap();

    let after = fx.store.get_service(&member.id).await.unwrap();
    assert_eq!(after.status, ServiceStatus::Stopped);
}
