//! Ingress reconciliation tests against an in-memory provider

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use dockhand::deploy::status::ServiceStatus;
use dockhand::errors::Error;
use dockhand::ingress::provider::{
    DnsRecord, DnsRecordSpec, ProviderSource, Tunnel, TunnelProvider, Zone,
};
use dockhand::ingress::{IngressManager, TUNNEL_NAME};
use dockhand::models::ingress::{ExposedUrl, IngressRule};
use dockhand::models::project::{Project, ProjectKind};
use dockhand::models::service::{Service, SourceKind};
use dockhand::storage::settings::SettingsStore;
use dockhand::storage::store::Store;

#[derive(Default)]
struct FakeState {
    tunnel: Option<Tunnel>,
    zones: Vec<Zone>,
    records: Vec<(String, DnsRecord)>,
    remote_rules: Vec<IngressRule>,
    published: Option<Vec<IngressRule>>,
    failing_record_ids: Vec<String>,
    next_record: usize,
}

struct FakeProvider {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl TunnelProvider for FakeProvider {
    async fn find_tunnel(&self, name: &str) -> Result<Option<Tunnel>, Error> {
        let state = self.state.lock().unwrap();
        Ok(state.tunnel.clone().filter(|t| t.name == name))
    }

    async fn create_tunnel(&self, name: &str, _secret_base64: &str) -> Result<Tunnel, Error> {
        let tunnel = Tunnel {
            id: "t-created".to_string(),
            name: name.to_string(),
        };
        self.state.lock().unwrap().tunnel = Some(tunnel.clone());
        Ok(tunnel)
    }

    async fn tunnel_token(&self, _tunnel_id: &str) -> Result<String, Error> {
        Ok("fake-token".to_string())
    }

    async fn read_ingress(&self, _tunnel_id: &str) -> Result<Vec<IngressRule>, Error> {
        Ok(self.state.lock().unwrap().remote_rules.clone())
    }

    async fn replace_ingress(
        &self,
        _tunnel_id: &str,
        rules: &[IngressRule],
    ) -> Result<(), Error> {
        self.state.lock().unwrap().published = Some(rules.to_vec());
        Ok(())
    }

    async fn find_zone(&self, name: &str) -> Result<Option<Zone>, Error> {
        let state = self.state.lock().unwrap();
        Ok(state.zones.iter().find(|z| z.name == name).cloned())
    }

    async fn list_dns_records(
        &self,
        zone_id: &str,
        full_name: &str,
    ) -> Result<Vec<DnsRecord>, Error> {
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .iter()
            .filter(|(z, r)| z == zone_id && r.name == full_name)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn create_dns_record(
        &self,
        zone_id: &str,
        spec: &DnsRecordSpec,
    ) -> Result<DnsRecord, Error> {
        let mut state = self.state.lock().unwrap();
        state.next_record += 1;
        let record = DnsRecord {
            id: format!("rec-{}", state.next_record),
            name: spec.name.clone(),
            content: spec.content.clone(),
            record_type: "CNAME".to_string(),
        };
        state.records.push((zone_id.to_string(), record.clone()));
        Ok(record)
    }

    async fn update_dns_record(
        &self,
        zone_id: &str,
        record_id: &str,
        spec: &DnsRecordSpec,
    ) -> Result<DnsRecord, Error> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .records
            .iter_mut()
            .find(|(z, r)| z == zone_id && r.id == record_id)
            .map(|(_, r)| r)
            .ok_or_else(|| Error::NotFound(format!("dns record {}", record_id)))?;
        record.content = spec.content.clone();
        Ok(record.clone())
    }

    async fn delete_dns_record(&self, zone_id: &str, record_id: &str) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        let before = state.records.len();
        state.records.retain(|(z, r)| !(z == zone_id && r.id == record_id));
        if state.records.len() == before {
            return Err(Error::NotFound(format!("dns record {}", record_id)));
        }
        Ok(())
    }

    async fn get_dns_record(
        &self,
        zone_id: &str,
        record_id: &str,
    ) -> Result<Option<DnsRecord>, Error> {
        let state = self.state.lock().unwrap();
        if state.failing_record_ids.iter().any(|id| id == record_id) {
            return Err(Error::ProviderError("upstream unavailable".to_string()));
        }
        Ok(state
            .records
            .iter()
            .find(|(z, r)| z == zone_id && r.id == record_id)
            .map(|(_, r)| r.clone()))
    }
}

struct FakeSource {
    state: Arc<Mutex<FakeState>>,
    configured: bool,
    connects: AtomicUsize,
}

#[async_trait]
impl ProviderSource for FakeSource {
    async fn connect(&self) -> Result<Arc<dyn TunnelProvider>, Error> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeProvider {
            state: self.state.clone(),
        }))
    }

    async fn configured(&self) -> bool {
        self.configured
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    store: Arc<Store>,
    state: Arc<Mutex<FakeState>>,
    source: Arc<FakeSource>,
    manager: IngressManager,
}

async fn fixture(state: FakeState) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("store.json")).await.unwrap());
    let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")));
    let state = Arc::new(Mutex::new(state));
    let source = Arc::new(FakeSource {
        state: state.clone(),
        configured: true,
        connects: AtomicUsize::new(0),
    });
    let manager = IngressManager::new(store.clone(), settings, source.clone());
    Fixture {
        _dir: dir,
        store,
        state,
        source,
        manager,
    }
}

fn seeded_tunnel() -> FakeState {
    FakeState {
        tunnel: Some(Tunnel {
            id: "t1".to_string(),
            name: TUNNEL_NAME.to_string(),
        }),
        zones: vec![Zone {
            id: "z1".to_string(),
            name: "example.com".to_string(),
        }],
        ..Default::default()
    }
}

async fn seed_service(store: &Store, name: &str) -> Service {
    let project = store
        .insert_project(Project::new("p", ProjectKind::Standard))
        .await
        .unwrap();
    store
        .insert_service(Service::new(&project.id, name, SourceKind::Image))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_expose_provisions_dns_and_publishes_catch_all_last() {
    let fx = fixture(seeded_tunnel()).await;
    let service = seed_service(&fx.store, "web").await;

    let exposed = fx
        .manager
        .expose(&service.id, "app", "example.com", 3000)
        .await
        .unwrap();

    assert_eq!(exposed.full_url, "app.example.com");
    assert_eq!(exposed.tunnel_id.as_deref(), Some("t1"));
    assert!(exposed.dns_record_id.is_some());

    let state = fx.state.lock().unwrap();
    let record = &state.records[0].1;
    assert_eq!(record.content, "t1.cfargotunnel.com");

    let published = state.published.as_ref().unwrap();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].hostname.as_deref(), Some("app.example.com"));
    assert_eq!(
        published[0].service,
        format!("http://{}:3000", service.container_name())
    );
    assert!(published[1].hostname.is_none());
    assert_eq!(published[1].service, "http_status:404");
}

#[tokio::test]
async fn test_duplicate_hostname_rejected_before_provider_call() {
    let fx = fixture(seeded_tunnel()).await;
    let service = seed_service(&fx.store, "web").await;

    fx.manager
        .expose(&service.id, "app", "example.com", 3000)
        .await
        .unwrap();
    let connects_before = fx.source.connects.load(Ordering::SeqCst);

    let result = fx.manager.expose(&service.id, "app", "example.com", 8080).await;
    assert!(result.is_err());
    assert_eq!(fx.source.connects.load(Ordering::SeqCst), connects_before);
}

#[tokio::test]
async fn test_expose_without_tunnel_stays_local_only() {
    let fx = fixture(FakeState::default()).await;
    let service = seed_service(&fx.store, "web").await;

    let exposed = fx
        .manager
        .expose(&service.id, "app", "example.com", 3000)
        .await
        .unwrap();

    assert!(exposed.tunnel_id.is_none());
    assert!(exposed.dns_record_id.is_none());
    assert!(fx
        .store
        .find_exposed_url_by_hostname("app.example.com")
        .await
        .is_some());
}

#[tokio::test]
async fn test_unexpose_survives_already_deleted_dns_record() {
    let fx = fixture(seeded_tunnel()).await;
    let service = seed_service(&fx.store, "web").await;

    let mut exposed = ExposedUrl::new("gone", "example.com", 3000, &service.id);
    exposed.tunnel_id = Some("t1".to_string());
    exposed.dns_record_id = Some("rec-missing".to_string());
    let exposed = fx.store.insert_exposed_url(exposed).await.unwrap();

    fx.manager.unexpose(&exposed.id).await.unwrap();
    assert!(fx.store.get_exposed_url(&exposed.id).await.is_err());
}

#[tokio::test]
async fn test_validate_removes_only_definitively_gone_records() {
    let mut state = seeded_tunnel();
    state.records.push((
        "z1".to_string(),
        DnsRecord {
            id: "rec-live".to_string(),
            name: "live.example.com".to_string(),
            content: "t1.cfargotunnel.com".to_string(),
            record_type: "CNAME".to_string(),
        },
    ));
    state.failing_record_ids.push("rec-flaky".to_string());
    let fx = fixture(state).await;
    let service = seed_service(&fx.store, "web").await;

    let mut live = ExposedUrl::new("live", "example.com", 3000, &service.id);
    live.dns_record_id = Some("rec-live".to_string());
    let live = fx.store.insert_exposed_url(live).await.unwrap();

    let mut orphan = ExposedUrl::new("orphan", "example.com", 3000, &service.id);
    orphan.dns_record_id = Some("rec-gone".to_string());
    let orphan = fx.store.insert_exposed_url(orphan).await.unwrap();

    let mut flaky = ExposedUrl::new("flaky", "example.com", 3000, &service.id);
    flaky.dns_record_id = Some("rec-flaky".to_string());
    let flaky = fx.store.insert_exposed_url(flaky).await.unwrap();

    // No record id means nothing to validate.
    fx.store
        .insert_exposed_url(ExposedUrl::new("imported", "example.com", 3000, &service.id))
        .await
        .unwrap();

    let removed = fx.manager.validate_bindings().await.unwrap();
    assert_eq!(removed, 1);
    assert!(fx.store.get_exposed_url(&live.id).await.is_ok());
    assert!(fx.store.get_exposed_url(&orphan.id).await.is_err());
    assert!(fx.store.get_exposed_url(&flaky.id).await.is_ok());
}

#[tokio::test]
async fn test_validate_removes_binding_when_zone_is_gone() {
    let mut state = seeded_tunnel();
    state.zones.clear();
    let fx = fixture(state).await;
    let service = seed_service(&fx.store, "web").await;

    let mut exposed = ExposedUrl::new("app", "example.com", 3000, &service.id);
    exposed.dns_record_id = Some("rec-1".to_string());
    let exposed = fx.store.insert_exposed_url(exposed).await.unwrap();

    let removed = fx.manager.validate_bindings().await.unwrap();
    assert_eq!(removed, 1);
    assert!(fx.store.get_exposed_url(&exposed.id).await.is_err());
}

#[tokio::test]
async fn test_import_skips_catch_all_tracked_and_short_hostnames() {
    let fx = fixture(seeded_tunnel()).await;
    let service = seed_service(&fx.store, "web").await;
    fx.store
        .update_service(&service.id, |s| s.status = ServiceStatus::Running)
        .await
        .unwrap();

    // Already tracked binding survives untouched.
    fx.store
        .insert_exposed_url(ExposedUrl::new("tracked", "example.com", 3000, &service.id))
        .await
        .unwrap();

    fx.state.lock().unwrap().remote_rules = vec![
        IngressRule::route(
            "app.example.com",
            format!("http://{}:3000", service.container_name()),
        ),
        IngressRule::route("other.example.com", "https://somewhere-else"),
        IngressRule::route("tracked.example.com", "http://x:80"),
        IngressRule::route("bare.com", "http://x:80"),
        IngressRule::catch_all(),
    ];

    let imported = fx.manager.import_bindings().await.unwrap();
    assert_eq!(imported, 2);

    let app = fx
        .store
        .find_exposed_url_by_hostname("app.example.com")
        .await
        .unwrap();
    assert_eq!(app.internal_port, 3000);
    assert_eq!(app.service_id, service.id);
    assert_eq!(app.tunnel_id.as_deref(), Some("t1"));
    assert!(app.dns_record_id.is_none());

    // Unmatched target falls back to the latest running service,
    // https without a port defaults to 443.
    let other = fx
        .store
        .find_exposed_url_by_hostname("other.example.com")
        .await
        .unwrap();
    assert_eq!(other.internal_port, 443);
    assert_eq!(other.service_id, service.id);

    assert!(fx
        .store
        .find_exposed_url_by_hostname("bare.com")
        .await
        .is_none());
}

#[tokio::test]
async fn test_import_skips_everything_when_unconfigured() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("store.json")).await.unwrap());
    let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")));
    let source = Arc::new(FakeSource {
        state: Arc::new(Mutex::new(seeded_tunnel())),
        configured: false,
        connects: AtomicUsize::new(0),
    });
    let manager = IngressManager::new(store, settings, source.clone());

    assert_eq!(manager.import_bindings().await.unwrap(), 0);
    assert_eq!(manager.validate_bindings().await.unwrap(), 0);
    assert_eq!(source.connects.load(Ordering::SeqCst), 0);
}
