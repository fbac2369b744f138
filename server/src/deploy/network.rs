//! Compose manifest network injection
//!
//! Rewrites a stack manifest so every service gets a deterministic
//! container name and joins the shared network alongside the stack's
//! default network. The manifest is patched as a value tree, so fields
//! this module does not know about pass through unchanged.

use serde_yaml::{Mapping, Value};

use crate::docker::SHARED_NETWORK;
use crate::errors::Error;

/// Patch `text` in place for scope `scope_id` and re-serialize.
///
/// Idempotent: running this on its own output changes nothing.
pub fn inject_network(text: &str, scope_id: &str) -> Result<String, Error> {
    let mut doc: Value = serde_yaml::from_str(text)
        .map_err(|e| Error::ValidationError(format!("invalid compose manifest: {}", e)))?;

    let root = match &mut doc {
        Value::Mapping(map) => map,
        _ => {
            return Err(Error::ValidationError(
                "compose manifest is not a mapping".to_string(),
            ))
        }
    };

    ensure_shared_network_decl(root);

    if let Some(Value::Mapping(services)) = root.get_mut("services") {
        // Collect keys first; we mutate the blocks below.
        let names: Vec<String> = services
            .keys()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect();
        for name in names {
            if let Some(Value::Mapping(service)) = services.get_mut(name.as_str()) {
                service.insert(
                    Value::from("container_name"),
                    Value::from(crate::deploy::container_name(scope_id, &name)),
                );
                join_networks(service);
            }
        }
    }

    serde_yaml::to_string(&doc)
        .map_err(|e| Error::Internal(format!("failed to serialize manifest: {}", e)))
}

/// Top-level `networks.dockhand-net: { external: true }`
fn ensure_shared_network_decl(root: &mut Mapping) {
    if !matches!(root.get("networks"), Some(Value::Mapping(_))) {
        root.insert(Value::from("networks"), Value::Mapping(Mapping::new()));
    }
    if let Some(Value::Mapping(networks)) = root.get_mut("networks") {
        let mut decl = Mapping::new();
        decl.insert(Value::from("external"), Value::from(true));
        networks.insert(Value::from(SHARED_NETWORK), Value::Mapping(decl));
    }
}

/// Add the shared and default networks to a service block, keeping
/// whichever of the two declaration forms it already uses.
fn join_networks(service: &mut Mapping) {
    match service.get_mut("networks") {
        Some(Value::Sequence(list)) => {
            for name in [SHARED_NETWORK, "default"] {
                if !list.iter().any(|v| v.as_str() == Some(name)) {
                    list.push(Value::from(name));
                }
            }
        }
        Some(Value::Mapping(map)) => {
            for name in [SHARED_NETWORK, "default"] {
                if !map.contains_key(name) {
                    map.insert(Value::from(name), Value::Null);
                }
            }
        }
        _ => {
            service.insert(
                Value::from("networks"),
                Value::Sequence(vec![Value::from(SHARED_NETWORK), Value::from("default")]),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
services:
  web:
    image: nginx:alpine
    ports:
      - "8080:80"
  worker:
    image: worker:1
    networks:
      - backend
networks:
  backend: {}
"#;

    #[test]
    fn test_injection_adds_names_and_networks() {
        let patched = inject_network(MANIFEST, "p1").unwrap();
        let doc: Value = serde_yaml::from_str(&patched).unwrap();

        let web = &doc["services"]["web"];
        assert_eq!(
            web["container_name"].as_str(),
            Some("dockhand-p1-web")
        );
        let nets: Vec<&str> = web["networks"]
            .as_sequence()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(nets, vec![SHARED_NETWORK, "default"]);

        let worker_nets: Vec<&str> = doc["services"]["worker"]["networks"]
            .as_sequence()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(worker_nets, vec!["backend", SHARED_NETWORK, "default"]);

        assert_eq!(doc["networks"][SHARED_NETWORK]["external"].as_bool(), Some(true));
    }

    #[test]
    fn test_injection_is_idempotent() {
        let once = inject_network(MANIFEST, "p1").unwrap();
        let twice = inject_network(&once, "p1").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unrelated_fields_survive() {
        let patched = inject_network(MANIFEST, "p1").unwrap();
        let doc: Value = serde_yaml::from_str(&patched).unwrap();
        assert_eq!(
            doc["services"]["web"]["ports"][0].as_str(),
            Some("8080:80")
        );
        assert!(doc["networks"]["backend"].is_mapping());
    }

    #[test]
    fn test_mapping_form_networks_kept() {
        let manifest = r#"
services:
  app:
    image: app:1
    networks:
      backend:
        aliases: [app]
"#;
        let patched = inject_network(manifest, "p2").unwrap();
        let doc: Value = serde_yaml::from_str(&patched).unwrap();
        let nets = doc["services"]["app"]["networks"].as_mapping().unwrap();
        assert!(nets.contains_key("backend"));
        assert!(nets.contains_key(SHARED_NETWORK));
        assert!(nets.contains_key("default"));
        assert_eq!(
            doc["services"]["app"]["networks"]["backend"]["aliases"][0].as_str(),
            Some("app")
        );
    }

    #[test]
    fn test_non_mapping_manifest_rejected() {
        assert!(inject_network("- a\n- b", "p1").is_err());
    }
}
