//! Compose manifest parsing
//!
//! Tolerant by contract: malformed input yields an empty service list,
//! never an error, so callers can treat "no services" as the safe
//! degenerate case.

use std::collections::BTreeMap;

/// One declared sub-service
#[derive(Debug, Clone, Default)]
pub struct ComposeService {
    pub name: String,
    pub image: Option<String>,
    pub build_context: Option<String>,
    pub environment: BTreeMap<String, String>,
    pub ports: Vec<String>,
}

/// Parsed view of a stack manifest
#[derive(Debug, Clone, Default)]
pub struct ParsedCompose {
    pub services: Vec<ComposeService>,
}

/// Parse a compose manifest. Duplicate service keys follow the YAML
/// library's own last-write-wins behavior.
pub fn parse_compose(content: &str) -> ParsedCompose {
    let doc: serde_yaml::Value = match serde_yaml::from_str(content) {
        Ok(doc) => doc,
        Err(_) => return ParsedCompose::default(),
    };

    let Some(services) = doc.get("services").and_then(|s| s.as_mapping()) else {
        return ParsedCompose::default();
    };

    let services = services
        .iter()
        .filter_map(|(key, config)| {
            let name = key.as_str()?.to_string();
            Some(ComposeService {
                name,
                image: config
                    .get("image")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                build_context: parse_build(config.get("build")),
                environment: parse_environment(config.get("environment")),
                ports: parse_ports(config.get("ports")),
            })
        })
        .collect();

    ParsedCompose { services }
}

/// `build` is either a context string or a mapping with `context`
fn parse_build(value: Option<&serde_yaml::Value>) -> Option<String> {
    let value = value?;
    if let Some(context) = value.as_str() {
        return Some(context.to_string());
    }
    value
        .get("context")
        .and_then(|c| c.as_str())
        .map(str::to_string)
}

/// `environment` is either a `KEY: value` mapping or a `KEY=value` list
fn parse_environment(value: Option<&serde_yaml::Value>) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    match value {
        Some(serde_yaml::Value::Mapping(map)) => {
            for (key, val) in map {
                if let Some(key) = key.as_str() {
                    env.insert(key.to_string(), scalar_to_string(val));
                }
            }
        }
        Some(serde_yaml::Value::Sequence(items)) => {
            for item in items {
                if let Some(text) = item.as_str() {
                    if let Some((key, val)) = text.split_once('=') {
                        env.insert(key.to_string(), val.to_string());
                    }
                }
            }
        }
        _ => {}
    }
    env
}

fn parse_ports(value: Option<&serde_yaml::Value>) -> Vec<String> {
    match value {
        Some(serde_yaml::Value::Sequence(items)) => {
            items.iter().map(scalar_to_string).collect()
        }
        _ => Vec::new(),
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_services() {
        let manifest = r#"
services:
  web:
    image: nginx:alpine
    ports:
      - "8080:80"
  db:
    image: postgres:16
    environment:
      POSTGRES_PASSWORD: secret
"#;
        let parsed = parse_compose(manifest);
        assert_eq!(parsed.services.len(), 2);
        assert_eq!(parsed.services[0].name, "web");
        assert_eq!(parsed.services[0].image.as_deref(), Some("nginx:alpine"));
        assert_eq!(parsed.services[1].environment["POSTGRES_PASSWORD"], "secret");
    }

    #[test]
    fn test_malformed_input_yields_empty() {
        assert!(parse_compose("{{{ not yaml").services.is_empty());
        assert!(parse_compose("").services.is_empty());
        assert!(parse_compose("just a string").services.is_empty());
        assert!(parse_compose("services: 42").services.is_empty());
    }

    #[test]
    fn test_build_forms() {
        let manifest = r#"
services:
  a:
    build: ./app
  b:
    build:
      context: ./svc
      dockerfile: Dockerfile.dev
"#;
        let parsed = parse_compose(manifest);
        assert_eq!(parsed.services[0].build_context.as_deref(), Some("./app"));
        assert_eq!(parsed.services[1].build_context.as_deref(), Some("./svc"));
    }

    #[test]
    fn test_environment_list_form() {
        let manifest = r#"
services:
  app:
    image: app:1
    environment:
      - MODE=prod
      - DEBUG=false
"#;
        let parsed = parse_compose(manifest);
        assert_eq!(parsed.services[0].environment["MODE"], "prod");
        assert_eq!(parsed.services[0].environment["DEBUG"], "false");
    }
}
