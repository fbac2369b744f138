//! Template resolution engine
//!
//! Blueprint templates ship a `template.toml` describing variables, env
//! vars and domain bindings. The dialect is a TOML subset (tables,
//! array-of-tables, scalars, arrays, inline tables) and the input is
//! untrusted, so parsing degrades to empty structures instead of
//! erroring. Placeholders like `${password:24}` resolve to fresh
//! secrets on every run.

use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate, Utc};

use crate::utils;

/// Parsed value in the template dialect
#[derive(Debug, Clone, PartialEq)]
pub enum TomlValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<TomlValue>),
    Table(Table),
}

/// Insertion-ordered key/value table. Declaration order matters for
/// variable resolution, so this is not a map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    entries: Vec<(String, TomlValue)>,
}

impl Table {
    pub fn get(&self, key: &str) -> Option<&TomlValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut TomlValue> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: String, value: TomlValue) {
        if let Some(slot) = self.get_mut(&key) {
            *slot = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TomlValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Descend, creating intermediate tables as needed
    fn table_mut(&mut self, path: &[&str]) -> &mut Table {
        let mut current = self;
        for part in path {
            if !matches!(current.get(part), Some(TomlValue::Table(_))) {
                current.insert(part.to_string(), TomlValue::Table(Table::default()));
            }
            current = match current.get_mut(part) {
                Some(TomlValue::Table(t)) => t,
                _ => unreachable!(),
            };
        }
        current
    }
}

impl TomlValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TomlValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            TomlValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Scalar rendered the way it would appear in an env value
    fn render(&self) -> String {
        match self {
            TomlValue::String(s) => s.clone(),
            TomlValue::Integer(i) => i.to_string(),
            TomlValue::Float(f) => f.to_string(),
            TomlValue::Bool(b) => b.to_string(),
            TomlValue::Array(_) | TomlValue::Table(_) => String::new(),
        }
    }
}

/// Parse template dialect text into a table tree. Unparseable lines
/// are skipped.
pub fn parse_template_toml(content: &str) -> Table {
    let mut root = Table::default();
    // Path of the section the cursor is in; true when it names the
    // newest element of an array-of-tables.
    let mut section_path: Vec<String> = Vec::new();
    let mut in_array_table = false;

    let mut lines = content.lines();
    while let Some(raw_line) = lines.next() {
        let mut line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(idx) = find_inline_comment(line) {
            line = line[..idx].trim();
        }
        if line.is_empty() {
            continue;
        }

        if let Some(inner) = line
            .strip_prefix("[[")
            .and_then(|rest| rest.strip_suffix("]]"))
        {
            let parts: Vec<&str> = inner.split('.').collect();
            let (last, parents) = match parts.split_last() {
                Some(split) => split,
                None => continue,
            };
            let parent = root.table_mut(parents);
            if !matches!(parent.get(last), Some(TomlValue::Array(_))) {
                parent.insert(last.to_string(), TomlValue::Array(Vec::new()));
            }
            if let Some(TomlValue::Array(items)) = parent.get_mut(last) {
                items.push(TomlValue::Table(Table::default()));
            }
            section_path = parts.iter().map(|p| p.to_string()).collect();
            in_array_table = true;
            continue;
        }

        if let Some(inner) = line
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            let parts: Vec<String> = inner.split('.').map(str::to_string).collect();
            let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
            root.table_mut(&refs);
            section_path = parts;
            in_array_table = false;
            continue;
        }

        if let Some((key, raw_value)) = line.split_once('=') {
            let key = key.trim();
            if key.is_empty()
                || !key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                continue;
            }
            // Arrays and inline tables may continue on following lines;
            // accumulate until brackets balance outside string literals.
            let mut value_text = raw_value.trim().to_string();
            let mut depth = bracket_depth(&value_text);
            while depth > 0 {
                let Some(next) = lines.next() else { break };
                let mut next = next.trim();
                if let Some(idx) = find_inline_comment(next) {
                    next = next[..idx].trim();
                }
                if !next.is_empty() {
                    if !value_text.is_empty() {
                        value_text.push(' ');
                    }
                    value_text.push_str(next);
                }
                depth = bracket_depth(&value_text);
            }
            if depth != 0 {
                // Unbalanced to end of input; skip like any other bad line.
                continue;
            }

            let value = parse_value(&value_text);
            if let Some(section) = current_section(&mut root, &section_path, in_array_table) {
                section.insert(key.to_string(), value);
            }
        }
    }

    root
}

/// Net `[`/`{` nesting depth of `text`, ignoring brackets inside
/// string literals
fn bracket_depth(text: &str) -> i32 {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut quote = ' ';
    for ch in text.chars() {
        if in_string {
            if ch == quote {
                in_string = false;
            }
        } else if ch == '"' || ch == '\'' {
            in_string = true;
            quote = ch;
        } else if ch == '[' || ch == '{' {
            depth += 1;
        } else if ch == ']' || ch == '}' {
            depth -= 1;
        }
    }
    depth
}

fn current_section<'a>(
    root: &'a mut Table,
    path: &[String],
    in_array_table: bool,
) -> Option<&'a mut Table> {
    if path.is_empty() {
        return Some(root);
    }
    if in_array_table {
        let (last, parents) = path.split_last()?;
        let refs: Vec<&str> = parents.iter().map(String::as_str).collect();
        let parent = root.table_mut(&refs);
        match parent.get_mut(last) {
            Some(TomlValue::Array(items)) => match items.last_mut() {
                Some(TomlValue::Table(t)) => Some(t),
                _ => None,
            },
            _ => None,
        }
    } else {
        let refs: Vec<&str> = path.iter().map(String::as_str).collect();
        Some(root.table_mut(&refs))
    }
}

/// Index of a `#` comment that is not inside a string literal
fn find_inline_comment(line: &str) -> Option<usize> {
    let mut in_string = false;
    let mut quote = ' ';
    for (i, ch) in line.char_indices() {
        if in_string {
            if ch == quote {
                in_string = false;
            }
        } else if ch == '"' || ch == '\'' {
            in_string = true;
            quote = ch;
        } else if ch == '#' {
            return Some(i);
        }
    }
    None
}

fn parse_value(raw: &str) -> TomlValue {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        let inner = &raw[1..raw.len() - 1];
        return TomlValue::String(inner.replace("\\\"", "\"").replace("\\n", "\n"));
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return TomlValue::String(raw[1..raw.len() - 1].to_string());
    }

    // Underscore digit separators, e.g. 3_000
    let cleaned = raw.replace('_', "");
    if let Ok(i) = cleaned.parse::<i64>() {
        return TomlValue::Integer(i);
    }
    if cleaned.contains('.') {
        if let Ok(f) = cleaned.parse::<f64>() {
            return TomlValue::Float(f);
        }
    }

    match raw {
        "true" => return TomlValue::Bool(true),
        "false" => return TomlValue::Bool(false),
        _ => {}
    }

    if raw.starts_with('[') && raw.ends_with(']') {
        return TomlValue::Array(parse_array(raw));
    }
    if raw.starts_with('{') && raw.ends_with('}') {
        return TomlValue::Table(parse_inline_table(raw));
    }

    TomlValue::String(raw.to_string())
}

fn parse_array(raw: &str) -> Vec<TomlValue> {
    let inner = raw[1..raw.len() - 1].trim();
    if inner.is_empty() {
        return Vec::new();
    }

    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0u32;
    let mut in_string = false;
    let mut quote = ' ';

    for ch in inner.chars() {
        if in_string {
            current.push(ch);
            if ch == quote {
                in_string = false;
            }
        } else if ch == '"' || ch == '\'' {
            in_string = true;
            quote = ch;
            current.push(ch);
        } else if ch == '[' || ch == '{' {
            depth += 1;
            current.push(ch);
        } else if ch == ']' || ch == '}' {
            depth = depth.saturating_sub(1);
            current.push(ch);
        } else if ch == ',' && depth == 0 {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                items.push(parse_value(trimmed));
            }
            current.clear();
        } else {
            current.push(ch);
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        items.push(parse_value(trimmed));
    }

    items
}

fn parse_inline_table(raw: &str) -> Table {
    let inner = raw[1..raw.len() - 1].trim();
    let mut table = Table::default();
    for pair in inner.split(',') {
        if let Some((key, value)) = pair.split_once('=') {
            table.insert(key.trim().to_string(), parse_value(value.trim()));
        }
    }
    table
}

// ── Placeholder resolution ───────────────────────────────────────────

/// One hostname binding declared by a template
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDomain {
    pub service_name: String,
    pub port: u16,
    pub host: String,
    pub path: Option<String>,
}

/// Env vars and domain bindings with every placeholder resolved
#[derive(Debug, Clone, Default)]
pub struct ResolvedTemplate {
    pub env_vars: Vec<(String, String)>,
    pub domains: Vec<TemplateDomain>,
}

/// Resolve a template's `variables` and `config` sections.
///
/// Variables resolve in declaration order, each seeing the ones
/// declared before it. `config.env` and `config.domains` then resolve
/// against the finished variable table.
pub fn resolve_template(
    toml_content: &str,
    default_domain: Option<&str>,
    template_id: Option<&str>,
) -> ResolvedTemplate {
    let parsed = parse_template_toml(toml_content);

    let auto_domain = match (default_domain, template_id) {
        (Some(domain), Some(id)) => format!("{}.{}", id, domain),
        _ => "localhost".to_string(),
    };

    let mut variables: Vec<(String, String)> = Vec::new();
    if let Some(TomlValue::Table(decls)) = parsed.get("variables") {
        for (key, raw) in decls.iter() {
            let resolved = substitute(&raw.render(), &auto_domain, &variables);
            variables.push((key.to_string(), resolved));
        }
    }

    let mut env_vars: Vec<(String, String)> = Vec::new();
    let mut domains: Vec<TemplateDomain> = Vec::new();

    if let Some(TomlValue::Table(config)) = parsed.get("config") {
        match config.get("env") {
            Some(TomlValue::Array(items)) => {
                for item in items {
                    if let Some((key, value)) = item.render().split_once('=') {
                        env_vars.push((
                            key.to_string(),
                            substitute(value, &auto_domain, &variables),
                        ));
                    }
                }
            }
            Some(TomlValue::Table(map)) => {
                for (key, value) in map.iter() {
                    env_vars.push((
                        key.to_string(),
                        substitute(&value.render(), &auto_domain, &variables),
                    ));
                }
            }
            _ => {}
        }

        if let Some(TomlValue::Array(items)) = config.get("domains") {
            for item in items {
                let TomlValue::Table(entry) = item else {
                    continue;
                };
                let port = match entry.get("port") {
                    Some(TomlValue::Integer(i)) => u16::try_from(*i).unwrap_or(0),
                    Some(TomlValue::String(s)) => s.parse().unwrap_or(0),
                    _ => 0,
                };
                domains.push(TemplateDomain {
                    service_name: entry
                        .get("serviceName")
                        .and_then(TomlValue::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    port,
                    host: substitute(
                        entry.get("host").and_then(TomlValue::as_str).unwrap_or(""),
                        &auto_domain,
                        &variables,
                    ),
                    path: entry
                        .get("path")
                        .and_then(TomlValue::as_str)
                        .map(str::to_string),
                });
            }
        }
    }

    ResolvedTemplate { env_vars, domains }
}

/// Replace every `${...}` placeholder in `value`
fn substitute(value: &str, auto_domain: &str, variables: &[(String, String)]) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let expr = after[..end].trim();
                match resolve_placeholder(expr, auto_domain, variables) {
                    Some(resolved) => out.push_str(&resolved),
                    // Unknown placeholders survive verbatim
                    None => {
                        let _ = write!(out, "${{{}}}", &after[..end]);
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_placeholder(
    expr: &str,
    auto_domain: &str,
    variables: &[(String, String)],
) -> Option<String> {
    match expr {
        "domain" => return Some(auto_domain.to_string()),
        "uuid" => return Some(utils::generate_uuid()),
        "randomPort" => return Some(utils::random_port().to_string()),
        "email" => return Some("admin@example.com".to_string()),
        "username" => return Some("admin".to_string()),
        "timestamp" => return Some(Utc::now().timestamp().to_string()),
        _ => {}
    }

    if let Some(n) = parse_sized(expr, "password:") {
        return Some(utils::random_alphanumeric(n));
    }
    if let Some(n) = parse_sized(expr, "hash:") {
        return Some(utils::random_hex(n));
    }
    if let Some(n) = parse_sized(expr, "base64:") {
        return Some(utils::random_base64(n));
    }
    if let Some(date) = expr.strip_prefix("timestamps:") {
        return parse_date(date).map(|dt| dt.timestamp().to_string());
    }
    if let Some(date) = expr.strip_prefix("timestampms:") {
        return parse_date(date).map(|dt| dt.timestamp_millis().to_string());
    }

    variables
        .iter()
        .find(|(k, _)| k == expr)
        .map(|(_, v)| v.clone())
}

fn parse_sized(expr: &str, prefix: &str) -> Option<usize> {
    expr.strip_prefix(prefix)?.parse().ok()
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# blog stack
[variables]
db_pass = "${password:16}"
app_key = "${hash:32}"
main_domain = "${domain}"

[config]
env = [
  "DB_PASSWORD=${db_pass}",   # secret
  "APP_KEY=${app_key}",
  "APP_URL=https://${main_domain}",
]

[[config.domains]]
serviceName = "web"
port = 8080
host = "${domain}"

[[config.domains]]
serviceName = "api"
port = 3_000
host = "api.${domain}"
path = "/v1"
"#;

    #[test]
    fn test_parse_sections_and_arrays() {
        let parsed = parse_template_toml(SAMPLE);
        let Some(TomlValue::Table(config)) = parsed.get("config") else {
            panic!("missing config table");
        };
        let Some(TomlValue::Array(domains)) = config.get("domains") else {
            panic!("missing domains array");
        };
        assert_eq!(domains.len(), 2);
        let Some(TomlValue::Array(env)) = config.get("env") else {
            panic!("missing env array");
        };
        assert_eq!(env.len(), 3);
    }

    #[test]
    fn test_multi_line_array_accumulates() {
        let toml = "[config]\nenv = [   # vars\n  \"A=1\",\n  \"B=[not nesting]\",\n]\nready = true";
        let parsed = parse_template_toml(toml);
        let Some(TomlValue::Table(config)) = parsed.get("config") else {
            panic!("missing config table");
        };
        let Some(TomlValue::Array(env)) = config.get("env") else {
            panic!("missing env array");
        };
        assert_eq!(env.len(), 2);
        assert_eq!(env[1].as_str(), Some("B=[not nesting]"));
        // Parsing resumes on the line after the closing bracket.
        assert_eq!(config.get("ready"), Some(&TomlValue::Bool(true)));
    }

    #[test]
    fn test_underscore_numbers_and_inline_comments() {
        let parsed = parse_template_toml("[a]\nport = 3_000 # default\nname = \"x # y\"");
        let Some(TomlValue::Table(a)) = parsed.get("a") else {
            panic!("missing table");
        };
        assert_eq!(a.get("port").and_then(TomlValue::as_integer), Some(3000));
        assert_eq!(a.get("name").and_then(TomlValue::as_str), Some("x # y"));
    }

    #[test]
    fn test_resolution_with_domain() {
        let resolved = resolve_template(SAMPLE, Some("example.com"), Some("blog"));
        let env: std::collections::HashMap<_, _> =
            resolved.env_vars.iter().cloned().collect();
        assert_eq!(env["APP_URL"], "https://blog.example.com");
        assert_eq!(env["DB_PASSWORD"].len(), 16);
        assert_eq!(env["APP_KEY"].len(), 32);
        assert_eq!(resolved.domains[0].host, "blog.example.com");
        assert_eq!(resolved.domains[1].host, "api.blog.example.com");
        assert_eq!(resolved.domains[1].port, 3000);
        assert_eq!(resolved.domains[1].path.as_deref(), Some("/v1"));
    }

    #[test]
    fn test_domain_defaults_to_localhost() {
        let resolved = resolve_template(SAMPLE, None, Some("blog"));
        assert_eq!(resolved.domains[0].host, "localhost");
    }

    #[test]
    fn test_secrets_are_distinct_across_runs() {
        let a = resolve_template(SAMPLE, None, None);
        let b = resolve_template(SAMPLE, None, None);
        let pick = |r: &ResolvedTemplate| {
            r.env_vars
                .iter()
                .find(|(k, _)| k == "DB_PASSWORD")
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_ne!(pick(&a), pick(&b));
    }

    #[test]
    fn test_unknown_placeholder_survives() {
        let resolved = resolve_template(
            "[config]\nenv = [\"X=${no_such_thing}\"]",
            None,
            None,
        );
        assert_eq!(resolved.env_vars[0].1, "${no_such_thing}");
    }

    #[test]
    fn test_variables_resolve_in_order() {
        let toml = r#"
[variables]
base = "svc"
full = "${base}.internal"

[config]
env = ["HOST=${full}"]
"#;
        let resolved = resolve_template(toml, None, None);
        assert_eq!(resolved.env_vars[0].1, "svc.internal");
    }
}
