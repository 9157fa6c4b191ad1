//! Output document schema
//!
//! This module defines the single document a run produces: the default variable
//! records, the side tables gathered while walking the services, the rewritten
//! descriptor, and the configuration the run used.

use anyhow::{Context, Result};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

/// Value of a default variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    /// Published host port
    Port(u16),
    /// Env var value or host path
    Text(String),
    /// Aggregate mapping, e.g. service name to image tag
    Map(IndexMap<String, String>),
}

impl DefaultValue {
    /// Textual form, used to size generated secrets
    pub fn as_text(&self) -> String {
        match self {
            DefaultValue::Port(port) => port.to_string(),
            DefaultValue::Text(text) => text.clone(),
            DefaultValue::Map(map) => serde_json::to_string(map).unwrap_or_default(),
        }
    }
}

/// One templated default variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultVariable {
    /// Prefixed, normalized variable name
    pub key: String,
    /// Key as found in the descriptor, absent for aggregates
    pub original_key: Option<String>,
    /// First value seen for the key
    pub value: DefaultValue,
    pub is_secret: bool,
    /// Owning service
    pub service: String,
    pub secret_path: Option<String>,
    pub secret_expr: Option<String>,
    /// Env file the key was declared in
    pub env_file: Option<String>,
}

/// Database engines recognized in image names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Mariadb,
    Postgres,
    Redis,
}

impl DatabaseKind {
    pub fn detect(repo: &str) -> Option<Self> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| Regex::new(r"(mariadb|postgres|redis)").expect("valid regex"));
        match re.captures(repo)?.get(1)?.as_str() {
            "mariadb" => Some(DatabaseKind::Mariadb),
            "postgres" => Some(DatabaseKind::Postgres),
            "redis" => Some(DatabaseKind::Redis),
            _ => None,
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatabaseKind::Mariadb => "mariadb",
            DatabaseKind::Postgres => "postgres",
            DatabaseKind::Redis => "redis",
        };
        f.write_str(name)
    }
}

/// Tag of an image and the service running it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTag {
    pub service: String,
    pub tag: String,
    pub kind: Option<DatabaseKind>,
}

/// The exported result of a run. Every field is always serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDocument {
    pub role_name: String,
    pub defaults: Vec<DefaultVariable>,
    pub secret_provider: String,
    pub defaults_prefix: String,
    pub secret_string_template: String,
    pub min_secret_length: usize,
    pub compose_files: Vec<String>,
    /// Canonical descriptor as emitted by the compose tool
    pub compose_config: serde_json::Value,
    /// Original descriptor before placeholders were substituted
    pub original_compose: serde_yaml::Value,
    /// Original descriptor with placeholders substituted
    pub final_compose: serde_yaml::Value,
    pub services_by_env: IndexMap<String, Vec<String>>,
    pub suppressed_duplicates: usize,
    pub proxy_container: Option<String>,
    pub backup_paths: Vec<String>,
    pub exposed_ports_by_service: IndexMap<String, Vec<u16>>,
    pub volume_defaults: IndexMap<String, String>,
    pub images_tags: IndexMap<String, ImageTag>,
    pub external_proxy_net: String,
    pub env_files: IndexMap<String, String>,
    pub uid: Option<u32>,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"))
}

/// Variable names referenced by `{{ name ... }}` expressions in `text`
pub fn placeholder_names(text: &str) -> impl Iterator<Item = &str> {
    placeholder_regex()
        .captures_iter(text)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
}

fn collect_strings<'a>(value: &'a serde_yaml::Value, out: &mut Vec<&'a str>) {
    match value {
        serde_yaml::Value::String(s) => out.push(s),
        serde_yaml::Value::Sequence(items) => {
            for item in items {
                collect_strings(item, out);
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (k, v) in map {
                collect_strings(k, out);
                collect_strings(v, out);
            }
        }
        serde_yaml::Value::Tagged(tagged) => collect_strings(&tagged.value, out),
        _ => {}
    }
}

impl OutputDocument {
    /// Serialize the document to indented JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize output document to JSON")
    }

    /// Serialize the document to YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize output document to YAML")
    }

    /// Placeholders in `final_compose` without a matching default variable
    pub fn unresolved_placeholders(&self) -> Vec<String> {
        let keys: HashSet<&str> = self.defaults.iter().map(|d| d.key.as_str()).collect();
        let mut strings = Vec::new();
        collect_strings(&self.final_compose, &mut strings);

        let mut reported = HashSet::new();
        strings
            .into_iter()
            .flat_map(placeholder_names)
            .filter(|name| !keys.contains(name) && reported.insert(*name))
            .map(str::to_string)
            .collect()
    }

    /// Validate referential consistency of the document
    ///
    /// Checks:
    /// - Default variable keys are unique
    /// - Every placeholder in the rewritten descriptor names a default variable
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for default in &self.defaults {
            if !seen.insert(default.key.as_str()) {
                anyhow::bail!("Duplicate default variable key: {}", default.key);
            }
        }

        let missing = self.unresolved_placeholders();
        if !missing.is_empty() {
            anyhow::bail!(
                "Rewritten descriptor references undefined variables: {}",
                missing.join(", ")
            );
        }

        Ok(())
    }
}
