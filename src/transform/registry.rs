//! Append-only registry of default variables

use crate::config::DefaultsPrefix;
use crate::output::schema::{DefaultValue, DefaultVariable};
use crate::transform::normalize::{file_name_id, normalize_key};
use crate::transform::secrets::SecretTemplater;
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Service recorded for role-wide aggregate variables
pub const AGGREGATE_SERVICE: &str = "None";

/// Everything the registry accumulated, handed to the output assembler
#[derive(Debug, Clone, Default)]
pub struct RegistryOutput {
    pub defaults: Vec<DefaultVariable>,
    pub services_by_env: IndexMap<String, Vec<String>>,
    pub env_files: IndexMap<String, String>,
    pub suppressed_duplicates: usize,
}

/// First-write-wins collection of [`DefaultVariable`] records.
///
/// A source key is recorded once. Later registrations of the same key, or of a
/// key that normalizes to an already recorded variable name, only add the
/// service to `services_by_env` and bump the suppressed counter.
pub struct VariableRegistry {
    prefix: DefaultsPrefix,
    secrets: SecretTemplater,
    records: Vec<DefaultVariable>,
    by_source: HashMap<String, usize>,
    by_key: HashMap<String, usize>,
    services_by_env: IndexMap<String, Vec<String>>,
    env_files: IndexMap<String, String>,
    suppressed: usize,
}

impl VariableRegistry {
    pub fn new(prefix: DefaultsPrefix, secrets: SecretTemplater) -> Self {
        Self {
            prefix,
            secrets,
            records: Vec::new(),
            by_source: HashMap::new(),
            by_key: HashMap::new(),
            services_by_env: IndexMap::new(),
            env_files: IndexMap::new(),
            suppressed: 0,
        }
    }

    /// Prefixed, normalized variable name for a source key
    pub fn variable_name(&self, source_key: &str) -> String {
        format!("{}{}", self.prefix, normalize_key(source_key))
    }

    /// Records a variable unless `source_key` was seen before.
    ///
    /// Returns whether a new record was added.
    pub fn register(
        &mut self,
        source_key: &str,
        value: DefaultValue,
        service: &str,
        is_secret: bool,
        env_file: Option<&str>,
    ) -> bool {
        let owners = self
            .services_by_env
            .entry(source_key.to_string())
            .or_default();
        if !owners.iter().any(|s| s == service) {
            owners.push(service.to_string());
        }

        if self.by_source.contains_key(source_key) {
            debug!(key = source_key, service, "Variable already registered, skipping");
            self.suppressed += 1;
            return false;
        }

        let key = self.variable_name(source_key);
        if let Some(&existing) = self.by_key.get(&key) {
            warn!(
                key = %key,
                source_key,
                service,
                "Variable name already taken by another key, skipping"
            );
            self.by_source.insert(source_key.to_string(), existing);
            self.suppressed += 1;
            return false;
        }

        let secret = is_secret.then(|| self.secrets.secret_ref(service, source_key, &value.as_text()));
        if let Some(file) = env_file {
            self.env_files
                .entry(file.to_string())
                .or_insert_with(|| file_name_id(file));
        }

        let record = DefaultVariable {
            key: key.clone(),
            original_key: Some(source_key.to_string()),
            value,
            is_secret,
            service: service.to_string(),
            secret_path: secret.as_ref().map(|s| s.path.clone()),
            secret_expr: secret.map(|s| s.expr),
            env_file: env_file.map(str::to_string),
        };
        self.push(source_key, key, record);
        true
    }

    /// Records a role-wide variable owned by no single service
    pub fn register_aggregate(&mut self, name: &str, value: DefaultValue) -> bool {
        if self.by_source.contains_key(name) {
            self.suppressed += 1;
            return false;
        }

        let key = self.variable_name(name);
        if self.by_key.contains_key(&key) {
            warn!(key = %key, "Aggregate variable name already taken, skipping");
            self.suppressed += 1;
            return false;
        }

        let record = DefaultVariable {
            key: key.clone(),
            original_key: None,
            value,
            is_secret: false,
            service: AGGREGATE_SERVICE.to_string(),
            secret_path: None,
            secret_expr: None,
            env_file: None,
        };
        self.push(name, key, record);
        true
    }

    fn push(&mut self, source_key: &str, key: String, record: DefaultVariable) {
        let idx = self.records.len();
        self.records.push(record);
        self.by_source.insert(source_key.to_string(), idx);
        self.by_key.insert(key, idx);
    }

    /// Record a source key resolves to, if any
    pub fn lookup(&self, source_key: &str) -> Option<&DefaultVariable> {
        self.by_source
            .get(source_key)
            .and_then(|&idx| self.records.get(idx))
    }

    pub fn records(&self) -> &[DefaultVariable] {
        &self.records
    }

    pub fn suppressed_duplicates(&self) -> usize {
        self.suppressed
    }

    pub fn into_output(self) -> RegistryOutput {
        RegistryOutput {
            defaults: self.records,
            services_by_env: self.services_by_env,
            env_files: self.env_files,
            suppressed_duplicates: self.suppressed,
        }
    }
}
