//! Configuration for a role transformation run
//!
//! The CLI collects raw option values and turns them into a [`RoleConfig`]. The
//! values that carry syntax of their own (the defaults prefix and the secret path
//! template) are newtypes that can only be built through validating constructors,
//! so a `RoleConfig` that exists has already passed those checks.
//!
//! # Example
//!
//! ```
//! use compose_role::config::{DefaultsPrefix, RoleConfig};
//!
//! let config = RoleConfig::new(DefaultsPrefix::parse("myrole").unwrap());
//! assert_eq!(config.defaults_prefix.as_str(), "myrole_");
//! config.validate().expect("defaults are valid");
//! ```

use crate::transform::normalize::normalize_key;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Default values for configuration
pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";
pub const DEFAULT_ROLE_NAME: &str = "docker_";
pub const DEFAULT_SECRET_TEMPLATE: &str = "services/{role_name}/{service_name}/{env_key}";
pub const DEFAULT_MIN_SECRET_LENGTH: usize = 12;
pub const DEFAULT_EXTERNAL_PROXY_NET: &str = "proxy-tier";
pub const DEFAULT_COMPOSE_COMMAND: &str = "docker compose";

/// Fields a secret path template may reference
pub const TEMPLATE_FIELDS: [&str; 3] = ["role_name", "service_name", "env_key"];

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Prefix contains whitespace or hyphens
    #[error("Defaults prefix contains invalid characters: {0:?}")]
    InvalidPrefix(String),

    /// Template references a field outside of TEMPLATE_FIELDS
    #[error("Secret string template {template:?} references unknown field {{{field}}}. Valid fields: role_name, service_name, env_key")]
    UnknownTemplateField { template: String, field: String },

    /// Extra secret pattern is not a valid regular expression
    #[error("Invalid secret pattern {pattern:?}: {source}")]
    InvalidSecretPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

fn template_field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{|\}\}|\{([^{}]*)\}").expect("valid regex"))
}

/// Variable-name prefix, always underscore-terminated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DefaultsPrefix(String);

impl DefaultsPrefix {
    /// Validates a raw prefix and appends the trailing `_` when missing.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        if raw.chars().any(|c| c.is_whitespace() || c == '-') {
            return Err(ConfigError::InvalidPrefix(raw.to_string()));
        }
        if raw.ends_with('_') {
            Ok(Self(raw.to_string()))
        } else {
            Ok(Self(format!("{}_", raw)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DefaultsPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Format string for secret storage paths.
///
/// Uses `{field}` placeholders, with `{{` and `}}` as literal braces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SecretPathTemplate(String);

impl SecretPathTemplate {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        for cap in template_field_regex().captures_iter(raw) {
            if let Some(field) = cap.get(1) {
                if !TEMPLATE_FIELDS.contains(&field.as_str()) {
                    return Err(ConfigError::UnknownTemplateField {
                        template: raw.to_string(),
                        field: field.as_str().to_string(),
                    });
                }
            }
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn render(&self, role_name: &str, service_name: &str, env_key: &str) -> String {
        template_field_regex()
            .replace_all(&self.0, |cap: &regex::Captures<'_>| {
                match (cap.get(0).map(|m| m.as_str()), cap.get(1).map(|m| m.as_str())) {
                    (Some("{{"), _) => "{".to_string(),
                    (Some("}}"), _) => "}".to_string(),
                    (_, Some("role_name")) => role_name.to_string(),
                    (_, Some("service_name")) => service_name.to_string(),
                    (_, Some("env_key")) => env_key.to_string(),
                    (whole, _) => whole.unwrap_or_default().to_string(),
                }
            })
            .into_owned()
    }
}

impl Default for SecretPathTemplate {
    fn default() -> Self {
        Self(DEFAULT_SECRET_TEMPLATE.to_string())
    }
}

/// Secret storage backends a lookup expression can be generated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretProviderKind {
    #[default]
    Passwordstore,
}

impl fmt::Display for SecretProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretProviderKind::Passwordstore => f.write_str("passwordstore"),
        }
    }
}

/// Validated configuration of a single transformation run
#[derive(Debug, Clone)]
pub struct RoleConfig {
    /// Prefix prepended to every generated variable name
    pub defaults_prefix: DefaultsPrefix,

    /// Role name, already normalized
    pub role_name: String,

    /// Backend the secret lookup expressions target
    pub secret_provider: SecretProviderKind,

    /// Template for secret storage paths
    pub secret_path_template: SecretPathTemplate,

    /// Additional unanchored patterns that mark an env key as secret
    pub extra_secret_patterns: Vec<String>,

    /// Lower bound for generated secret lengths
    pub min_secret_length: usize,

    /// Service that joins the external proxy network
    pub proxy_container: Option<String>,

    /// Name of the external proxy network
    pub external_proxy_net: String,

    /// Replaces every digit run of a service `user` field
    pub uid: Option<u32>,
}

impl RoleConfig {
    /// Creates a configuration with defaults for everything but the prefix
    pub fn new(defaults_prefix: DefaultsPrefix) -> Self {
        Self {
            defaults_prefix,
            role_name: normalize_key(DEFAULT_ROLE_NAME),
            secret_provider: SecretProviderKind::default(),
            secret_path_template: SecretPathTemplate::default(),
            extra_secret_patterns: Vec::new(),
            min_secret_length: DEFAULT_MIN_SECRET_LENGTH,
            proxy_container: None,
            external_proxy_net: DEFAULT_EXTERNAL_PROXY_NET.to_string(),
            uid: None,
        }
    }

    /// Sets the role name, normalizing it
    pub fn with_role_name(mut self, role_name: &str) -> Self {
        self.role_name = normalize_key(role_name);
        self
    }

    /// Validates the configuration
    ///
    /// Checks that:
    /// - The minimum secret length is positive
    /// - The external proxy network has a name
    /// - Every extra secret pattern compiles
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_secret_length == 0 {
            return Err(ConfigError::ValidationFailed(
                "min_secret_length must be greater than 0".to_string(),
            ));
        }

        if self.external_proxy_net.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "external proxy network name must not be empty".to_string(),
            ));
        }

        if self.role_name.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "role name must not be empty".to_string(),
            ));
        }

        for pattern in &self.extra_secret_patterns {
            Regex::new(pattern).map_err(|source| ConfigError::InvalidSecretPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }

        Ok(())
    }
}
