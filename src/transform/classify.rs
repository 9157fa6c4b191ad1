//! Secret detection for configuration keys

use crate::config::ConfigError;
use regex::Regex;
use std::sync::OnceLock;

fn default_secret_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(password|secret|token|api_key|db_pass|secret_key)$").expect("valid regex")
    })
}

/// Decides whether a configuration value must be stored as a secret.
///
/// Keys ending in one of the built-in suffixes are secret regardless of case.
/// Extra patterns are matched anywhere in the key, case-sensitively.
#[derive(Debug, Clone, Default)]
pub struct SecretClassifier {
    extra: Option<Regex>,
}

impl SecretClassifier {
    pub fn new(extra_patterns: &[String]) -> Result<Self, ConfigError> {
        if extra_patterns.is_empty() {
            return Ok(Self::default());
        }

        let joined = format!("({})", extra_patterns.join("|"));
        let extra = Regex::new(&joined).map_err(|source| ConfigError::InvalidSecretPattern {
            pattern: joined.clone(),
            source,
        })?;
        Ok(Self { extra: Some(extra) })
    }

    /// `service_name` and `value` are part of the contract so rules can depend on
    /// them later; the current rules only look at `key`.
    pub fn classify(&self, _service_name: &str, key: &str, _value: &str) -> bool {
        if default_secret_regex().is_match(key) {
            return true;
        }
        self.extra.as_ref().is_some_and(|re| re.is_match(key))
    }
}
