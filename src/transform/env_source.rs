//! Environment sources of a service: inline values plus env-file provenance

use crate::fs::FileSystem;
use indexmap::IndexMap;
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// First line a bind-mounted file needs to be scanned for env vars
pub const ENV_FILE_MARKER: &str = "# deploy-docker-compose-template::type::env";

/// How strictly a file is treated as an env file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvFileMode {
    /// Referenced from a service's `env_file`; every line counts
    Declared,
    /// Bind-mounted; only read when the first line carries [`ENV_FILE_MARKER`]
    Marked,
}

#[derive(Debug, Error)]
pub enum EnvFileError {
    #[error("Failed to read env file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Line {line} of {path} is not KEY=VALUE: {content:?}")]
    Malformed {
        path: String,
        line: usize,
        content: String,
    },
}

/// Parses `KEY=VALUE` lines, skipping blank lines and `#` comments.
///
/// In [`EnvFileMode::Marked`] a missing marker yields an empty map.
pub fn parse_env_file(
    content: &str,
    path: &str,
    mode: EnvFileMode,
) -> Result<IndexMap<String, String>, EnvFileError> {
    let mut values = IndexMap::new();

    for (ix, line) in content.lines().enumerate() {
        if mode == EnvFileMode::Marked && ix == 0 && !line.starts_with(ENV_FILE_MARKER) {
            break;
        }
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| EnvFileError::Malformed {
            path: path.to_string(),
            line: ix + 1,
            content: line.to_string(),
        })?;
        values.insert(key.to_string(), value.to_string());
    }

    Ok(values)
}

/// `env_file` references of a service in the original descriptor.
///
/// Accepts a single path, a list of paths, or a list of `{path: ...}` entries.
pub fn env_file_refs(service: &Value) -> Vec<String> {
    match service.get("env_file") {
        Some(Value::String(path)) => vec![path.clone()],
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(path) => Some(path.clone()),
                Value::Mapping(_) => item.get("path").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Merged environment of one service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedEnv {
    /// Declared values, already folded with env files upstream
    pub values: IndexMap<String, String>,
    /// Key to the env-file reference (as written) that declared it
    pub origins: HashMap<String, String>,
}

impl ResolvedEnv {
    pub fn origin(&self, key: &str) -> Option<&str> {
        self.origins.get(key).map(String::as_str)
    }
}

/// Reads env files relative to the descriptor directory through a [`FileSystem`]
pub struct EnvSourceResolver<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
    base_dir: &'a Path,
}

impl<'a, F: FileSystem + ?Sized> EnvSourceResolver<'a, F> {
    pub fn new(fs: &'a F, base_dir: &'a Path) -> Self {
        Self { fs, base_dir }
    }

    /// Merges the inline environment with the provenance of its env files.
    ///
    /// Unreadable env files only lose their provenance. When two files declare the
    /// same key the later reference wins.
    pub fn resolve(
        &self,
        service: &str,
        environment: &IndexMap<String, String>,
        env_files: &[String],
    ) -> ResolvedEnv {
        let mut origins = HashMap::new();

        for reference in env_files {
            match self.read(reference, EnvFileMode::Declared) {
                Ok(values) => {
                    debug!(service, env_file = %reference, keys = values.len(), "Indexed env file");
                    for key in values.into_keys() {
                        origins.insert(key, reference.clone());
                    }
                }
                Err(e) => warn!(service, error = %e, "Skipping env file"),
            }
        }

        ResolvedEnv {
            values: environment.clone(),
            origins,
        }
    }

    /// Env vars of a bind-mounted file that opted in with the marker line.
    ///
    /// Only the first line is read unless it carries the marker. Returns `None`
    /// when the source is not a readable, well-formed file.
    pub fn scan_bind_mount(&self, source: &str) -> Option<IndexMap<String, String>> {
        let path = self.fs.resolve(self.base_dir, source);
        if !self.fs.is_file(&path) {
            if self.fs.exists(&path) {
                debug!(source, "Bind mount source is a directory, not scanning for env vars");
            } else {
                warn!(source, "Bind mount source does not exist");
            }
            return None;
        }

        match self.fs.read_first_line(&path) {
            Ok(Some(line)) if line.starts_with(ENV_FILE_MARKER) => {}
            Ok(_) => {
                debug!(source, "Bind mounted file has no env marker");
                return Some(IndexMap::new());
            }
            Err(e) => {
                warn!(source, error = %format!("{:#}", e), "Bind mounted file could not be read");
                return None;
            }
        }

        match self.read(source, EnvFileMode::Marked) {
            Ok(values) => Some(values),
            Err(e) => {
                warn!(error = %e, "Supposed env file could not be parsed");
                None
            }
        }
    }

    fn read(&self, reference: &str, mode: EnvFileMode) -> Result<IndexMap<String, String>, EnvFileError> {
        let path = self.fs.resolve(self.base_dir, reference);
        let content = self
            .fs
            .read_to_string(&path)
            .map_err(|e| EnvFileError::Read {
                path: path.display().to_string(),
                message: format!("{:#}", e),
            })?;
        parse_env_file(&content, &path.display().to_string(), mode)
    }
}
