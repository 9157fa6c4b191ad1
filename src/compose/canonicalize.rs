//! Canonical descriptor production through the compose CLI

use crate::compose::model::ComposeModel;
use crate::config::DEFAULT_COMPOSE_COMMAND;
use crate::error::CanonicalizeError;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

/// Turns a descriptor file into its canonical textual form
pub trait Canonicalizer {
    fn canonicalize(&self, descriptor: &Path) -> Result<String, CanonicalizeError>;
}

/// Runs `<command> -f <descriptor> config --format json --no-path-resolution`
/// from the descriptor's directory
#[derive(Debug, Clone)]
pub struct ComposeCli {
    program: String,
    args: Vec<String>,
}

impl ComposeCli {
    /// `command` is split on whitespace, e.g. `docker compose` or `podman-compose`
    pub fn new(command: &str) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        match parts.next() {
            Some(program) => Self {
                program,
                args: parts.collect(),
            },
            None => Self::new(DEFAULT_COMPOSE_COMMAND),
        }
    }

    /// Full argument vector, program first
    pub fn command_line(&self, descriptor: &Path) -> Vec<String> {
        let mut line = vec![self.program.clone()];
        line.extend(self.args.iter().cloned());
        line.push("-f".to_string());
        line.push(descriptor.display().to_string());
        line.extend(
            ["config", "--format", "json", "--no-path-resolution"]
                .iter()
                .map(|s| s.to_string()),
        );
        line
    }
}

impl Default for ComposeCli {
    fn default() -> Self {
        Self::new(DEFAULT_COMPOSE_COMMAND)
    }
}

impl Canonicalizer for ComposeCli {
    fn canonicalize(&self, descriptor: &Path) -> Result<String, CanonicalizeError> {
        let line = self.command_line(descriptor);
        let rendered = line.join(" ");
        debug!(command = %rendered, "Canonicalizing descriptor");

        let mut command = Command::new(&line[0]);
        command.args(&line[1..]);
        if let Some(dir) = descriptor.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        let output = command.output().map_err(|source| CanonicalizeError::Spawn {
            command: rendered.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(CanonicalizeError::CommandFailed {
                command: rendered,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Canonical descriptor as emitted plus its typed view
#[derive(Debug, Clone)]
pub struct CanonicalDescriptor {
    pub raw: serde_json::Value,
    pub model: ComposeModel,
}

/// Parses canonical output as JSON, falling back to YAML.
///
/// Some compose releases print YAML even when asked for JSON.
pub fn parse_canonical(text: &str) -> Result<CanonicalDescriptor, CanonicalizeError> {
    let raw = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(raw) => raw,
        Err(json) => {
            warn!(error = %json, "Canonical descriptor is not JSON, trying YAML");
            serde_yaml::from_str::<serde_json::Value>(text)
                .map_err(|yaml| CanonicalizeError::Parse { json, yaml })?
        }
    };

    let model = serde_json::from_value(raw.clone()).map_err(CanonicalizeError::Model)?;
    Ok(CanonicalDescriptor { raw, model })
}
