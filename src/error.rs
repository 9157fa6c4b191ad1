//! Error types for canonicalization and descriptor transformation

use std::process::ExitStatus;
use thiserror::Error;

/// Failures producing or reading the canonical descriptor
#[derive(Debug, Error)]
pub enum CanonicalizeError {
    /// The compose tool could not be started
    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The compose tool exited unsuccessfully
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    /// Output was neither JSON nor YAML
    #[error("Canonical descriptor is neither JSON ({json}) nor YAML ({yaml})")]
    Parse {
        json: serde_json::Error,
        yaml: serde_yaml::Error,
    },

    /// Output parsed but does not fit the compose model
    #[error("Canonical descriptor does not match the compose model: {0}")]
    Model(#[source] serde_json::Error),
}

/// Failures rewriting the original descriptor
#[derive(Debug, Error)]
pub enum TransformError {
    /// Original and canonical per-service lists cannot be correlated by index
    #[error("Service {service:?} declares {original} {field} in the original descriptor but {canonical} in the canonical one")]
    ListLengthMismatch {
        service: String,
        field: &'static str,
        original: usize,
        canonical: usize,
    },

    /// The proxy container is not a service of the original descriptor
    #[error("Proxy container {0:?} is not a service of the descriptor")]
    UnknownProxyContainer(String),

    /// The original descriptor has no usable `services` mapping
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),
}
