//! Descriptor transformation
//!
//! [`transform_descriptor`] runs the whole pipeline for one descriptor file:
//! canonicalize, walk the services into a [`VariableRegistry`], rewrite the
//! original descriptor with placeholders and assemble the output document.

pub mod assemble;
pub mod classify;
pub mod env_source;
pub mod normalize;
pub mod registry;
pub mod rewriter;
pub mod secrets;
pub mod walker;

pub use assemble::{assemble, DescriptorSources};
pub use classify::SecretClassifier;
pub use env_source::{parse_env_file, EnvFileError, EnvFileMode, EnvSourceResolver};
pub use registry::{RegistryOutput, VariableRegistry};
pub use rewriter::{DescriptorRewriter, RewriteOptions};
pub use secrets::{PasswordStore, SecretProvider, SecretTemplater};
pub use walker::{ServiceWalker, WalkTables};

use crate::compose::{parse_canonical, Canonicalizer};
use crate::config::RoleConfig;
use crate::fs::FileSystem;
use crate::output::OutputDocument;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

/// Transforms the descriptor at `descriptor` into an [`OutputDocument`]
pub fn transform_descriptor<F, C>(
    config: &RoleConfig,
    descriptor: &Path,
    fs: &F,
    canonicalizer: &C,
) -> Result<OutputDocument>
where
    F: FileSystem + ?Sized,
    C: Canonicalizer + ?Sized,
{
    config.validate()?;

    if !fs.is_file(descriptor) {
        anyhow::bail!("Compose file not found: {}", descriptor.display());
    }
    let base_dir = descriptor.parent().unwrap_or_else(|| Path::new("."));

    let text = fs
        .read_to_string(descriptor)
        .with_context(|| format!("Failed to read {}", descriptor.display()))?;
    let mut original: serde_yaml::Value = serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse {}", descriptor.display()))?;
    original
        .apply_merge()
        .with_context(|| format!("Failed to resolve merge keys in {}", descriptor.display()))?;

    let canonical_text = canonicalizer
        .canonicalize(descriptor)
        .context("Failed to canonicalize compose file")?;
    let canonical = parse_canonical(&canonical_text)?;
    info!(
        services = canonical.model.services.len(),
        "Canonical descriptor loaded"
    );

    let classifier = SecretClassifier::new(&config.extra_secret_patterns)?;
    let secrets = SecretTemplater::new(
        &config.role_name,
        config.secret_path_template.clone(),
        config.min_secret_length,
        config.secret_provider.provider(),
    );
    let mut registry = VariableRegistry::new(config.defaults_prefix.clone(), secrets);

    let resolver = EnvSourceResolver::new(fs, base_dir);
    let walker = ServiceWalker::new(&canonical.model, &original, resolver, &classifier);
    let tables = walker.walk(&mut registry);

    let options = RewriteOptions {
        uid: config.uid,
        proxy_container: config.proxy_container.clone(),
        external_proxy_net: config.external_proxy_net.clone(),
    };
    let final_compose =
        DescriptorRewriter::new(&canonical.model, &registry, &tables, &options).rewrite(&original)?;

    info!(
        defaults = registry.records().len(),
        suppressed = registry.suppressed_duplicates(),
        "Descriptor transformed"
    );

    let sources = DescriptorSources {
        compose_files: vec![descriptor.display().to_string()],
        compose_config: canonical.raw,
        original_compose: original,
    };
    let doc = assemble(config, sources, registry.into_output(), tables, final_compose);

    let unresolved = doc.unresolved_placeholders();
    if !unresolved.is_empty() {
        warn!(
            names = %unresolved.join(", "),
            "Rewritten descriptor references names that are not default variables"
        );
    }

    Ok(doc)
}
