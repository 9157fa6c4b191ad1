//! Per-service extraction pass over the canonical descriptor
//!
//! The walker feeds every configuration value it finds into the
//! [`VariableRegistry`] and collects the side tables the rewriter and the output
//! need in a [`WalkTables`] accumulator. Each phase takes the accumulator
//! explicitly so it can be exercised on its own.

use crate::compose::model::{ComposeModel, MountKind, Service};
use crate::fs::FileSystem;
use crate::output::schema::{DatabaseKind, DefaultValue, ImageTag};
use crate::transform::classify::SecretClassifier;
use crate::transform::env_source::{env_file_refs, EnvSourceResolver};
use crate::transform::registry::VariableRegistry;
use indexmap::IndexMap;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Source key of the role-wide service → image tag mapping
pub const RELEASES_KEY: &str = "releases";

/// Host directory docker keeps named volumes in
pub const DOCKER_VOLUMES_ROOT: &str = "/var/lib/docker/volumes";

/// Source key of the variable holding a published host port
pub fn port_source_key(service: &str, port: u16) -> String {
    format!("host_port_{}_{}", service, port)
}

/// Source key of the variable holding a bind-mount host path
pub fn mount_source_key(source: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"[\w.]+$").expect("valid regex"));
    let id = re.find(source).map(|m| m.as_str()).unwrap_or("data");
    format!("{}_mount_dir", id.replace('.', "_"))
}

/// Splits an image reference into repository and tag.
///
/// The tag is looked for after the last `/` so registry ports are not mistaken
/// for tags. Digest-pinned references return `None`.
pub fn split_image(image: &str) -> Option<(&str, Option<&str>)> {
    if image.contains('@') {
        return None;
    }
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[name_start..].find(':') {
        Some(i) => {
            let split = name_start + i;
            Some((&image[..split], Some(&image[split + 1..])))
        }
        None => Some((image, None)),
    }
}

/// Image of one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub image: String,
    pub service: String,
    pub tag: String,
    pub kind: Option<DatabaseKind>,
}

/// Side tables collected while walking the services
#[derive(Debug, Clone, Default)]
pub struct WalkTables {
    pub backup_paths: Vec<String>,
    /// Bind source → variable name
    pub volume_defaults: IndexMap<String, String>,
    /// Service → published host ports
    pub exposed_ports: IndexMap<String, Vec<u16>>,
    /// Service → host port per canonical port entry, `None` when unpublished
    pub port_slots: IndexMap<String, Vec<Option<u16>>>,
    pub images: Vec<ImageRecord>,
}

impl WalkTables {
    /// Image → tag record; a later service wins for a shared image
    pub fn images_tags(&self) -> IndexMap<String, ImageTag> {
        self.images
            .iter()
            .map(|r| {
                (
                    r.image.clone(),
                    ImageTag {
                        service: r.service.clone(),
                        tag: r.tag.clone(),
                        kind: r.kind,
                    },
                )
            })
            .collect()
    }

    /// Service → image tag
    pub fn releases(&self) -> IndexMap<String, String> {
        self.images
            .iter()
            .map(|r| (r.service.clone(), r.tag.clone()))
            .collect()
    }
}

pub struct ServiceWalker<'a, F: FileSystem + ?Sized> {
    canonical: &'a ComposeModel,
    original: &'a serde_yaml::Value,
    resolver: EnvSourceResolver<'a, F>,
    classifier: &'a SecretClassifier,
}

impl<'a, F: FileSystem + ?Sized> ServiceWalker<'a, F> {
    pub fn new(
        canonical: &'a ComposeModel,
        original: &'a serde_yaml::Value,
        resolver: EnvSourceResolver<'a, F>,
        classifier: &'a SecretClassifier,
    ) -> Self {
        Self {
            canonical,
            original,
            resolver,
            classifier,
        }
    }

    /// Runs every phase for every service in descriptor order, then adds the
    /// releases aggregate
    pub fn walk(&self, registry: &mut VariableRegistry) -> WalkTables {
        let mut tables = WalkTables::default();

        for (name, service) in &self.canonical.services {
            debug!(service = %name, "Walking service");
            self.walk_environment(name, service, registry);
            self.walk_volumes(name, service, registry, &mut tables);
            self.walk_ports(name, service, registry, &mut tables);
            self.walk_image(name, service, &mut tables);
        }

        self.finish(registry, &tables);
        tables
    }

    pub fn walk_environment(&self, name: &str, service: &Service, registry: &mut VariableRegistry) {
        if service.environment.is_empty() {
            return;
        }

        let env_files = self
            .original
            .get("services")
            .and_then(|s| s.get(name))
            .map(env_file_refs)
            .unwrap_or_default();
        let resolved = self.resolver.resolve(name, &service.environment, &env_files);

        for (key, value) in &resolved.values {
            let is_secret = self.classifier.classify(name, key, value);
            registry.register(
                key,
                DefaultValue::Text(value.clone()),
                name,
                is_secret,
                resolved.origin(key),
            );
        }
    }

    pub fn walk_volumes(
        &self,
        name: &str,
        service: &Service,
        registry: &mut VariableRegistry,
        tables: &mut WalkTables,
    ) {
        for mount in &service.volumes {
            match (mount.kind, mount.source.as_deref()) {
                (MountKind::Bind, Some(source)) => {
                    tables.backup_paths.push(source.to_string());
                    self.scan_bind_mount(name, source, registry);
                    self.register_mount_dir(name, source, registry, tables);
                }
                (MountKind::Volume, Some(source)) => {
                    let volume = self.canonical.volume_name(source);
                    tables
                        .backup_paths
                        .push(format!("{}/{}", DOCKER_VOLUMES_ROOT, volume));
                }
                _ => {}
            }
        }
    }

    fn scan_bind_mount(&self, name: &str, source: &str, registry: &mut VariableRegistry) {
        let Some(values) = self.resolver.scan_bind_mount(source) else {
            return;
        };
        for (key, value) in values {
            let is_secret = self.classifier.classify(name, &key, &value);
            registry.register(&key, DefaultValue::Text(value), name, is_secret, Some(source));
        }
    }

    fn register_mount_dir(
        &self,
        name: &str,
        source: &str,
        registry: &mut VariableRegistry,
        tables: &mut WalkTables,
    ) {
        if tables.volume_defaults.contains_key(source) {
            return;
        }

        let source_key = mount_source_key(source);
        registry.register(&source_key, DefaultValue::Text(source.to_string()), name, false, None);

        match registry.lookup(&source_key) {
            Some(record) if record.value == DefaultValue::Text(source.to_string()) => {
                tables
                    .volume_defaults
                    .insert(source.to_string(), record.key.clone());
            }
            Some(record) => warn!(
                service = name,
                source,
                key = %record.key,
                "Mount variable already holds another path, leaving source literal"
            ),
            None => {}
        }
    }

    pub fn walk_ports(
        &self,
        name: &str,
        service: &Service,
        registry: &mut VariableRegistry,
        tables: &mut WalkTables,
    ) {
        let mut slots = Vec::with_capacity(service.ports.len());

        for port in &service.ports {
            let host_port = match port.published_port() {
                None => None,
                Some(Ok(host_port)) => Some(host_port),
                Some(Err(published)) => {
                    warn!(service = name, published = %published, "Published port is not a single number, skipping");
                    None
                }
            };

            if let Some(host_port) = host_port {
                tables
                    .exposed_ports
                    .entry(name.to_string())
                    .or_default()
                    .push(host_port);
                registry.register(
                    &port_source_key(name, host_port),
                    DefaultValue::Port(host_port),
                    name,
                    false,
                    None,
                );
            }
            slots.push(host_port);
        }

        tables.port_slots.insert(name.to_string(), slots);
    }

    pub fn walk_image(&self, name: &str, service: &Service, tables: &mut WalkTables) {
        let Some(image) = service.image.as_deref() else {
            return;
        };
        let Some((repo, tag)) = split_image(image) else {
            debug!(service = name, image, "Image is pinned by digest, not templating its tag");
            return;
        };

        tables.images.push(ImageRecord {
            image: image.to_string(),
            service: name.to_string(),
            tag: tag.unwrap_or("latest").to_string(),
            kind: DatabaseKind::detect(repo),
        });
    }

    /// Registers the releases aggregate built from the image records
    pub fn finish(&self, registry: &mut VariableRegistry, tables: &WalkTables) {
        registry.register_aggregate(RELEASES_KEY, DefaultValue::Map(tables.releases()));
    }
}
