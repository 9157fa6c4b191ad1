//! Placeholder substitution in the original descriptor
//!
//! The original (as-authored) descriptor keeps its layout; only values the
//! walker turned into variables are replaced. Volumes and ports are correlated
//! with the canonical descriptor by position, so both lists must have the same
//! length for every service.

use crate::compose::model::{ComposeModel, MountKind, Service};
use crate::error::TransformError;
use crate::transform::registry::VariableRegistry;
use crate::transform::walker::{port_source_key, split_image, WalkTables, RELEASES_KEY};
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Network every service is attached to when it declares none
pub const DEFAULT_NETWORK: &str = "default";

/// Wraps an expression in template delimiters
pub fn placeholder(expr: &str) -> String {
    format!("{{{{ {} }}}}", expr)
}

/// Replaces the leading digits of the host-port segment of a short port spec.
///
/// Handles `host:container`, `ip:host:container` and `[v6]:host:container`,
/// with or without a `/protocol` suffix. Specs without a host part are returned
/// unchanged.
pub fn patch_port(spec: &str, replacement: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^\d+").expect("valid regex"));

    let Some((host, container)) = spec.rsplit_once(':') else {
        return spec.to_string();
    };
    let (address, host_port) = match host.rsplit_once(':') {
        Some((address, port)) => (Some(address), port),
        None => (None, host),
    };

    let patched = re.replacen(host_port, 1, regex::NoExpand(replacement));
    match address {
        Some(address) => format!("{}:{}:{}", address, patched, container),
        None => format!("{}:{}", patched, container),
    }
}

/// Replaces the host part of a short volume spec.
///
/// The compose tool may normalize the source (trailing slashes, `~`, variable
/// interpolation), so the authored host part is swapped when the canonical one
/// does not appear verbatim.
pub fn patch_mount_source(spec: &str, canonical_source: &str, replacement: &str) -> String {
    if spec.contains(canonical_source) {
        return spec.replacen(canonical_source, replacement, 1);
    }
    match spec.split_once(':') {
        Some((_, rest)) => format!("{}:{}", replacement, rest),
        None => spec.to_string(),
    }
}

/// Swaps the tag of `image` for `new_tag`, adding one when the image has none
pub fn patch_image_tag(image: &str, new_tag: &str) -> Option<String> {
    let (repo, _) = split_image(image)?;
    Some(format!("{}:{}", repo, new_tag))
}

/// Replaces every digit run of a `user` spec with `uid`
pub fn patch_user(user: &str, uid: u32) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\d+").expect("valid regex"));
    re.replace_all(user, uid.to_string().as_str()).into_owned()
}

/// Adds the external `network` to `container` and declares it at the top level.
///
/// A service that ends up with the proxy network as its only network also joins
/// `default`, keeping it reachable by services that never joined the proxy.
pub fn attach_proxy_network(
    doc: &mut Value,
    container: &str,
    network: &str,
) -> Result<(), TransformError> {
    let root = doc
        .as_mapping_mut()
        .ok_or_else(|| TransformError::InvalidDescriptor("top level is not a mapping".into()))?;

    let service = root
        .get_mut("services")
        .and_then(|services| services.get_mut(container))
        .ok_or_else(|| TransformError::UnknownProxyContainer(container.to_string()))?;
    if service.is_null() {
        *service = Value::Mapping(Mapping::new());
    }
    let service = service
        .as_mapping_mut()
        .ok_or_else(|| TransformError::UnknownProxyContainer(container.to_string()))?;

    let networks = service
        .entry(Value::from("networks"))
        .or_insert(Value::Sequence(Vec::new()));
    if networks.is_null() {
        *networks = Value::Sequence(Vec::new());
    }
    match networks {
        Value::Sequence(list) => {
            if !list.iter().any(|n| n.as_str() == Some(network)) {
                list.push(Value::from(network));
            }
            if list.len() == 1 {
                list.push(Value::from(DEFAULT_NETWORK));
            }
        }
        Value::Mapping(map) => {
            if !map.contains_key(network) {
                map.insert(Value::from(network), Value::Null);
            }
            if map.len() == 1 {
                map.insert(Value::from(DEFAULT_NETWORK), Value::Null);
            }
        }
        _ => {
            return Err(TransformError::InvalidDescriptor(format!(
                "networks of service {:?} is neither a list nor a mapping",
                container
            )))
        }
    }

    let declared = root
        .entry(Value::from("networks"))
        .or_insert(Value::Mapping(Mapping::new()));
    if declared.is_null() {
        *declared = Value::Mapping(Mapping::new());
    }
    let declared = declared.as_mapping_mut().ok_or_else(|| {
        TransformError::InvalidDescriptor("top-level networks is not a mapping".into())
    })?;
    if !declared.contains_key(network) {
        let mut definition = Mapping::new();
        definition.insert(Value::from("name"), Value::from(network));
        definition.insert(Value::from("external"), Value::Bool(true));
        declared.insert(Value::from(network), Value::Mapping(definition));
    }

    Ok(())
}

/// Settings of the rewrite that do not come from the walk
#[derive(Debug, Clone, Default)]
pub struct RewriteOptions {
    pub uid: Option<u32>,
    pub proxy_container: Option<String>,
    pub external_proxy_net: String,
}

pub struct DescriptorRewriter<'a> {
    canonical: &'a ComposeModel,
    registry: &'a VariableRegistry,
    tables: &'a WalkTables,
    options: &'a RewriteOptions,
}

impl<'a> DescriptorRewriter<'a> {
    pub fn new(
        canonical: &'a ComposeModel,
        registry: &'a VariableRegistry,
        tables: &'a WalkTables,
        options: &'a RewriteOptions,
    ) -> Self {
        Self {
            canonical,
            registry,
            tables,
            options,
        }
    }

    /// Returns a copy of `original` with placeholders substituted
    pub fn rewrite(&self, original: &Value) -> Result<Value, TransformError> {
        let mut doc = original.clone();
        let services = doc
            .get_mut("services")
            .and_then(Value::as_mapping_mut)
            .ok_or_else(|| TransformError::InvalidDescriptor("no services mapping".into()))?;

        for (name, service) in services.iter_mut() {
            let (Some(name), Some(service)) = (name.as_str(), service.as_mapping_mut()) else {
                continue;
            };
            let Some(canonical) = self.canonical.services.get(name) else {
                warn!(service = name, "Service missing from canonical descriptor, leaving it as is");
                continue;
            };

            debug!(service = name, "Rewriting service");
            self.rewrite_environment(name, service);
            self.rewrite_volumes(name, service, canonical)?;
            self.rewrite_ports(name, service, canonical)?;
            self.rewrite_image(name, service);
            self.rewrite_user(service);
        }

        if let Some(container) = &self.options.proxy_container {
            attach_proxy_network(&mut doc, container, &self.options.external_proxy_net)?;
        }

        Ok(doc)
    }

    /// Every env value becomes a reference to the variable of its key
    pub fn rewrite_environment(&self, name: &str, service: &mut Mapping) {
        let Some(environment) = service.get_mut("environment") else {
            return;
        };

        if let Value::Sequence(items) = environment {
            let map: Mapping = items
                .iter()
                .filter_map(Value::as_str)
                .map(|item| match item.split_once('=') {
                    Some((k, v)) => (Value::from(k), Value::from(v)),
                    None => (Value::from(item), Value::Null),
                })
                .collect();
            *environment = Value::Mapping(map);
        }

        let Value::Mapping(map) = environment else {
            return;
        };
        for (key, value) in map.iter_mut() {
            let Some(key) = key.as_str() else { continue };
            match self.registry.lookup(key) {
                Some(record) => *value = Value::from(placeholder(&record.key)),
                None => warn!(service = name, key, "No variable registered for env key, keeping literal"),
            }
        }
    }

    pub fn rewrite_volumes(
        &self,
        name: &str,
        service: &mut Mapping,
        canonical: &Service,
    ) -> Result<(), TransformError> {
        let Some(Value::Sequence(entries)) = service.get_mut("volumes") else {
            return Ok(());
        };
        if entries.len() != canonical.volumes.len() {
            return Err(TransformError::ListLengthMismatch {
                service: name.to_string(),
                field: "volumes",
                original: entries.len(),
                canonical: canonical.volumes.len(),
            });
        }

        for (entry, mount) in entries.iter_mut().zip(&canonical.volumes) {
            if mount.kind != MountKind::Bind {
                continue;
            }
            let Some(source) = mount.source.as_deref() else {
                continue;
            };
            let Some(key) = self.tables.volume_defaults.get(source) else {
                continue;
            };

            let expr = placeholder(key);
            match entry {
                Value::String(spec) => *spec = patch_mount_source(spec, source, &expr),
                Value::Mapping(long) => {
                    if long.get("source").is_some_and(Value::is_string) {
                        long.insert(Value::from("source"), Value::from(expr));
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    pub fn rewrite_ports(
        &self,
        name: &str,
        service: &mut Mapping,
        canonical: &Service,
    ) -> Result<(), TransformError> {
        let Some(Value::Sequence(entries)) = service.get_mut("ports") else {
            return Ok(());
        };
        let no_slots = Vec::new();
        let slots = self.tables.port_slots.get(name).unwrap_or(&no_slots);
        if entries.len() != canonical.ports.len() || slots.len() != canonical.ports.len() {
            return Err(TransformError::ListLengthMismatch {
                service: name.to_string(),
                field: "ports",
                original: entries.len(),
                canonical: canonical.ports.len(),
            });
        }

        for (entry, slot) in entries.iter_mut().zip(slots) {
            let Some(port) = slot else { continue };
            let Some(record) = self.registry.lookup(&port_source_key(name, *port)) else {
                continue;
            };
            let expr = placeholder(&record.key);

            match entry {
                Value::String(spec) => *spec = patch_port(spec, &expr),
                Value::Mapping(long) => {
                    long.insert(Value::from("published"), Value::from(expr));
                }
                _ => {}
            }
        }

        Ok(())
    }

    pub fn rewrite_image(&self, name: &str, service: &mut Mapping) {
        if !self.tables.images.iter().any(|r| r.service == name) {
            return;
        }
        let Some(releases) = self
            .registry
            .lookup(RELEASES_KEY)
            .filter(|r| r.original_key.is_none())
        else {
            return;
        };
        let Some(Value::String(image)) = service.get_mut("image") else {
            return;
        };

        let expr = placeholder(&format!("{}['{}']", releases.key, name));
        if let Some(patched) = patch_image_tag(image, &expr) {
            *image = patched;
        }
    }

    pub fn rewrite_user(&self, service: &mut Mapping) {
        let Some(uid) = self.options.uid else {
            return;
        };
        match service.get_mut("user") {
            Some(Value::String(user)) => *user = patch_user(user, uid),
            Some(user @ Value::Number(_)) => *user = Value::from(uid),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DefaultsPrefix, RoleConfig, SecretPathTemplate, SecretProviderKind};
    use crate::fs::MockFileSystem;
    use crate::output::OutputDocument;
    use crate::transform::{
        assemble, DescriptorSources, EnvSourceResolver, SecretClassifier, SecretTemplater,
        ServiceWalker,
    };
    use std::path::{Path, PathBuf};
    use yare::parameterized;

    /// Walks `canonical`, rewrites `original` and assembles the document
    fn rewrite_stack(original: &str, canonical: &str, uid: Option<u32>) -> OutputDocument {
        let original: Value = serde_yaml::from_str(original).unwrap();
        let model: ComposeModel = serde_json::from_str(canonical).unwrap();
        let mut config = RoleConfig::new(DefaultsPrefix::parse("app").unwrap());
        config.uid = uid;

        let fs = MockFileSystem::with_root(PathBuf::from("/stack"));
        let classifier = SecretClassifier::new(&[]).unwrap();
        let secrets = SecretTemplater::new(
            "app",
            SecretPathTemplate::default(),
            12,
            SecretProviderKind::Passwordstore.provider(),
        );
        let mut registry = VariableRegistry::new(config.defaults_prefix.clone(), secrets);
        let resolver = EnvSourceResolver::new(&fs, Path::new("/stack"));
        let tables = ServiceWalker::new(&model, &original, resolver, &classifier).walk(&mut registry);

        let options = RewriteOptions {
            uid,
            proxy_container: None,
            external_proxy_net: config.external_proxy_net.clone(),
        };
        let final_compose = DescriptorRewriter::new(&model, &registry, &tables, &options)
            .rewrite(&original)
            .unwrap();

        let sources = DescriptorSources {
            compose_files: vec![],
            compose_config: serde_json::Value::Null,
            original_compose: original.clone(),
        };
        assemble(&config, sources, registry.into_output(), tables, final_compose)
    }

    #[test]
    fn test_rewrite_long_syntax_port() {
        let doc = rewrite_stack(
            "services:\n  web:\n    image: nginx:1.25\n    ports:\n      - target: 80\n        published: \"8080\"\n",
            r#"{"services": {"web": {"image": "nginx:1.25", "ports": [{"target": 80, "published": "8080", "protocol": "tcp"}]}}}"#,
            None,
        );

        let port = &doc.final_compose["services"]["web"]["ports"][0];
        assert_eq!(port["published"], Value::from("{{ app_host_port_web_8080 }}"));
        assert_eq!(port["target"].as_u64(), Some(80));
        doc.validate().unwrap();
    }

    #[test]
    fn test_rewrite_long_syntax_bind_mount() {
        let doc = rewrite_stack(
            "services:\n  web:\n    image: nginx\n    volumes:\n      - type: bind\n        source: ./data\n        target: /data\n      - type: volume\n        source: cache\n        target: /cache\n",
            r#"{"services": {"web": {"image": "nginx", "volumes": [
                {"type": "bind", "source": "./data", "target": "/data"},
                {"type": "volume", "source": "cache", "target": "/cache"}
            ]}}}"#,
            None,
        );

        let volumes = &doc.final_compose["services"]["web"]["volumes"];
        assert_eq!(volumes[0]["source"], Value::from("{{ app_data_mount_dir }}"));
        assert_eq!(volumes[0]["target"], Value::from("/data"));
        assert_eq!(volumes[1]["source"], Value::from("cache"));
        assert_eq!(doc.volume_defaults["./data"], "app_data_mount_dir");
        doc.validate().unwrap();
    }

    #[test]
    fn test_rewrite_numeric_user() {
        let doc = rewrite_stack(
            "services:\n  web:\n    image: nginx\n    user: 1000\n",
            r#"{"services": {"web": {"image": "nginx", "user": "1000"}}}"#,
            Some(1001),
        );

        assert_eq!(doc.final_compose["services"]["web"]["user"].as_u64(), Some(1001));
        assert_eq!(doc.original_compose["services"]["web"]["user"].as_u64(), Some(1000));
        doc.validate().unwrap();
    }

    #[test]
    fn test_rewrite_user_without_uid_is_untouched() {
        let doc = rewrite_stack(
            "services:\n  web:\n    image: nginx\n    user: \"1000:1000\"\n",
            r#"{"services": {"web": {"image": "nginx", "user": "1000:1000"}}}"#,
            None,
        );

        assert_eq!(doc.final_compose["services"]["web"]["user"], Value::from("1000:1000"));
    }

    #[parameterized(
        simple = { "8080:80", "{{ p }}:80".to_string() },
        protocol = { "53:53/udp", "{{ p }}:53/udp".to_string() },
        address = { "127.0.0.1:8443:443", "127.0.0.1:{{ p }}:443".to_string() },
        ipv6 = { "[::1]:8080:80/tcp", "[::1]:{{ p }}:80/tcp".to_string() },
        container_only = { "9000", "9000".to_string() },
    )]
    fn test_patch_port(spec: &str, expected: String) {
        assert_eq!(patch_port(spec, "{{ p }}"), expected);
    }

    #[test]
    fn test_patch_port_keeps_dollar_literal() {
        assert_eq!(patch_port("80:80", "$x"), "$x:80");
    }

    #[parameterized(
        tagged = { "nginx:1.25", "nginx:{{ t }}" },
        untagged = { "nginx", "nginx:{{ t }}" },
        registry = { "ghcr.io:443/org/app:v1", "ghcr.io:443/org/app:{{ t }}" },
    )]
    fn test_patch_image_tag(image: &str, expected: &str) {
        assert_eq!(patch_image_tag(image, "{{ t }}").as_deref(), Some(expected));
    }

    #[parameterized(
        absolute = { "/srv/app/data:/data", "{{ d }}:/data" },
        relative = { "./data:/data:ro", "{{ d }}:/data:ro" },
        no_host = { "/data", "/data" },
    )]
    fn test_patch_mount_source(spec: &str, expected: &str) {
        assert_eq!(patch_mount_source(spec, "/srv/app/data", "{{ d }}"), expected);
    }

    #[test]
    fn test_patch_user() {
        assert_eq!(patch_user("1000:1000", 1001), "1001:1001");
        assert_eq!(patch_user("app", 1001), "app");
    }

    #[test]
    fn test_attach_proxy_network_list() {
        let mut doc: Value = serde_yaml::from_str("services:\n  web:\n    image: nginx\n").unwrap();
        attach_proxy_network(&mut doc, "web", "proxy-tier").unwrap();

        assert_eq!(
            doc["services"]["web"]["networks"],
            serde_yaml::from_str::<Value>("[proxy-tier, default]").unwrap()
        );
        assert_eq!(doc["networks"]["proxy-tier"]["name"], Value::from("proxy-tier"));
        assert_eq!(doc["networks"]["proxy-tier"]["external"], Value::Bool(true));
    }

    #[test]
    fn test_attach_proxy_network_keeps_existing_networks() {
        let mut doc: Value = serde_yaml::from_str(
            "services:\n  web:\n    networks: [backend]\nnetworks:\n  backend: {}\n",
        )
        .unwrap();
        attach_proxy_network(&mut doc, "web", "proxy-tier").unwrap();

        assert_eq!(
            doc["services"]["web"]["networks"],
            serde_yaml::from_str::<Value>("[backend, proxy-tier]").unwrap()
        );
        assert!(doc["networks"].get("backend").is_some());
        assert!(doc["networks"].get("proxy-tier").is_some());
    }

    #[test]
    fn test_attach_proxy_network_mapping_form() {
        let mut doc: Value =
            serde_yaml::from_str("services:\n  web:\n    networks:\n      {}\n").unwrap();
        attach_proxy_network(&mut doc, "web", "edge").unwrap();

        let networks = doc["services"]["web"]["networks"].as_mapping().unwrap();
        assert_eq!(networks.len(), 2);
        assert!(networks.contains_key("edge"));
        assert!(networks.contains_key("default"));
    }

    #[test]
    fn test_attach_proxy_network_unknown_service() {
        let mut doc: Value = serde_yaml::from_str("services:\n  web: {}\n").unwrap();
        let err = attach_proxy_network(&mut doc, "proxy", "proxy-tier").unwrap_err();
        assert!(matches!(err, TransformError::UnknownProxyContainer(_)));
    }
}
