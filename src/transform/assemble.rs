//! Output document assembly

use crate::config::RoleConfig;
use crate::output::schema::OutputDocument;
use crate::transform::registry::RegistryOutput;
use crate::transform::walker::WalkTables;

/// Descriptor forms carried into the output as-is
#[derive(Debug, Clone)]
pub struct DescriptorSources {
    pub compose_files: Vec<String>,
    pub compose_config: serde_json::Value,
    pub original_compose: serde_yaml::Value,
}

/// Combines the run configuration, the registry and the walk tables into one
/// document
pub fn assemble(
    config: &RoleConfig,
    sources: DescriptorSources,
    registry: RegistryOutput,
    tables: WalkTables,
    final_compose: serde_yaml::Value,
) -> OutputDocument {
    let images_tags = tables.images_tags();

    OutputDocument {
        role_name: config.role_name.clone(),
        defaults: registry.defaults,
        secret_provider: config.secret_provider.to_string(),
        defaults_prefix: config.defaults_prefix.to_string(),
        secret_string_template: config.secret_path_template.as_str().to_string(),
        min_secret_length: config.min_secret_length,
        compose_files: sources.compose_files,
        compose_config: sources.compose_config,
        original_compose: sources.original_compose,
        final_compose,
        services_by_env: registry.services_by_env,
        suppressed_duplicates: registry.suppressed_duplicates,
        proxy_container: config.proxy_container.clone(),
        backup_paths: tables.backup_paths,
        exposed_ports_by_service: tables.exposed_ports,
        volume_defaults: tables.volume_defaults,
        images_tags,
        external_proxy_net: config.external_proxy_net.clone(),
        env_files: registry.env_files,
        uid: config.uid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultsPrefix;
    use crate::transform::walker::ImageRecord;

    #[test]
    fn test_assemble_echoes_config() {
        let mut config = RoleConfig::new(DefaultsPrefix::parse("app").unwrap()).with_role_name("web stack");
        config.proxy_container = Some("web".to_string());
        config.uid = Some(1001);

        let mut tables = WalkTables::default();
        tables.backup_paths.push("/srv/data".to_string());
        tables.images.push(ImageRecord {
            image: "nginx:1.25".to_string(),
            service: "web".to_string(),
            tag: "1.25".to_string(),
            kind: None,
        });

        let doc = assemble(
            &config,
            DescriptorSources {
                compose_files: vec!["/srv/docker-compose.yml".to_string()],
                compose_config: serde_json::json!({"services": {}}),
                original_compose: serde_yaml::Value::Null,
            },
            RegistryOutput::default(),
            tables,
            serde_yaml::Value::Null,
        );

        assert_eq!(doc.role_name, "web_stack");
        assert_eq!(doc.defaults_prefix, "app_");
        assert_eq!(doc.secret_provider, "passwordstore");
        assert_eq!(doc.secret_string_template, "services/{role_name}/{service_name}/{env_key}");
        assert_eq!(doc.min_secret_length, 12);
        assert_eq!(doc.proxy_container.as_deref(), Some("web"));
        assert_eq!(doc.uid, Some(1001));
        assert_eq!(doc.backup_paths, vec!["/srv/data"]);
        assert_eq!(doc.images_tags["nginx:1.25"].tag, "1.25");
        assert_eq!(doc.compose_files, vec!["/srv/docker-compose.yml"]);
    }
}
