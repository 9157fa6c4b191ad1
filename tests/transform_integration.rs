//! End-to-end transformation tests
//!
//! These tests run [`transform_descriptor`] against an in-memory file system and
//! a canonicalizer that returns prepared JSON, so no compose tool is needed.

use compose_role::compose::Canonicalizer;
use compose_role::config::{DefaultsPrefix, RoleConfig};
use compose_role::output::{DatabaseKind, DefaultValue};
use compose_role::{transform_descriptor, CanonicalizeError, MockFileSystem, TransformError};
use serde_yaml::Value;
use std::path::{Path, PathBuf};

const DESCRIPTOR: &str = "/stack/docker-compose.yml";

const ORIGINAL: &str = r#"
services:
  web:
    image: nginx:1.25
    environment:
      - DB_PASSWORD=x
      - MODE=prod
    ports:
      - "8080:80"
    volumes:
      - ./conf/app.env:/etc/app.env
      - data:/var/lib/data
    user: "1000:1000"
  db:
    image: postgres
    env_file: .env
    environment:
      POSTGRES_PASSWORD: hunter2
      MODE: prod
volumes:
  data: {}
"#;

const CANONICAL: &str = r#"{
  "name": "stack",
  "services": {
    "web": {
      "image": "nginx:1.25",
      "environment": {"DB_PASSWORD": "x", "MODE": "prod"},
      "ports": [{"mode": "ingress", "target": 80, "published": "8080", "protocol": "tcp"}],
      "volumes": [
        {"type": "bind", "source": "./conf/app.env", "target": "/etc/app.env"},
        {"type": "volume", "source": "data", "target": "/var/lib/data"}
      ],
      "user": "1000:1000"
    },
    "db": {
      "image": "postgres",
      "environment": {"POSTGRES_PASSWORD": "hunter2", "MODE": "prod", "EXTRA": "1"}
    }
  },
  "volumes": {"data": {"name": "stack_data"}}
}"#;

const APP_ENV: &str = "# deploy-docker-compose-template::type::env\nAPI_TOKEN=abc\n";

/// Returns the same canonical text for any descriptor
struct FixedCanonicalizer(String);

impl Canonicalizer for FixedCanonicalizer {
    fn canonicalize(&self, _descriptor: &Path) -> Result<String, CanonicalizeError> {
        Ok(self.0.clone())
    }
}

struct MissingTool;

impl Canonicalizer for MissingTool {
    fn canonicalize(&self, _descriptor: &Path) -> Result<String, CanonicalizeError> {
        Err(CanonicalizeError::Spawn {
            command: "docker compose".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        })
    }
}

fn stack_fs(original: &str) -> MockFileSystem {
    let fs = MockFileSystem::with_root(PathBuf::from("/stack"));
    fs.add_file(DESCRIPTOR, original);
    fs.add_file("/stack/conf/app.env", APP_ENV);
    fs.add_file("/stack/.env", "EXTRA=1\n");
    fs
}

fn config() -> RoleConfig {
    let mut config = RoleConfig::new(DefaultsPrefix::parse("app").unwrap()).with_role_name("myrole");
    config.proxy_container = Some("web".to_string());
    config.uid = Some(1001);
    config
}

fn yaml(text: &str) -> Value {
    serde_yaml::from_str(text).unwrap()
}

#[test]
fn test_full_scenario() {
    let fs = stack_fs(ORIGINAL);
    let doc = transform_descriptor(
        &config(),
        Path::new(DESCRIPTOR),
        &fs,
        &FixedCanonicalizer(CANONICAL.to_string()),
    )
    .unwrap();

    let keys: Vec<&str> = doc.defaults.iter().map(|d| d.key.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "app_db_password",
            "app_mode",
            "app_api_token",
            "app_app_env_mount_dir",
            "app_host_port_web_8080",
            "app_postgres_password",
            "app_extra",
            "app_releases",
        ]
    );

    let password = &doc.defaults[0];
    assert!(password.is_secret);
    assert_eq!(password.service, "web");
    assert_eq!(
        password.secret_path.as_deref(),
        Some("services/myrole/web/DB_PASSWORD")
    );
    assert_eq!(
        password.secret_expr.as_deref(),
        Some("{{ lookup('community.general.passwordstore', 'services/myrole/web/DB_PASSWORD create=true length=12') }}")
    );

    let token = &doc.defaults[2];
    assert!(token.is_secret);
    assert_eq!(token.env_file.as_deref(), Some("./conf/app.env"));
    assert_eq!(doc.defaults[4].value, DefaultValue::Port(8080));
    assert_eq!(doc.defaults[6].env_file.as_deref(), Some(".env"));

    let releases = doc.defaults.last().unwrap();
    assert_eq!(releases.service, "None");
    assert!(releases.original_key.is_none());
    match &releases.value {
        DefaultValue::Map(map) => {
            assert_eq!(map["web"], "1.25");
            assert_eq!(map["db"], "latest");
        }
        other => panic!("unexpected releases value: {other:?}"),
    }

    assert_eq!(doc.suppressed_duplicates, 1);
    assert_eq!(doc.services_by_env["MODE"], vec!["web", "db"]);
    assert_eq!(
        doc.backup_paths,
        vec!["./conf/app.env", "/var/lib/docker/volumes/stack_data"]
    );
    assert_eq!(doc.exposed_ports_by_service["web"], vec![8080]);
    assert_eq!(doc.volume_defaults["./conf/app.env"], "app_app_env_mount_dir");
    assert_eq!(doc.images_tags["postgres"].kind, Some(DatabaseKind::Postgres));
    assert_eq!(doc.env_files["./conf/app.env"], "app_env");
    assert_eq!(doc.compose_files, vec![DESCRIPTOR]);
    assert_eq!(doc.compose_config["name"], "stack");

    let web = &doc.final_compose["services"]["web"];
    assert_eq!(
        web["environment"],
        yaml("{DB_PASSWORD: '{{ app_db_password }}', MODE: '{{ app_mode }}'}")
    );
    assert_eq!(web["ports"][0], Value::from("{{ app_host_port_web_8080 }}:80"));
    assert_eq!(
        web["volumes"][0],
        Value::from("{{ app_app_env_mount_dir }}:/etc/app.env")
    );
    assert_eq!(web["volumes"][1], Value::from("data:/var/lib/data"));
    assert_eq!(web["image"], Value::from("nginx:{{ app_releases['web'] }}"));
    assert_eq!(web["user"], Value::from("1001:1001"));
    assert_eq!(web["networks"], yaml("[proxy-tier, default]"));

    let db = &doc.final_compose["services"]["db"];
    assert_eq!(db["environment"]["MODE"], Value::from("{{ app_mode }}"));
    assert_eq!(db["image"], Value::from("postgres:{{ app_releases['db'] }}"));
    assert_eq!(db["env_file"], Value::from(".env"));

    assert_eq!(doc.final_compose["networks"]["proxy-tier"]["external"], Value::Bool(true));
    assert_eq!(doc.original_compose["services"]["web"]["user"], Value::from("1000:1000"));

    doc.validate().unwrap();
}

#[test]
fn test_output_serializes() {
    let fs = stack_fs(ORIGINAL);
    let doc = transform_descriptor(
        &config(),
        Path::new(DESCRIPTOR),
        &fs,
        &FixedCanonicalizer(CANONICAL.to_string()),
    )
    .unwrap();

    let json: serde_json::Value = serde_json::from_str(&doc.to_json().unwrap()).unwrap();
    assert_eq!(json["defaults_prefix"], "app_");
    assert_eq!(json["role_name"], "myrole");
    assert_eq!(json["secret_provider"], "passwordstore");
    assert_eq!(json["uid"], 1001);
    assert_eq!(json["defaults"][4]["value"], 8080);

    let yaml_text = doc.to_yaml().unwrap();
    assert!(yaml_text.contains("external_proxy_net: proxy-tier"));
}

#[test]
fn test_missing_descriptor_is_fatal() {
    let fs = MockFileSystem::with_root(PathBuf::from("/stack"));
    let err = transform_descriptor(
        &config(),
        Path::new(DESCRIPTOR),
        &fs,
        &FixedCanonicalizer(CANONICAL.to_string()),
    )
    .unwrap_err();

    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_canonicalizer_failure_is_fatal() {
    let fs = stack_fs(ORIGINAL);
    let err = transform_descriptor(&config(), Path::new(DESCRIPTOR), &fs, &MissingTool).unwrap_err();

    assert!(err.downcast_ref::<CanonicalizeError>().is_some());
}

#[test]
fn test_yaml_canonical_output_is_accepted() {
    let fs = stack_fs("services:\n  web:\n    image: redis:7\n");
    let canonical = "services:\n  web:\n    image: redis:7\n";
    let mut config = config();
    config.proxy_container = None;
    config.uid = None;

    let doc = transform_descriptor(
        &config,
        Path::new(DESCRIPTOR),
        &fs,
        &FixedCanonicalizer(canonical.to_string()),
    )
    .unwrap();

    assert_eq!(doc.images_tags["redis:7"].kind, Some(DatabaseKind::Redis));
    assert_eq!(
        doc.final_compose["services"]["web"]["image"],
        Value::from("redis:{{ app_releases['web'] }}")
    );
}

#[test]
fn test_port_list_mismatch_is_reported() {
    let original = "services:\n  web:\n    image: nginx\n    ports:\n      - 8080:80\n      - 8443:443\n";
    let canonical = r#"{"services": {"web": {"image": "nginx", "ports": [{"target": 80, "published": "8080"}]}}}"#;
    let fs = stack_fs(original);

    let err = transform_descriptor(
        &config(),
        Path::new(DESCRIPTOR),
        &fs,
        &FixedCanonicalizer(canonical.to_string()),
    )
    .unwrap_err();

    match err.downcast_ref::<TransformError>() {
        Some(TransformError::ListLengthMismatch {
            service,
            field,
            original,
            canonical,
        }) => {
            assert_eq!(service, "web");
            assert_eq!(*field, "ports");
            assert_eq!(*original, 2);
            assert_eq!(*canonical, 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_unknown_proxy_container() {
    let fs = stack_fs(ORIGINAL);
    let mut config = config();
    config.proxy_container = Some("traefik".to_string());

    let err = transform_descriptor(
        &config,
        Path::new(DESCRIPTOR),
        &fs,
        &FixedCanonicalizer(CANONICAL.to_string()),
    )
    .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<TransformError>(),
        Some(TransformError::UnknownProxyContainer(name)) if name == "traefik"
    ));
}

#[test]
fn test_service_outside_canonical_is_left_alone() {
    let original = "services:\n  web:\n    image: nginx:1\n  debug:\n    image: busybox\n    environment:\n      - LEVEL=9\n    profiles: [debug]\n";
    let canonical = r#"{"services": {"web": {"image": "nginx:1"}}}"#;
    let fs = stack_fs(original);
    let mut config = config();
    config.proxy_container = None;

    let doc = transform_descriptor(
        &config,
        Path::new(DESCRIPTOR),
        &fs,
        &FixedCanonicalizer(canonical.to_string()),
    )
    .unwrap();

    let debug = &doc.final_compose["services"]["debug"];
    assert_eq!(debug["image"], Value::from("busybox"));
    assert_eq!(debug["environment"][0], Value::from("LEVEL=9"));
    assert!(!doc.defaults.iter().any(|d| d.key == "app_level"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let fs = stack_fs(ORIGINAL);
    let mut config = config();
    config.extra_secret_patterns = vec!["[".to_string()];

    let err = transform_descriptor(
        &config,
        Path::new(DESCRIPTOR),
        &fs,
        &FixedCanonicalizer(CANONICAL.to_string()),
    )
    .unwrap_err();

    assert!(err.to_string().contains("Invalid secret pattern"));
}
