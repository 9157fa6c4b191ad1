//! Typed view of the canonical compose descriptor
//!
//! Only the parts the transformation reads are modelled; every other field of
//! the compose specification is ignored on deserialization. Both the long syntax
//! the compose tool emits and the short string syntax are accepted for mounts and
//! ports, so a YAML fallback parse still fits the model.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};

fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

/// Scalar that compose allows where a string is meant
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::String(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

fn deserialize_scalar_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(Scalar::into_string))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EnvironmentSpec {
    Map(IndexMap<String, Option<Scalar>>),
    List(Vec<String>),
}

/// Environment as a key/value map; unset values become empty strings
fn deserialize_environment<'de, D>(deserializer: D) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let spec = Option::<EnvironmentSpec>::deserialize(deserializer)?;
    Ok(match spec {
        None => IndexMap::new(),
        Some(EnvironmentSpec::Map(map)) => map
            .into_iter()
            .map(|(k, v)| (k, v.map(Scalar::into_string).unwrap_or_default()))
            .collect(),
        Some(EnvironmentSpec::List(items)) => items.iter().map(String::as_str).map(split_env_item).collect(),
    })
}

/// Splits a `KEY=VALUE` list entry; a bare `KEY` has an empty value
pub fn split_env_item(item: &str) -> (String, String) {
    match item.split_once('=') {
        Some((k, v)) => (k.to_string(), v.to_string()),
        None => (item.to_string(), String::new()),
    }
}

/// Canonical compose descriptor
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComposeModel {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub services: IndexMap<String, Service>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub volumes: IndexMap<String, Option<Volume>>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub networks: IndexMap<String, Option<serde_json::Value>>,
}

impl ComposeModel {
    /// Host-side name of a declared volume, falling back to its key
    pub fn volume_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.volumes
            .get(key)
            .and_then(|v| v.as_ref())
            .and_then(|v| v.name.as_deref())
            .unwrap_or(key)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Service {
    #[serde(default, deserialize_with = "deserialize_environment")]
    pub environment: IndexMap<String, String>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub volumes: Vec<Mount>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub ports: Vec<PortSpec>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar_opt")]
    pub user: Option<String>,
}

/// Named volume declaration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Volume {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    Bind,
    Volume,
    /// tmpfs, npipe, cluster and anything newer
    Other,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MountSpec {
    Long {
        #[serde(rename = "type", default)]
        mount_type: String,
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        target: Option<String>,
    },
    Short(String),
}

/// Service mount, in canonical order
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "MountSpec")]
pub struct Mount {
    pub kind: MountKind,
    pub source: Option<String>,
    pub target: Option<String>,
}

impl Mount {
    /// Parses `source:target[:mode]`. Sources that look like paths are binds.
    pub fn from_short(spec: &str) -> Self {
        let mut parts = spec.splitn(3, ':');
        let first = parts.next().unwrap_or_default();
        match parts.next() {
            Some(target) => {
                let is_path = first.starts_with('.') || first.starts_with('/') || first.starts_with('~');
                Self {
                    kind: if is_path { MountKind::Bind } else { MountKind::Volume },
                    source: Some(first.to_string()),
                    target: Some(target.to_string()),
                }
            }
            None => Self {
                kind: MountKind::Volume,
                source: None,
                target: Some(first.to_string()),
            },
        }
    }
}

impl From<MountSpec> for Mount {
    fn from(spec: MountSpec) -> Self {
        match spec {
            MountSpec::Long {
                mount_type,
                source,
                target,
            } => {
                let kind = match mount_type.as_str() {
                    "bind" => MountKind::Bind,
                    "volume" => MountKind::Volume,
                    _ => MountKind::Other,
                };
                Self { kind, source, target }
            }
            MountSpec::Short(spec) => Self::from_short(&spec),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortInput {
    Long {
        #[serde(default, deserialize_with = "deserialize_scalar_opt")]
        published: Option<String>,
        #[serde(default, deserialize_with = "deserialize_scalar_opt")]
        target: Option<String>,
        #[serde(default)]
        protocol: Option<String>,
    },
    Short(Scalar),
}

/// Published port, in canonical order
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "PortInput")]
pub struct PortSpec {
    pub published: Option<String>,
    pub target: Option<String>,
    pub protocol: Option<String>,
}

impl PortSpec {
    /// Parses `[ip:]host:container[/proto]` or a bare container port
    pub fn from_short(spec: &str) -> Self {
        let (ports, protocol) = match spec.split_once('/') {
            Some((ports, proto)) => (ports, Some(proto.to_string())),
            None => (spec, None),
        };
        match ports.rsplit_once(':') {
            Some((host, container)) => {
                let published = host.rsplit_once(':').map(|(_, p)| p).unwrap_or(host);
                Self {
                    published: (!published.is_empty()).then(|| published.to_string()),
                    target: Some(container.to_string()),
                    protocol,
                }
            }
            None => Self {
                published: None,
                target: Some(ports.to_string()),
                protocol,
            },
        }
    }

    /// Host port as a number. `None` when unpublished; `Err` for ranges and
    /// other non-numeric forms.
    pub fn published_port(&self) -> Option<Result<u16, String>> {
        let published = self.published.as_deref().filter(|p| !p.is_empty())?;
        Some(published.parse::<u16>().map_err(|_| published.to_string()))
    }
}

impl From<PortInput> for PortSpec {
    fn from(input: PortInput) -> Self {
        match input {
            PortInput::Long {
                published,
                target,
                protocol,
            } => Self {
                published,
                target,
                protocol,
            },
            PortInput::Short(scalar) => Self::from_short(&scalar.into_string()),
        }
    }
}
