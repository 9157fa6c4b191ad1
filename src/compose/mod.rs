//! Compose descriptors: the typed canonical model and how it is produced

pub mod canonicalize;
pub mod model;

pub use canonicalize::{parse_canonical, CanonicalDescriptor, Canonicalizer, ComposeCli};
pub use model::{ComposeModel, Mount, MountKind, PortSpec, Service};
pub use crate::error::CanonicalizeError;
