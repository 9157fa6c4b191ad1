//! compose-role - turn a docker-compose descriptor into deployment-role defaults
//!
//! The library canonicalizes a compose descriptor through the compose CLI, walks
//! every service and extracts its configuration into prefixed default variables,
//! then rewrites the as-authored descriptor so it references those variables.
//! Secret-looking values become lookup expressions for a secret store.
//!
//! # Example Usage
//!
//! ```no_run
//! use compose_role::{transform_descriptor, ComposeCli, DefaultsPrefix, RealFileSystem, RoleConfig};
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = RoleConfig::new(DefaultsPrefix::parse("myapp")?).with_role_name("myapp");
//! let document = transform_descriptor(
//!     &config,
//!     Path::new("/srv/myapp/docker-compose.yml"),
//!     &RealFileSystem,
//!     &ComposeCli::default(),
//! )?;
//!
//! println!("{}", document.to_yaml()?);
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`compose`]: canonical descriptor model and the compose CLI adapter
//! - [`transform`]: secret classification, env sources, the variable registry,
//!   the service walker and the descriptor rewriter
//! - [`output`]: the output document schema
//! - [`cli`]: command-line arguments and output formatting

pub mod cli;
pub mod compose;
pub mod config;
pub mod error;
pub mod fs;
pub mod output;
pub mod transform;
pub mod util;

pub use compose::{Canonicalizer, ComposeCli};
pub use config::{ConfigError, DefaultsPrefix, RoleConfig, SecretPathTemplate};
pub use error::{CanonicalizeError, TransformError};
pub use fs::{FileSystem, MockFileSystem, RealFileSystem};
pub use output::{DefaultValue, DefaultVariable, OutputDocument};
pub use transform::transform_descriptor;
pub use util::{init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
