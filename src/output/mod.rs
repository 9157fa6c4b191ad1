pub mod schema;

pub use schema::{DatabaseKind, DefaultValue, DefaultVariable, ImageTag, OutputDocument};
