//! Utility modules for compose-role

pub mod logging;

pub use logging::{init_logging, LoggingConfig};
