pub mod commands;
pub mod output;

pub use commands::{CliArgs, OutputFormatArg, SecretProviderArg};
pub use output::{OutputFormat, OutputFormatter};
