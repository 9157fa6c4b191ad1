//! Output formatting for the transformation document
//!
//! # Example
//!
//! ```ignore
//! use compose_role::cli::output::{OutputFormat, OutputFormatter};
//!
//! let formatter = OutputFormatter::new(OutputFormat::Yaml);
//! let output = formatter.format(&document)?;
//! println!("{}", output);
//! ```

use anyhow::Result;

use crate::output::OutputDocument;

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format (human-friendly, version-control friendly)
    Yaml,
}

/// Output formatter for transformation results
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a document according to the configured format, newline-terminated
    pub fn format(&self, document: &OutputDocument) -> Result<String> {
        let mut text = match self.format {
            OutputFormat::Json => document.to_json()?,
            OutputFormat::Yaml => document.to_yaml()?,
        };
        if !text.ends_with('\n') {
            text.push('\n');
        }
        Ok(text)
    }
}
