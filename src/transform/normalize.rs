//! Canonical variable-name tokens

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

fn separator_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s-]+").expect("valid regex"))
}

/// Lowercases `name` and collapses each whitespace/hyphen run into one `_`.
///
/// Idempotent: the output contains neither whitespace nor hyphens.
pub fn normalize_key(name: &str) -> String {
    separator_regex()
        .replace_all(&name.to_lowercase(), "_")
        .into_owned()
}

/// Identifier for an env file: its basename with `.` folded to `_`.
pub fn file_name_id(path: &str) -> String {
    let basename = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path);
    normalize_key(&basename.replace('.', "_"))
}
