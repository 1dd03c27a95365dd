//! Import failure model shared by the guard and the remediation planner.
//!
//! An import mechanism reports the missing module structurally when it can
//! (`ImportFailure::missing`). Failures that only carry a human-readable
//! message fall back to extracting quoted identifiers from the text.

use thiserror::Error;

/// A failed import inside a guarded block.
///
/// `Display` renders the original message unchanged, so a failure surfaced
/// after exhausted retries reads exactly like the one the block produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ImportFailure {
    missing: Vec<String>,
    message: String,
}

impl ImportFailure {
    /// Failure for a single module the import mechanism could not find.
    pub fn missing(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            message: format!("No module named '{name}'"),
            missing: vec![name],
        }
    }

    /// Failure with explicit missing names and the mechanism's own message.
    pub fn new(missing: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            missing,
            message: message.into(),
        }
    }

    /// Failure known only by its message text.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            missing: Vec::new(),
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Names reported structurally by the import mechanism.
    pub fn reported(&self) -> &[String] {
        &self.missing
    }

    /// Top-level module names that remediation should make importable.
    ///
    /// Structured names win; the message is only parsed when none were
    /// reported. Order of first appearance is kept and duplicates dropped.
    pub fn candidate_modules(&self) -> Vec<String> {
        let raw: Vec<String> = if self.missing.is_empty() {
            quoted_identifiers(&self.message)
        } else {
            self.missing.clone()
        };
        let mut names: Vec<String> = Vec::new();
        for name in raw {
            let top = top_level(&name);
            if top.is_empty() || names.iter().any(|n| n == top) {
                continue;
            }
            names.push(top.to_string());
        }
        names
    }
}

/// Extract `'identifier'` tokens from an import error message.
pub fn quoted_identifiers(message: &str) -> Vec<String> {
    use std::sync::LazyLock;
    static QUOTED_RE: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"'([A-Za-z_][0-9A-Za-z_.\-]*)'").unwrap());
    QUOTED_RE
        .captures_iter(message)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn top_level(name: &str) -> &str {
    name.split('.').next().unwrap_or(name).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_builds_standard_message() {
        let failure = ImportFailure::missing("six");
        assert_eq!(failure.to_string(), "No module named 'six'");
        assert_eq!(failure.candidate_modules(), vec!["six"]);
    }

    #[test]
    fn message_fallback_extracts_quoted_names() {
        let failure = ImportFailure::from_message("No module named 'tortoise.fields'");
        assert_eq!(failure.candidate_modules(), vec!["tortoise"]);
    }

    #[test]
    fn message_fallback_keeps_every_distinct_name() {
        let failure =
            ImportFailure::from_message("cannot import 'pytz', 'six' or 'pytz.tz' from module");
        assert_eq!(failure.candidate_modules(), vec!["pytz", "six"]);
    }

    #[test]
    fn message_without_quotes_has_no_candidates() {
        let failure = ImportFailure::from_message("import machinery exploded");
        assert!(failure.candidate_modules().is_empty());
    }

    #[test]
    fn structured_names_take_precedence_over_message() {
        let failure = ImportFailure::new(vec!["dotenv".to_string()], "something about 'other'");
        assert_eq!(failure.candidate_modules(), vec!["dotenv"]);
        assert_eq!(failure.message(), "something about 'other'");
    }
}
