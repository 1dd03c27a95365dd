//! Module search path handed to guarded blocks.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Ordered, duplicate-free, append-only list of module directories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    entries: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from an existing `PYTHONPATH`-style value (platform separator).
    pub fn from_env_value(value: &std::ffi::OsStr) -> Self {
        let mut path = Self::new();
        for entry in std::env::split_paths(value) {
            if !entry.as_os_str().is_empty() {
                path.extend(entry);
            }
        }
        path
    }

    /// Append `entry` unless already present. Returns whether it was appended.
    pub fn extend(&mut self, entry: impl Into<PathBuf>) -> bool {
        let entry = entry.into();
        if self.contains(&entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn contains(&self, entry: &Path) -> bool {
        self.entries.iter().any(|existing| existing == entry)
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as a `PYTHONPATH` value.
    pub fn to_env_value(&self) -> OsString {
        std::env::join_paths(&self.entries).unwrap_or_else(|_| {
            // An entry containing the separator cannot be joined; keep the rest usable.
            let usable: Vec<&PathBuf> = self
                .entries
                .iter()
                .filter(|entry| std::env::join_paths([entry]).is_ok())
                .collect();
            std::env::join_paths(usable).unwrap_or_default()
        })
    }
}
