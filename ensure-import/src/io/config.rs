//! Process-wide recovery policy stored in `ensure-import.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::packages::builtin_packages;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "ensure-import.toml";

/// Recovery policy (TOML).
///
/// Shared by every handler of a [`Recovery`](crate::registry::Recovery)
/// context. Missing fields default to the values below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Remediation cycles a handler may run before the failure surfaces.
    pub max_attempts: u32,

    /// Cycles that extend an explicit search path before giving up.
    pub search_path_attempts: u32,

    /// Interpreter used for probes, venv creation and direct installs.
    pub python: String,

    /// Environment directory names under the working directory, in lookup
    /// order. The first one is created when none exists.
    pub venv_dirs: Vec<String>,

    /// How many ancestor levels to search for a project marker file.
    pub marker_search_depth: u32,

    /// Process argument that disables every installation.
    pub no_install_flag: String,

    /// Kill collaborator commands after this many seconds (unset: wait forever).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,

    /// Truncate captured probe output beyond this many bytes.
    pub capture_output_limit_bytes: usize,

    /// Extra import-name to package-name mappings, shadowing the built-ins.
    pub packages: BTreeMap<String, String>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            search_path_attempts: 2,
            python: default_python().to_string(),
            venv_dirs: vec!["venv".to_string(), ".venv".to_string()],
            marker_search_depth: 3,
            no_install_flag: "--no-install".to_string(),
            command_timeout_secs: None,
            capture_output_limit_bytes: 100_000,
            packages: BTreeMap::new(),
        }
    }
}

fn default_python() -> &'static str {
    if cfg!(windows) { "python" } else { "python3" }
}

impl RecoveryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.python.trim().is_empty() {
            return Err(anyhow!("python must be a non-empty command"));
        }
        if self.venv_dirs.is_empty() || self.venv_dirs.iter().any(|d| d.trim().is_empty()) {
            return Err(anyhow!("venv_dirs must be a non-empty array of names"));
        }
        if self.no_install_flag.trim().is_empty() {
            return Err(anyhow!("no_install_flag must be non-empty"));
        }
        if self.command_timeout_secs == Some(0) {
            return Err(anyhow!("command_timeout_secs must be > 0 when set"));
        }
        if self.capture_output_limit_bytes == 0 {
            return Err(anyhow!("capture_output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    /// Built-in package table with this file's `[packages]` on top.
    pub fn package_defaults(&self) -> BTreeMap<String, String> {
        let mut table = builtin_packages();
        table.extend(
            self.packages
                .iter()
                .map(|(module, package)| (module.clone(), package.clone())),
        );
        table
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RecoveryConfig::default()`.
pub fn load_config(path: &Path) -> Result<RecoveryConfig> {
    if !path.exists() {
        let cfg = RecoveryConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RecoveryConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RecoveryConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
