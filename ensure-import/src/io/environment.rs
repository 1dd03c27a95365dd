//! Environment abstraction for process execution and filesystem probing.
//!
//! The [`Environment`] trait decouples remediation from the machine it runs
//! on. [`System`] talks to the real interpreter and filesystem; tests use
//! scripted environments that record commands without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::io::config::RecoveryConfig;
use crate::io::process::{ShellCommand, run_captured, run_status};

const ISOLATION_PROBE: &str = "import sys; print(getattr(sys, 'real_prefix', None) is not None or sys.base_prefix != sys.prefix)";

/// Collaborators the recovery core needs from the outside world.
pub trait Environment {
    /// Run a command to completion; returns its exit code.
    fn execute(&self, command: &ShellCommand) -> Result<i32>;

    /// Run a command and return its stdout. A nonzero exit is an error.
    fn capture(&self, command: &ShellCommand) -> Result<String>;

    /// Interpreter of the current process environment.
    fn current_python(&self) -> PathBuf;

    /// Whether the current interpreter already runs inside an isolated environment.
    fn is_isolated(&self) -> bool;

    /// Arguments the process was invoked with.
    fn args(&self) -> Vec<String>;

    fn current_dir(&self) -> Result<PathBuf>;

    fn directory_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn find_site_packages(&self, root: &Path) -> Option<PathBuf> {
        find_site_packages(root)
    }

    fn resolve_installer_python(&self, venv_root: &Path) -> PathBuf {
        venv_python(venv_root)
    }

    fn module_present(&self, site_packages: &Path, module: &str) -> bool {
        module_present(site_packages, module)
    }
}

/// Environment backed by real processes and the real filesystem.
#[derive(Debug, Clone)]
pub struct System {
    python: PathBuf,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
}

impl System {
    pub fn new(python: impl Into<PathBuf>) -> Self {
        let defaults = RecoveryConfig::default();
        Self {
            python: python.into(),
            timeout: defaults.command_timeout(),
            output_limit_bytes: defaults.capture_output_limit_bytes,
        }
    }

    pub fn from_config(cfg: &RecoveryConfig) -> Self {
        Self {
            python: PathBuf::from(&cfg.python),
            timeout: cfg.command_timeout(),
            output_limit_bytes: cfg.capture_output_limit_bytes,
        }
    }
}

impl Default for System {
    fn default() -> Self {
        Self::from_config(&RecoveryConfig::default())
    }
}

impl Environment for System {
    fn execute(&self, command: &ShellCommand) -> Result<i32> {
        run_status(command, self.timeout)
    }

    fn capture(&self, command: &ShellCommand) -> Result<String> {
        let output = run_captured(command, self.timeout, self.output_limit_bytes)?;
        if output.timed_out {
            return Err(anyhow!("{command} timed out"));
        }
        if !output.status.success() {
            return Err(anyhow!(
                "{command} failed with status {:?}: {}",
                output.status.code(),
                output.stderr_text().trim()
            ));
        }
        Ok(output.stdout_text())
    }

    fn current_python(&self) -> PathBuf {
        self.python.clone()
    }

    fn is_isolated(&self) -> bool {
        let probe = ShellCommand::new(&self.python).args(["-c", ISOLATION_PROBE]);
        match self.capture(&probe) {
            Ok(out) => {
                let isolated = out.trim() == "True";
                debug!(isolated, "interpreter isolation probe");
                isolated
            }
            Err(err) => {
                warn!(err = %err, "isolation probe failed, falling back to VIRTUAL_ENV");
                std::env::var_os("VIRTUAL_ENV").is_some()
            }
        }
    }

    fn args(&self) -> Vec<String> {
        std::env::args().collect()
    }

    fn current_dir(&self) -> Result<PathBuf> {
        Ok(std::env::current_dir()?)
    }
}

/// Interpreter inside a virtual environment root.
pub fn venv_python(root: &Path) -> PathBuf {
    if cfg!(windows) {
        root.join("Scripts").join("python.exe")
    } else {
        root.join("bin").join("python")
    }
}

/// First `site-packages` directory under `root`, in sorted walk order.
pub fn find_site_packages(root: &Path) -> Option<PathBuf> {
    WalkDir::new(root)
        .max_depth(4)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| entry.file_type().is_dir() && entry.file_name() == "site-packages")
        .map(|entry| entry.into_path())
}

/// Whether `module` is importable from `site_packages` as a package,
/// a plain module or an extension module.
pub fn module_present(site_packages: &Path, module: &str) -> bool {
    if site_packages.join(module).is_dir() || site_packages.join(format!("{module}.py")).is_file()
    {
        return true;
    }
    let Ok(entries) = fs::read_dir(site_packages) else {
        return false;
    };
    let prefix = format!("{module}.");
    entries.filter_map(Result::ok).any(|entry| {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        name.starts_with(&prefix) && (name.ends_with(".so") || name.ends_with(".pyd"))
    })
}
