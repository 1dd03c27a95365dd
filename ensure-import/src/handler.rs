//! The stateful recovery handler kept by the registry.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::config::{ConfigArgs, ResolvedConfig, resolve, working_directory};
use crate::core::packages::PackageMap;
use crate::core::retry::RetryState;
use crate::io::environment::Environment;

/// Attempt history and resolved configuration for one configuration key.
#[derive(Debug, Clone)]
pub struct RecoveryHandler {
    key: ConfigArgs,
    config: ResolvedConfig,
    retry: RetryState,
    packages: PackageMap,
    workdir: Option<PathBuf>,
}

impl RecoveryHandler {
    pub fn new(
        key: ConfigArgs,
        max_attempts: u32,
        package_defaults: &BTreeMap<String, String>,
    ) -> Self {
        let config = resolve(&key);
        let packages = PackageMap::merged(package_defaults, &key.packages);
        Self {
            key,
            config,
            retry: RetryState::new(max_attempts),
            packages,
            workdir: None,
        }
    }

    pub fn key(&self) -> &ConfigArgs {
        &self.key
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn retry(&self) -> &RetryState {
        &self.retry
    }

    pub fn retry_mut(&mut self) -> &mut RetryState {
        &mut self.retry
    }

    pub fn packages(&self) -> &PackageMap {
        &self.packages
    }

    /// Working directory, resolved on first use and cached for the handler's lifetime.
    pub fn working_directory(&mut self, env: &impl Environment) -> Result<PathBuf> {
        if let Some(dir) = &self.workdir {
            return Ok(dir.clone());
        }
        let cwd = env.current_dir().context("resolve current directory")?;
        let dir = working_directory(self.config.workdir.as_deref(), &cwd, |p| env.is_file(p));
        debug!(workdir = %dir.display(), "working directory resolved");
        self.workdir = Some(dir.clone());
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packages::builtin_packages;
    use crate::test_support::ScriptedEnv;

    #[test]
    fn working_directory_is_cached_after_first_use() {
        let first = tempfile::tempdir().expect("tempdir");
        let second = tempfile::tempdir().expect("tempdir");
        let mut handler = RecoveryHandler::new(ConfigArgs::new(), 30, &builtin_packages());

        let resolved = handler
            .working_directory(&ScriptedEnv::new(first.path()))
            .expect("workdir");
        assert_eq!(resolved, first.path());

        let cached = handler
            .working_directory(&ScriptedEnv::new(second.path()))
            .expect("workdir");
        assert_eq!(cached, first.path());
    }

    #[test]
    fn script_path_resolves_to_its_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("app.py");
        std::fs::write(&script, "").expect("write");
        let mut handler =
            RecoveryHandler::new(ConfigArgs::new().workdir(&script), 30, &builtin_packages());

        let dir = handler
            .working_directory(&ScriptedEnv::new("/unused"))
            .expect("workdir");
        assert_eq!(dir, temp.path());
    }

    #[test]
    fn overrides_are_instance_local() {
        let defaults = builtin_packages();
        let custom = RecoveryHandler::new(
            ConfigArgs::new().package("dotenv", "dotenv-fork"),
            30,
            &defaults,
        );
        let plain = RecoveryHandler::new(ConfigArgs::new(), 30, &defaults);
        assert_eq!(custom.packages().translate("dotenv"), "dotenv-fork");
        assert_eq!(plain.packages().translate("dotenv"), "python-dotenv");
    }
}
