//! Scoped-import guard: run an import block and turn import failures into
//! remediation plus a retry signal.
//!
//! Callers drive the loop themselves with [`Handle::should_retry`] and
//! [`Handle::guard`], or let [`Handle::run`] do it:
//!
//! ```ignore
//! let mut handle = recovery.handler(&ConfigArgs::new());
//! let modules = handle.run(|path| importer.import(&names, path))?;
//! ```

use tracing::{debug, error, info, instrument, warn};

use crate::core::config::ResolvedConfig;
use crate::core::failure::ImportFailure;
use crate::core::search_path::SearchPath;
use crate::error::{BlockError, GuardError, Unresolved};
use crate::exit_codes;
use crate::io::environment::Environment;
use crate::registry::Handle;
use crate::remediate::{RemediationRequest, plan, remediate};

/// Result of one guarded cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    /// The block completed; no further cycle is needed.
    Ready(T),
    /// The environment was changed; run the block again.
    Retry,
}

impl<E: Environment> Handle<'_, E> {
    /// Run `body` once against the current search path.
    #[instrument(skip_all, fields(attempt = self.attempt_count()))]
    pub fn guard<T, F>(&mut self, body: F) -> Result<Attempt<T>, GuardError>
    where
        F: FnOnce(&SearchPath) -> Result<T, BlockError>,
    {
        match body(&*self.search_path) {
            Ok(value) => {
                self.handler.retry_mut().mark_success();
                debug!("guarded block completed");
                Ok(Attempt::Ready(value))
            }
            Err(BlockError::Other(err)) => {
                self.handler.retry_mut().mark_unrelated();
                debug!("unrelated failure in guarded block");
                Err(GuardError::Other(err))
            }
            Err(BlockError::Import(failure)) => {
                self.handler.retry_mut().mark_failure();
                info!(message = failure.message(), "import failed");
                self.recover(failure)
            }
        }
    }

    /// Drive `body` until it completes or recovery gives up.
    pub fn run<T, F>(&mut self, mut body: F) -> Result<T, GuardError>
    where
        F: FnMut(&SearchPath) -> Result<T, BlockError>,
    {
        let mut ready = None;
        while self.should_retry() {
            if let Attempt::Ready(value) = self.guard(&mut body)? {
                ready = Some(value);
            }
        }
        ready.ok_or_else(|| GuardError::Exhausted {
            attempts: self.attempt_count(),
        })
    }

    /// Like [`Handle::run`], but terminates the process when the handler is
    /// configured to exit on fatal failures.
    pub fn run_or_exit<T, F>(&mut self, body: F) -> Result<T, GuardError>
    where
        F: FnMut(&SearchPath) -> Result<T, BlockError>,
    {
        let result = self.run(body);
        if let Err(err) = &result
            && let Some(code) = exit_status(self.config(), err)
        {
            error!(code, err = %err, "import recovery failed");
            std::process::exit(code);
        }
        result
    }

    fn recover<T>(&mut self, failure: ImportFailure) -> Result<Attempt<T>, GuardError> {
        if self.config().has_search_path() {
            return self.apply_search_path(failure);
        }
        if self.handler.retry().exhausted() {
            warn!(
                attempts = self.attempt_count(),
                message = failure.message(),
                "retries exhausted"
            );
            return Err(unresolved(failure, Unresolved::Exhausted));
        }

        let workdir = self.working_directory().map_err(GuardError::Other)?;
        let request = RemediationRequest {
            failure: &failure,
            packages: self.handler.packages(),
            config: self.handler.config(),
            workdir: &workdir,
            policy: self.policy,
        };
        let plan = match plan(self.env, &request) {
            Ok(plan) => plan,
            Err(reason) => return Err(unresolved(failure, reason)),
        };
        let report = remediate(self.env, &plan, self.policy, self.search_path, self.targets)?;
        info!(
            packages = ?report.packages,
            installed = report.installed,
            python = %report.target.python().display(),
            "remediation complete, retrying"
        );
        Ok(Attempt::Retry)
    }

    /// Extend the search path with the configured entries for a bounded
    /// number of attempts instead of installing anything.
    fn apply_search_path<T>(&mut self, failure: ImportFailure) -> Result<Attempt<T>, GuardError> {
        if self.handler.retry().exhausted()
            || self.attempt_count() > self.policy.search_path_attempts
        {
            warn!(
                attempts = self.attempt_count(),
                message = failure.message(),
                "configured search path did not resolve import"
            );
            return Err(unresolved(failure, Unresolved::SearchPathExhausted));
        }
        let workdir = self.working_directory().map_err(GuardError::Other)?;
        for entry in &self.handler.config().search_path {
            let entry = if entry.is_absolute() {
                entry.clone()
            } else {
                workdir.join(entry)
            };
            if self.search_path.extend(&entry) {
                info!(entry = %entry.display(), "search path extended");
            }
        }
        Ok(Attempt::Retry)
    }
}

fn unresolved(failure: ImportFailure, reason: Unresolved) -> GuardError {
    debug!(reason = reason.as_str(), "import failure left unresolved");
    GuardError::Unresolved { failure, reason }
}

/// Exit status for `err` under `config`, or `None` to return it to the caller.
///
/// Only fatal outcomes exit: remediation failures and exhausted retries.
pub fn exit_status(config: &ResolvedConfig, err: &GuardError) -> Option<i32> {
    if !config.exit_on_failure {
        return None;
    }
    match err {
        GuardError::Remediation(err) => Some(err.exit_code()),
        GuardError::Unresolved {
            reason: Unresolved::Exhausted,
            ..
        }
        | GuardError::Exhausted { .. } => Some(exit_codes::UNRESOLVED),
        GuardError::Unresolved { .. } | GuardError::Other(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;
    use std::path::PathBuf;

    use anyhow::anyhow;

    use crate::core::config::{ConfigArgs, resolve};
    use crate::error::RemediationError;
    use crate::io::config::RecoveryConfig;
    use crate::registry::Recovery;
    use crate::test_support::{ScriptedEnv, importable};

    fn require(path: &SearchPath, module: &str) -> Result<(), BlockError> {
        if importable(path, module) {
            Ok(())
        } else {
            Err(ImportFailure::missing(module).into())
        }
    }

    fn policy(max_attempts: u32) -> RecoveryConfig {
        RecoveryConfig {
            max_attempts,
            ..RecoveryConfig::default()
        }
    }

    #[test]
    fn missing_module_is_installed_then_imported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ctx = Recovery::new(ScriptedEnv::new(temp.path()), policy(30));
        let calls = Cell::new(0);

        let mut handle = ctx.handler(&ConfigArgs::new());
        handle
            .run(|path| {
                calls.set(calls.get() + 1);
                require(path, "sample_pkg")
            })
            .expect("run");
        assert!(handle.succeeded());
        drop(handle);

        assert_eq!(calls.get(), 2);
        assert_eq!(ctx.env().venv_creations(), 1);
        assert_eq!(ctx.env().installs(), vec![vec!["sample_pkg".to_string()]]);
        let site = temp.path().join("venv/lib/python3.12/site-packages");
        assert!(ctx.search_path().contains(&site));
    }

    #[test]
    fn permanent_failure_surfaces_after_max_attempts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ctx = Recovery::new(ScriptedEnv::new(temp.path()), policy(3));
        let calls = Cell::new(0);

        let err = ctx
            .handler(&ConfigArgs::new())
            .run(|_path| -> Result<(), BlockError> {
                calls.set(calls.get() + 1);
                Err(ImportFailure::missing("ghost").into())
            })
            .unwrap_err();

        assert_eq!(calls.get(), 4);
        assert_eq!(err.unresolved_reason(), Some(Unresolved::Exhausted));
        assert_eq!(err.to_string(), "No module named 'ghost'");
        assert_eq!(err.exit_code(), exit_codes::UNRESOLVED);
        // The first install leaves `ghost/` behind, so later cycles skip pip.
        assert_eq!(ctx.env().installs().len(), 1);
    }

    #[test]
    fn exhausted_handler_stops_without_running_block() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ctx = Recovery::new(ScriptedEnv::new(temp.path()), policy(1));
        let args = ConfigArgs::new();
        let failing = |_: &SearchPath| -> Result<(), BlockError> {
            Err(ImportFailure::missing("ghost").into())
        };

        let first = ctx.handler(&args).run(failing).unwrap_err();
        assert_eq!(first.unresolved_reason(), Some(Unresolved::Exhausted));

        let ran = Cell::new(false);
        let second = ctx
            .handler(&args)
            .run(|_| -> Result<(), BlockError> {
                ran.set(true);
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(second, GuardError::Exhausted { attempts: 2 }));
        assert!(!ran.get());

        ctx.reset();
        ctx.handler(&args).run(|_| Ok(())).expect("fresh handler");
    }

    #[test]
    fn completed_handler_rearms_for_next_block() {
        let mut ctx = Recovery::new(ScriptedEnv::new("/work"), policy(30));
        let args = ConfigArgs::new();

        assert_eq!(ctx.handler(&args).run(|_| Ok(1)).expect("first"), 1);
        assert_eq!(ctx.handler(&args).run(|_| Ok(2)).expect("second"), 2);
    }

    #[test]
    fn unrelated_error_propagates_and_looks_finished() {
        let mut ctx = Recovery::new(ScriptedEnv::new("/work"), policy(30));
        let mut handle = ctx.handler(&ConfigArgs::new());

        assert!(handle.should_retry());
        let err = handle
            .guard(|_| -> Result<(), BlockError> { Err(anyhow!("disk full").into()) })
            .unwrap_err();

        assert!(matches!(err, GuardError::Other(_)));
        assert_eq!(err.to_string(), "disk full");
        assert!(handle.succeeded());
        assert!(!handle.is_trying());
        assert!(!handle.should_retry());
        assert!(handle.should_retry());
    }

    #[test]
    fn search_path_override_is_bounded() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ctx = Recovery::new(ScriptedEnv::new(temp.path()), policy(30));
        let args = ConfigArgs::new().search_path("vendor");
        let calls = Cell::new(0);

        let err = ctx
            .handler(&args)
            .run(|path| {
                calls.set(calls.get() + 1);
                require(path, "sample_pkg")
            })
            .unwrap_err();

        assert_eq!(calls.get(), 3);
        assert_eq!(err.unresolved_reason(), Some(Unresolved::SearchPathExhausted));
        assert!(ctx.search_path().contains(&temp.path().join("vendor")));
        assert_eq!(ctx.search_path().len(), 1);
        assert!(ctx.env().installs().is_empty());
        assert_eq!(ctx.env().venv_creations(), 0);
    }

    #[test]
    fn search_path_override_within_small_budget_keeps_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ctx = Recovery::new(ScriptedEnv::new(temp.path()), policy(1));
        let calls = Cell::new(0);

        let err = ctx
            .handler(&ConfigArgs::new().search_path("vendor"))
            .run(|_| -> Result<(), BlockError> {
                calls.set(calls.get() + 1);
                Err(ImportFailure::missing("ghost").into())
            })
            .unwrap_err();

        assert_eq!(calls.get(), 2);
        assert_eq!(err.unresolved_reason(), Some(Unresolved::SearchPathExhausted));
        assert_eq!(err.import_failure(), Some(&ImportFailure::missing("ghost")));
        assert!(ctx.search_path().contains(&temp.path().join("vendor")));
    }

    #[test]
    fn reused_handler_keeps_succeeding() {
        let mut ctx = Recovery::new(ScriptedEnv::new("/work"), policy(3));
        let args = ConfigArgs::new();

        for block in 0..50 {
            assert_eq!(ctx.handler(&args).run(|_| Ok(block)).expect("run"), block);
        }
        assert_eq!(ctx.handler(&args).attempt_count(), 0);
    }

    #[test]
    fn search_path_override_resolves_import() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vendor = temp.path().join("vendor");
        fs::create_dir_all(vendor.join("sample_pkg")).expect("mkdir");
        let mut ctx = Recovery::new(ScriptedEnv::new(temp.path()), policy(30));

        ctx.handler(&ConfigArgs::new().search_path(&vendor))
            .run(|path| require(path, "sample_pkg"))
            .expect("run");
        assert_eq!(ctx.search_path().entries(), &[vendor]);
    }

    #[test]
    fn no_install_argument_returns_original_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let env = ScriptedEnv::new(temp.path()).with_args(["app.py", "--no-install"]);
        let mut ctx = Recovery::new(env, policy(30));

        let err = ctx
            .handler(&ConfigArgs::new())
            .run(|path| require(path, "sample_pkg"))
            .unwrap_err();

        assert_eq!(err.unresolved_reason(), Some(Unresolved::InstallDisabled));
        assert_eq!(err.import_failure(), Some(&ImportFailure::missing("sample_pkg")));
        assert!(ctx.env().commands().is_empty());
    }

    #[test]
    fn install_disabled_by_config_returns_original_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ctx = Recovery::new(ScriptedEnv::new(temp.path()), policy(30));

        let err = ctx
            .handler(&ConfigArgs::new().install(false))
            .run(|path| require(path, "sample_pkg"))
            .unwrap_err();

        assert_eq!(err.unresolved_reason(), Some(Unresolved::InstallDisabled));
        assert!(ctx.env().installs().is_empty());
    }

    #[test]
    fn installer_failure_is_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let env = ScriptedEnv::new(temp.path()).with_install_status(1);
        let mut ctx = Recovery::new(env, policy(30));

        let err = ctx
            .handler(&ConfigArgs::new())
            .run(|path| require(path, "sample_pkg"))
            .unwrap_err();

        assert!(matches!(
            err,
            GuardError::Remediation(RemediationError::Installer { .. })
        ));
        assert_eq!(err.exit_code(), exit_codes::INSTALL_FAILED);
    }

    #[test]
    fn custom_package_mapping_is_installed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ctx = Recovery::new(ScriptedEnv::new(temp.path()), policy(2));
        let args = ConfigArgs::new().package("sample_pkg", "sample-distribution");

        // The simulated installer creates `sample-distribution/`, never the
        // module itself, so the import keeps failing until exhaustion.
        let _ = ctx.handler(&args).run(|path| require(path, "sample_pkg"));
        assert_eq!(
            ctx.env().installs().first(),
            Some(&vec!["sample-distribution".to_string()])
        );
    }

    #[test]
    fn exit_status_only_for_fatal_errors_when_enabled() {
        let exits = resolve(&ConfigArgs::new());
        let returns = resolve(&ConfigArgs::new().search_path(PathBuf::from("vendor")));
        let exhausted = GuardError::Unresolved {
            failure: ImportFailure::missing("six"),
            reason: Unresolved::Exhausted,
        };
        let disabled = GuardError::Unresolved {
            failure: ImportFailure::missing("six"),
            reason: Unresolved::InstallDisabled,
        };
        let create = GuardError::Remediation(RemediationError::EnvironmentCreation {
            root: PathBuf::from("venv"),
            detail: "exit status 1".to_string(),
        });

        assert_eq!(exit_status(&exits, &exhausted), Some(exit_codes::UNRESOLVED));
        assert_eq!(exit_status(&exits, &create), Some(exit_codes::ENV_CREATE_FAILED));
        assert_eq!(
            exit_status(&exits, &GuardError::Exhausted { attempts: 31 }),
            Some(exit_codes::UNRESOLVED)
        );
        assert_eq!(exit_status(&exits, &disabled), None);
        assert_eq!(exit_status(&exits, &GuardError::Other(anyhow!("x"))), None);
        assert_eq!(exit_status(&returns, &exhausted), None);
        assert_eq!(exit_status(&returns, &create), None);
    }
}
