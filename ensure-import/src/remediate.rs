//! Remediation: turn an import failure into an installed, importable package.
//!
//! [`plan`] decides whether a failure can be remediated at all and which
//! packages to install. [`remediate`] picks the install target (current
//! interpreter, project manager environment or a local virtual environment),
//! extends the search path with its site-packages and runs the installer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::core::config::ResolvedConfig;
use crate::core::failure::ImportFailure;
use crate::core::packages::PackageMap;
use crate::core::search_path::SearchPath;
use crate::error::{RemediationError, Unresolved};
use crate::io::config::RecoveryConfig;
use crate::io::environment::Environment;
use crate::io::process::ShellCommand;
use crate::io::project::{ProjectManager, find_project, manager_available};

/// Inputs for planning one remediation.
#[derive(Debug, Clone, Copy)]
pub struct RemediationRequest<'a> {
    pub failure: &'a ImportFailure,
    pub packages: &'a PackageMap,
    pub config: &'a ResolvedConfig,
    pub workdir: &'a Path,
    pub policy: &'a RecoveryConfig,
}

/// What to install, and where the environment decision is made from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationPlan {
    /// Missing top-level modules, in the order the failure named them.
    pub modules: Vec<String>,
    /// Installable package names for `modules`.
    pub packages: Vec<String>,
    pub workdir: PathBuf,
    pub use_venv: bool,
}

/// Interpreter that receives the installed packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallTarget {
    /// The current interpreter (already isolated, or venvs disabled).
    Current { python: PathBuf },
    /// The environment of a Poetry/PDM project.
    Managed {
        manager: ProjectManager,
        python: PathBuf,
        site_packages: Option<PathBuf>,
    },
    /// A `venv`/`.venv` directory under the working directory.
    VirtualEnv {
        root: PathBuf,
        python: PathBuf,
        site_packages: PathBuf,
    },
}

impl InstallTarget {
    pub fn python(&self) -> &Path {
        match self {
            InstallTarget::Current { python }
            | InstallTarget::Managed { python, .. }
            | InstallTarget::VirtualEnv { python, .. } => python,
        }
    }

    pub fn site_packages(&self) -> Option<&Path> {
        match self {
            InstallTarget::Current { .. } => None,
            InstallTarget::Managed { site_packages, .. } => site_packages.as_deref(),
            InstallTarget::VirtualEnv { site_packages, .. } => Some(site_packages),
        }
    }
}

/// Install targets already ensured in this context, keyed by working
/// directory and venv policy. Cleared by `Recovery::reset`.
#[derive(Debug, Clone, Default)]
pub struct TargetCache {
    targets: HashMap<(PathBuf, bool), InstallTarget>,
}

impl TargetCache {
    pub fn get(&self, workdir: &Path, use_venv: bool) -> Option<&InstallTarget> {
        self.targets.get(&(workdir.to_path_buf(), use_venv))
    }

    pub fn insert(&mut self, workdir: PathBuf, use_venv: bool, target: InstallTarget) {
        self.targets.insert((workdir, use_venv), target);
    }

    pub fn clear(&mut self) {
        self.targets.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Outcome of a successful remediation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationReport {
    pub target: InstallTarget,
    pub packages: Vec<String>,
    /// `false` when every module was already present and the installer was skipped.
    pub installed: bool,
    /// Whether the search path gained the target's site-packages in this call.
    pub extended_search_path: bool,
}

/// Decide whether `request.failure` can be remediated and what to install.
pub fn plan(
    env: &impl Environment,
    request: &RemediationRequest<'_>,
) -> Result<RemediationPlan, Unresolved> {
    let modules = request.failure.candidate_modules();
    if modules.is_empty() {
        warn!(message = request.failure.message(), "no module name in import failure");
        return Err(Unresolved::NoCandidate);
    }
    let flag = request.policy.no_install_flag.as_str();
    if env.args().iter().any(|arg| arg == flag) {
        info!(flag, "installation disabled by process argument");
        return Err(Unresolved::InstallDisabled);
    }
    if !request.config.install {
        debug!("installation disabled by configuration");
        return Err(Unresolved::InstallDisabled);
    }
    let packages = request.packages.translate_all(&modules);
    debug!(?modules, ?packages, "remediation planned");
    Ok(RemediationPlan {
        modules,
        packages,
        workdir: request.workdir.to_path_buf(),
        use_venv: request.config.use_venv,
    })
}

/// Ensure an install target, extend the search path and install the plan's packages.
#[instrument(skip_all, fields(workdir = %plan.workdir.display(), packages = ?plan.packages))]
pub fn remediate(
    env: &impl Environment,
    plan: &RemediationPlan,
    policy: &RecoveryConfig,
    search_path: &mut SearchPath,
    targets: &mut TargetCache,
) -> Result<RemediationReport, RemediationError> {
    let target = match targets.get(&plan.workdir, plan.use_venv) {
        Some(target) => target.clone(),
        None => {
            let target = select_target(env, plan, policy)?;
            targets.insert(plan.workdir.clone(), plan.use_venv, target.clone());
            target
        }
    };

    let mut extended_search_path = false;
    if let Some(site) = target.site_packages() {
        if search_path.extend(site) {
            info!(site_packages = %site.display(), "search path extended");
            extended_search_path = true;
        }
        if plan.modules.iter().all(|m| env.module_present(site, m)) {
            info!("modules already present, skipping installer");
            return Ok(RemediationReport {
                target,
                packages: plan.packages.clone(),
                installed: false,
                extended_search_path,
            });
        }
    }

    install(env, target.python(), &plan.packages)?;
    Ok(RemediationReport {
        target,
        packages: plan.packages.clone(),
        installed: true,
        extended_search_path,
    })
}

fn select_target(
    env: &impl Environment,
    plan: &RemediationPlan,
    policy: &RecoveryConfig,
) -> Result<InstallTarget, RemediationError> {
    if !plan.use_venv {
        debug!("virtual environments disabled, using current interpreter");
        return Ok(InstallTarget::Current {
            python: env.current_python(),
        });
    }
    if env.is_isolated() {
        debug!("already isolated, using current interpreter");
        return Ok(InstallTarget::Current {
            python: env.current_python(),
        });
    }
    if let Some(project) = find_project(env, &plan.workdir, policy.marker_search_depth)
        && manager_available(env, &project)
    {
        match project.manager.interpreter(env, &project.root) {
            Ok(python) => {
                let site_packages =
                    env_root(&python).and_then(|root| env.find_site_packages(root));
                info!(
                    manager = project.manager.program(),
                    python = %python.display(),
                    "using project environment"
                );
                return Ok(InstallTarget::Managed {
                    manager: project.manager,
                    python,
                    site_packages,
                });
            }
            Err(err) => {
                let detail = format!("{err:#}");
                warn!(
                    err = %detail,
                    manager = project.manager.program(),
                    "project environment unavailable, falling back to venv"
                );
            }
        }
    }
    ensure_venv(env, plan, policy)
}

fn ensure_venv(
    env: &impl Environment,
    plan: &RemediationPlan,
    policy: &RecoveryConfig,
) -> Result<InstallTarget, RemediationError> {
    let existing = policy
        .venv_dirs
        .iter()
        .map(|name| plan.workdir.join(name))
        .find(|root| env.directory_exists(root));
    let root = match existing {
        Some(root) => {
            debug!(root = %root.display(), "reusing virtual environment");
            root
        }
        None => {
            let name = policy.venv_dirs.first().map(String::as_str).unwrap_or("venv");
            let root = plan.workdir.join(name);
            create_venv(env, &root, &plan.workdir)?;
            root
        }
    };
    let site_packages = env.find_site_packages(&root).ok_or_else(|| {
        RemediationError::EnvironmentCreation {
            root: root.clone(),
            detail: "no site-packages directory".to_string(),
        }
    })?;
    Ok(InstallTarget::VirtualEnv {
        python: env.resolve_installer_python(&root),
        root,
        site_packages,
    })
}

fn create_venv(
    env: &impl Environment,
    root: &Path,
    workdir: &Path,
) -> Result<(), RemediationError> {
    let cmd = ShellCommand::new(env.current_python())
        .args(["-m", "venv"])
        .arg(root)
        .current_dir(workdir);
    info!(command = %cmd, "creating virtual environment");
    let detail = match env.execute(&cmd) {
        Ok(0) => return Ok(()),
        Ok(code) => format!("exit status {code}"),
        Err(err) => format!("{err:#}"),
    };
    Err(RemediationError::EnvironmentCreation {
        root: root.to_path_buf(),
        detail,
    })
}

/// Run the installer once for the whole batch.
fn install(
    env: &impl Environment,
    python: &Path,
    packages: &[String],
) -> Result<(), RemediationError> {
    let cmd = ShellCommand::new(python)
        .args(["-m", "pip", "install"])
        .args(packages.iter().map(String::as_str));
    info!(command = %cmd, "installing packages");
    let detail = match env.execute(&cmd) {
        Ok(0) => return Ok(()),
        Ok(code) => format!("exit status {code}"),
        Err(err) => format!("{err:#}"),
    };
    Err(RemediationError::Installer {
        packages: packages.to_vec(),
        detail,
    })
}

/// Environment root for an interpreter at `<root>/bin/python` or `<root>/Scripts/python.exe`.
fn env_root(python: &Path) -> Option<&Path> {
    python.parent().and_then(Path::parent)
}
