//! Test-only helpers: a scripted [`Environment`] that never spawns processes.
//!
//! Virtual environment creation and package installs are simulated on the
//! real filesystem (directories under a temp dir), so the rest of the crate
//! sees the same layout a real interpreter would leave behind.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::core::search_path::SearchPath;
use crate::io::environment::{Environment, find_site_packages, module_present};
use crate::io::process::ShellCommand;

/// Site-packages layout created for simulated virtual environments.
pub const SITE_PACKAGES: &str = "lib/python3.12/site-packages";

/// Environment double with scripted statuses and captured outputs.
#[derive(Debug)]
pub struct ScriptedEnv {
    cwd: PathBuf,
    python: PathBuf,
    isolated: bool,
    args: Vec<String>,
    statuses: HashMap<String, i32>,
    captures: HashMap<String, String>,
    venv_status: i32,
    install_status: i32,
    commands: RefCell<Vec<ShellCommand>>,
    isolation_probes: Cell<usize>,
}

impl ScriptedEnv {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            python: PathBuf::from("python3"),
            isolated: false,
            args: Vec::new(),
            statuses: HashMap::new(),
            captures: HashMap::new(),
            venv_status: 0,
            install_status: 0,
            commands: RefCell::new(Vec::new()),
            isolation_probes: Cell::new(0),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Exit status for any command whose program file name is `program`.
    pub fn with_status(mut self, program: &str, status: i32) -> Self {
        self.statuses.insert(program.to_string(), status);
        self
    }

    /// Stdout returned when capturing a command run by `program`.
    pub fn with_capture(mut self, program: &str, stdout: &str) -> Self {
        self.captures.insert(program.to_string(), stdout.to_string());
        self
    }

    pub fn with_venv_status(mut self, status: i32) -> Self {
        self.venv_status = status;
        self
    }

    pub fn with_install_status(mut self, status: i32) -> Self {
        self.install_status = status;
        self
    }

    pub fn isolated(mut self, isolated: bool) -> Self {
        self.isolated = isolated;
        self
    }

    pub fn commands(&self) -> Vec<ShellCommand> {
        self.commands.borrow().clone()
    }

    pub fn venv_creations(&self) -> usize {
        self.commands
            .borrow()
            .iter()
            .filter(|cmd| is_venv_creation(cmd))
            .count()
    }

    /// Package batches handed to the installer, in call order.
    pub fn installs(&self) -> Vec<Vec<String>> {
        self.commands
            .borrow()
            .iter()
            .filter_map(install_packages)
            .collect()
    }

    pub fn isolation_probes(&self) -> usize {
        self.isolation_probes.get()
    }

    fn simulate_venv(&self, cmd: &ShellCommand) -> Result<i32> {
        if self.venv_status == 0 {
            let root = cmd
                .args
                .last()
                .ok_or_else(|| anyhow!("venv command without target"))?;
            fs::create_dir_all(Path::new(root).join(SITE_PACKAGES))?;
        }
        Ok(self.venv_status)
    }

    fn simulate_install(&self, cmd: &ShellCommand, packages: &[String]) -> Result<i32> {
        if self.install_status != 0 {
            return Ok(self.install_status);
        }
        let site = cmd
            .program
            .parent()
            .and_then(Path::parent)
            .and_then(find_site_packages);
        if let Some(site) = site {
            for package in packages {
                fs::create_dir_all(site.join(package))?;
            }
        }
        Ok(0)
    }
}

impl Environment for ScriptedEnv {
    fn execute(&self, command: &ShellCommand) -> Result<i32> {
        self.commands.borrow_mut().push(command.clone());
        if is_venv_creation(command) {
            return self.simulate_venv(command);
        }
        if let Some(packages) = install_packages(command) {
            return self.simulate_install(command, &packages);
        }
        Ok(self
            .statuses
            .get(&program_name(command))
            .copied()
            .unwrap_or(127))
    }

    fn capture(&self, command: &ShellCommand) -> Result<String> {
        self.commands.borrow_mut().push(command.clone());
        self.captures
            .get(&program_name(command))
            .cloned()
            .ok_or_else(|| anyhow!("no scripted output for {command}"))
    }

    fn current_python(&self) -> PathBuf {
        self.python.clone()
    }

    fn is_isolated(&self) -> bool {
        self.isolation_probes.set(self.isolation_probes.get() + 1);
        self.isolated
    }

    fn args(&self) -> Vec<String> {
        self.args.clone()
    }

    fn current_dir(&self) -> Result<PathBuf> {
        Ok(self.cwd.clone())
    }
}

/// Whether `module` is importable from any directory on `search_path`.
pub fn importable(search_path: &SearchPath, module: &str) -> bool {
    search_path
        .entries()
        .iter()
        .any(|dir| module_present(dir, module))
}

fn program_name(command: &ShellCommand) -> String {
    command
        .program
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_venv_creation(command: &ShellCommand) -> bool {
    command.has_arg("-m") && command.has_arg("venv")
}

fn install_packages(command: &ShellCommand) -> Option<Vec<String>> {
    if !(command.has_arg("pip") && command.has_arg("install")) {
        return None;
    }
    let packages = command
        .args
        .iter()
        .skip_while(|arg| *arg != "install")
        .skip(1)
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    Some(packages)
}
