//! Detection of per-project environment managers (Poetry, PDM).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::io::environment::Environment;
use crate::io::process::ShellCommand;

/// An environment-per-project manager the remediation can defer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectManager {
    Poetry,
    Pdm,
}

/// A manager together with the project root its marker was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedProject {
    pub manager: ProjectManager,
    pub root: PathBuf,
}

impl ProjectManager {
    pub const ALL: [ProjectManager; 2] = [ProjectManager::Poetry, ProjectManager::Pdm];

    pub fn program(self) -> &'static str {
        match self {
            ProjectManager::Poetry => "poetry",
            ProjectManager::Pdm => "pdm",
        }
    }

    fn lock_file(self) -> &'static str {
        match self {
            ProjectManager::Poetry => "poetry.lock",
            ProjectManager::Pdm => "pdm.lock",
        }
    }

    fn tool_table(self) -> &'static str {
        match self {
            ProjectManager::Poetry => "poetry",
            ProjectManager::Pdm => "pdm",
        }
    }

    /// Whether `dir` is the root of a project using this manager.
    fn owns(self, env: &impl Environment, dir: &Path) -> bool {
        if env.is_file(&dir.join(self.lock_file())) {
            return true;
        }
        let pyproject = dir.join("pyproject.toml");
        env.is_file(&pyproject)
            && pyproject_tools(&pyproject)
                .map(|tools| tools.iter().any(|t| t == self.tool_table()))
                .unwrap_or(false)
    }

    /// Command whose success means the manager CLI is installed and working.
    pub fn probe_command(self, project_root: &Path) -> ShellCommand {
        ShellCommand::new(self.program())
            .arg("--version")
            .current_dir(project_root)
    }

    /// Resolve the interpreter of the project's environment.
    #[instrument(skip_all, fields(manager = self.program()))]
    pub fn interpreter(self, env: &impl Environment, project_root: &Path) -> Result<PathBuf> {
        match self {
            ProjectManager::Poetry => {
                let cmd = ShellCommand::new("poetry")
                    .args(["env", "info", "--path"])
                    .current_dir(project_root);
                let root = first_line(&env.capture(&cmd)?)
                    .ok_or_else(|| anyhow!("poetry reported no environment"))?;
                Ok(env.resolve_installer_python(Path::new(&root)))
            }
            ProjectManager::Pdm => {
                let cmd = ShellCommand::new("pdm")
                    .args(["info", "--python"])
                    .current_dir(project_root);
                let python = first_line(&env.capture(&cmd)?)
                    .ok_or_else(|| anyhow!("pdm reported no interpreter"))?;
                Ok(PathBuf::from(python))
            }
        }
    }
}

/// Walk from `start` up to `max_levels` ancestors looking for a project marker.
pub fn find_project(
    env: &impl Environment,
    start: &Path,
    max_levels: u32,
) -> Option<ManagedProject> {
    let mut dir = Some(start);
    let mut level = 0;
    while let Some(current) = dir {
        if level > max_levels {
            break;
        }
        for manager in ProjectManager::ALL {
            if manager.owns(env, current) {
                debug!(manager = manager.program(), root = %current.display(), "project marker found");
                return Some(ManagedProject {
                    manager,
                    root: current.to_path_buf(),
                });
            }
        }
        dir = current.parent();
        level += 1;
    }
    None
}

/// Whether the manager CLI answers its probe with status 0.
pub fn manager_available(env: &impl Environment, project: &ManagedProject) -> bool {
    match env.execute(&project.manager.probe_command(&project.root)) {
        Ok(code) => code == 0,
        Err(err) => {
            debug!(err = %err, manager = project.manager.program(), "manager probe failed");
            false
        }
    }
}

/// `[tool.*]` table names declared in a `pyproject.toml`.
fn pyproject_tools(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let doc: toml::Table =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    let tools = doc
        .get("tool")
        .and_then(toml::Value::as_table)
        .map(|table| table.keys().cloned().collect())
        .unwrap_or_default();
    Ok(tools)
}

fn first_line(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedEnv;

    #[test]
    fn finds_lock_file_in_ancestor() {
        let temp = tempfile::tempdir().expect("tempdir");
        let nested = temp.path().join("src/app");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(temp.path().join("poetry.lock"), "").expect("write");

        let env = ScriptedEnv::new(temp.path());
        let project = find_project(&env, &nested, 3).expect("project");
        assert_eq!(project.manager, ProjectManager::Poetry);
        assert_eq!(project.root, temp.path());
    }

    #[test]
    fn ancestor_walk_is_bounded() {
        let temp = tempfile::tempdir().expect("tempdir");
        let nested = temp.path().join("a/b/c");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(temp.path().join("pdm.lock"), "").expect("write");

        let env = ScriptedEnv::new(temp.path());
        assert!(find_project(&env, &nested, 2).is_none());
        assert_eq!(
            find_project(&env, &nested, 3).map(|p| p.manager),
            Some(ProjectManager::Pdm)
        );
    }

    #[test]
    fn pyproject_tool_table_marks_project() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(
            temp.path().join("pyproject.toml"),
            "[project]\nname = \"demo\"\n\n[tool.pdm]\ndistribution = false\n",
        )
        .expect("write");

        let env = ScriptedEnv::new(temp.path());
        let project = find_project(&env, temp.path(), 0).expect("project");
        assert_eq!(project.manager, ProjectManager::Pdm);
    }

    #[test]
    fn plain_pyproject_is_not_managed() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(
            temp.path().join("pyproject.toml"),
            "[project]\nname = \"demo\"\n",
        )
        .expect("write");

        let env = ScriptedEnv::new(temp.path());
        assert!(find_project(&env, temp.path(), 0).is_none());
    }

    #[test]
    fn poetry_interpreter_uses_env_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let env = ScriptedEnv::new(temp.path())
            .with_capture("poetry", "/cache/pypoetry/virtualenvs/demo-py3.12\n");
        let python = ProjectManager::Poetry
            .interpreter(&env, temp.path())
            .expect("interpreter");
        assert_eq!(
            python,
            crate::io::environment::venv_python(Path::new("/cache/pypoetry/virtualenvs/demo-py3.12"))
        );
    }

    #[test]
    fn unavailable_manager_probe_is_false() {
        let temp = tempfile::tempdir().expect("tempdir");
        let env = ScriptedEnv::new(temp.path()).with_status("poetry", 127);
        let project = ManagedProject {
            manager: ProjectManager::Poetry,
            root: temp.path().to_path_buf(),
        };
        assert!(!manager_available(&env, &project));
    }
}
