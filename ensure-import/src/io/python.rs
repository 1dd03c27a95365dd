//! Python import probe used by the CLI as the guarded import block.
//!
//! The probe runs the interpreter with `PYTHONPATH` set to the current search
//! path and imports each module in order. A missing module is reported by its
//! `ImportError.name`, so the failure reaches the guard already structured.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, anyhow};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::core::failure::ImportFailure;
use crate::core::search_path::SearchPath;
use crate::error::BlockError;
use crate::io::process::{ShellCommand, run_captured};

/// Exit status the probe script uses for import failures.
const IMPORT_FAILED_STATUS: i32 = 3;

const PROBE_SCRIPT: &str = r#"import importlib, sys
for name in sys.argv[1:]:
    try:
        module = importlib.import_module(name)
    except ImportError as exc:
        sys.stderr.write((exc.name or "") + "\n" + str(exc) + "\n")
        sys.exit(3)
    sys.stdout.write(name + "\t" + (getattr(module, "__file__", None) or "") + "\n")
"#;

/// A module the probe imported, with the file it was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportedModule {
    pub name: String,
    /// Empty for namespace and built-in modules.
    pub origin: String,
}

/// Imports modules through a Python interpreter.
#[derive(Debug, Clone)]
pub struct PythonImporter {
    python: PathBuf,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
}

impl PythonImporter {
    pub fn new(
        python: impl Into<PathBuf>,
        timeout: Option<Duration>,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            python: python.into(),
            timeout,
            output_limit_bytes,
        }
    }

    pub fn command(&self, modules: &[String], search_path: &SearchPath) -> ShellCommand {
        ShellCommand::new(&self.python)
            .args(["-c", PROBE_SCRIPT])
            .args(modules.iter().map(String::as_str))
            .env("PYTHONPATH", search_path.to_env_value())
    }

    /// Import `modules` in order; the first missing one fails the block.
    #[instrument(skip_all, fields(modules = modules.len()))]
    pub fn import(
        &self,
        modules: &[String],
        search_path: &SearchPath,
    ) -> Result<Vec<ImportedModule>, BlockError> {
        let cmd = self.command(modules, search_path);
        let output = run_captured(&cmd, self.timeout, self.output_limit_bytes)
            .context("run python import probe")?;
        if output.timed_out {
            return Err(anyhow!("python import probe timed out").into());
        }
        match output.status.code() {
            Some(0) => {
                let imported = parse_imported(&output.stdout_text());
                debug!(count = imported.len(), "modules imported");
                Ok(imported)
            }
            Some(IMPORT_FAILED_STATUS) => Err(parse_failure(&output.stderr_text()).into()),
            code => Err(anyhow!(
                "python import probe failed with status {code:?}: {}",
                output.stderr_text().trim()
            )
            .into()),
        }
    }
}

fn parse_imported(stdout: &str) -> Vec<ImportedModule> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let (name, origin) = line.split_once('\t').unwrap_or((line, ""));
            ImportedModule {
                name: name.to_string(),
                origin: origin.to_string(),
            }
        })
        .collect()
}

/// First stderr line is the structured name (possibly empty), the rest the message.
fn parse_failure(stderr: &str) -> ImportFailure {
    let mut lines = stderr.lines();
    let name = lines.next().unwrap_or("").trim().to_string();
    let message = lines.collect::<Vec<_>>().join("\n").trim().to_string();
    if name.is_empty() {
        ImportFailure::from_message(message)
    } else {
        ImportFailure::new(vec![name], message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_failure_prefers_structured_name() {
        let failure = parse_failure("tortoise\nNo module named 'tortoise'\n");
        assert_eq!(failure.reported(), &["tortoise".to_string()]);
        assert_eq!(failure.message(), "No module named 'tortoise'");
    }

    #[test]
    fn parse_failure_without_name_falls_back_to_message() {
        let failure = parse_failure("\ncannot import name 'x' from 'pkg'\n");
        assert!(failure.reported().is_empty());
        assert_eq!(failure.candidate_modules(), vec!["x", "pkg"]);
    }

    #[test]
    fn parse_imported_reads_origins() {
        let imported = parse_imported("six\t/site/six.py\nnspkg\t\n");
        assert_eq!(
            imported,
            vec![
                ImportedModule {
                    name: "six".to_string(),
                    origin: "/site/six.py".to_string(),
                },
                ImportedModule {
                    name: "nspkg".to_string(),
                    origin: String::new(),
                },
            ]
        );
    }

    #[test]
    fn command_sets_pythonpath() {
        let mut path = SearchPath::new();
        path.extend("/opt/site");
        let importer = PythonImporter::new("python3", None, 1000);
        let cmd = importer.command(&["six".to_string()], &path);
        assert!(cmd.has_arg("six"));
        assert_eq!(cmd.envs.len(), 1);
        assert_eq!(cmd.envs[0].0, "PYTHONPATH");
        assert_eq!(cmd.envs[0].1, path.to_env_value());
    }
}
