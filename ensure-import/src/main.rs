//! `ensure-import`: make sure Python modules import, installing what is missing.
//!
//! `check` imports each module through the configured interpreter, remediates
//! missing ones (virtual environment or project environment plus an installer
//! run) and prints the resulting module origins and `PYTHONPATH`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use ensure_import::core::config::ConfigArgs;
use ensure_import::core::search_path::SearchPath;
use ensure_import::exit_codes;
use ensure_import::io::config::{CONFIG_FILE, RecoveryConfig, load_config, write_config};
use ensure_import::io::environment::System;
use ensure_import::io::python::{ImportedModule, PythonImporter};
use ensure_import::logging;
use ensure_import::registry::Recovery;

#[derive(Parser)]
#[command(
    name = "ensure-import",
    version,
    about = "Import Python modules, installing missing packages on the fly"
)]
struct Cli {
    /// Log remediation steps to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import modules, remediating missing ones, and print where they came from.
    Check(CheckArgs),
    /// Write a default `ensure-import.toml` in the current directory.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args)]
struct CheckArgs {
    /// Modules to import, in order.
    #[arg(required = true)]
    modules: Vec<String>,

    /// Look for modules in this directory instead of installing (repeatable).
    #[arg(long = "sys-path", value_name = "DIR")]
    sys_path: Vec<PathBuf>,

    /// Working directory (or a script inside it) used for environment lookup.
    #[arg(long, value_name = "PATH")]
    workdir: Option<PathBuf>,

    /// Allow installing packages.
    #[arg(long, value_name = "BOOL")]
    install: Option<bool>,

    /// Install into the current interpreter instead of a virtual environment.
    #[arg(long)]
    no_venv: bool,

    /// Terminate with a status code when remediation fails.
    #[arg(long, value_name = "BOOL")]
    exit_on_failure: Option<bool>,

    /// Install PACKAGE when MODULE is missing (repeatable).
    #[arg(long = "map", value_name = "MODULE=PACKAGE", value_parser = parse_mapping)]
    mappings: Vec<(String, String)>,

    /// Policy file (default: ./ensure-import.toml, if present).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print a JSON report instead of text.
    #[arg(long)]
    json: bool,

    /// Never install anything; missing modules fail the check.
    ///
    /// Always honoured, whatever `no_install_flag` the policy file sets.
    #[arg(long, conflicts_with = "install")]
    no_install: bool,
}

impl CheckArgs {
    fn config_args(&self) -> ConfigArgs {
        let mut args = ConfigArgs::new();
        for entry in &self.sys_path {
            args = args.search_path(entry);
        }
        if let Some(workdir) = &self.workdir {
            args = args.workdir(workdir);
        }
        if self.no_install {
            args = args.install(false);
        } else if let Some(install) = self.install {
            args = args.install(install);
        }
        if self.no_venv {
            args = args.no_venv(true);
        }
        if let Some(exit_on_failure) = self.exit_on_failure {
            args = args.exit_on_failure(exit_on_failure);
        }
        for (module, package) in &self.mappings {
            args = args.package(module, package);
        }
        args
    }
}

#[derive(Serialize)]
struct CheckReport<'a> {
    modules: &'a [ImportedModule],
    search_path: Vec<String>,
}

fn parse_mapping(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((module, package)) if !module.trim().is_empty() && !package.trim().is_empty() => {
            Ok((module.trim().to_string(), package.trim().to_string()))
        }
        _ => Err(format!("expected MODULE=PACKAGE, got '{raw}'")),
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let cwd = std::env::current_dir().context("resolve current directory")?;
    match cli.command {
        Command::Check(args) => cmd_check(&cwd, &args),
        Command::Init { force } => cmd_init(&cwd, force),
    }
}

fn cmd_check(cwd: &Path, args: &CheckArgs) -> Result<i32> {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| cwd.join(CONFIG_FILE));
    let policy = load_config(&config_path)?;
    let importer = PythonImporter::new(
        &policy.python,
        policy.command_timeout(),
        policy.capture_output_limit_bytes,
    );
    let inherited = std::env::var_os("PYTHONPATH")
        .map(|value| SearchPath::from_env_value(&value))
        .unwrap_or_default();

    let mut recovery =
        Recovery::new(System::from_config(&policy), policy).with_search_path(inherited);
    let result = recovery
        .handler(&args.config_args())
        .run_or_exit(|path| importer.import(&args.modules, path));

    let imported = match result {
        Ok(imported) => imported,
        Err(err) => {
            eprintln!("{err:#}");
            if let Some(reason) = err.unresolved_reason() {
                eprintln!("ensure-import: {}", reason.as_str());
            }
            return Ok(err.exit_code());
        }
    };

    let search_path = recovery.search_path();
    if args.json {
        let report = CheckReport {
            modules: &imported,
            search_path: search_path
                .entries()
                .iter()
                .map(|entry| entry.display().to_string())
                .collect(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize report")?
        );
    } else {
        for module in &imported {
            println!("{}\t{}", module.name, module.origin);
        }
        println!("PYTHONPATH={}", search_path.to_env_value().to_string_lossy());
    }
    Ok(exit_codes::OK)
}

fn cmd_init(cwd: &Path, force: bool) -> Result<i32> {
    let path = cwd.join(CONFIG_FILE);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(&path, &RecoveryConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}
