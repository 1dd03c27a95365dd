//! Handler construction arguments and their resolved defaults.

use std::path::{Path, PathBuf};

/// Arguments a handler is constructed with; also its registry identity.
///
/// `search_path` is the positional argument and keeps its order. Package
/// overrides keep insertion order as well, so the same overrides given in a
/// different order form a different key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ConfigArgs {
    pub search_path: Vec<PathBuf>,
    pub workdir: Option<PathBuf>,
    pub install: Option<bool>,
    pub no_venv: Option<bool>,
    pub exit_on_failure: Option<bool>,
    pub packages: Vec<(String, String)>,
}

impl ConfigArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit directory to extend the search path with instead of installing.
    pub fn search_path(mut self, entry: impl Into<PathBuf>) -> Self {
        self.search_path.push(entry.into());
        self
    }

    pub fn workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn install(mut self, install: bool) -> Self {
        self.install = Some(install);
        self
    }

    pub fn no_venv(mut self, no_venv: bool) -> Self {
        self.no_venv = Some(no_venv);
        self
    }

    pub fn exit_on_failure(mut self, exit_on_failure: bool) -> Self {
        self.exit_on_failure = Some(exit_on_failure);
        self
    }

    /// Install `package` when `module` is missing.
    pub fn package(mut self, module: impl Into<String>, package: impl Into<String>) -> Self {
        self.packages.push((module.into(), package.into()));
        self
    }
}

/// Fully resolved handler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub search_path: Vec<PathBuf>,
    /// Unresolved working directory hint; see [`working_directory`].
    pub workdir: Option<PathBuf>,
    pub install: bool,
    pub use_venv: bool,
    pub exit_on_failure: bool,
}

impl ResolvedConfig {
    pub fn has_search_path(&self) -> bool {
        !self.search_path.is_empty()
    }
}

/// Derive consistent defaults.
///
/// An explicit search path means "find it on disk": no installation, no
/// virtual environment, and failures surface as errors instead of exits.
pub fn resolve(args: &ConfigArgs) -> ResolvedConfig {
    let has_search_path = !args.search_path.is_empty();
    let install = args.install.unwrap_or(!has_search_path);
    let no_venv = args.no_venv.unwrap_or(!install || has_search_path);
    let exit_on_failure = args.exit_on_failure.unwrap_or(!has_search_path);
    ResolvedConfig {
        search_path: args.search_path.clone(),
        workdir: args.workdir.clone(),
        install,
        use_venv: !no_venv,
        exit_on_failure,
    }
}

/// Resolve a working directory hint against the current directory.
///
/// A hint naming a file resolves to the directory containing it.
pub fn working_directory(
    hint: Option<&Path>,
    cwd: &Path,
    is_file: impl Fn(&Path) -> bool,
) -> PathBuf {
    let Some(hint) = hint else {
        return cwd.to_path_buf();
    };
    let absolute = if hint.is_absolute() {
        hint.to_path_buf()
    } else {
        cwd.join(hint)
    };
    if is_file(&absolute) {
        return absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(absolute);
    }
    absolute
}
