//! Error types surfaced by guarded blocks, remediation and the guard itself.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::failure::ImportFailure;
use crate::exit_codes;

/// Failure produced by a guarded block.
///
/// Only `Import` is remediated; anything else propagates untouched.
#[derive(Debug, Error)]
pub enum BlockError {
    #[error(transparent)]
    Import(#[from] ImportFailure),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why an import failure was handed back to the caller unremediated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
    /// The attempt budget is spent.
    Exhausted,
    /// The explicit search path was applied and the import still fails.
    SearchPathExhausted,
    /// No module name could be identified in the failure.
    NoCandidate,
    /// Installation is disabled by configuration or the `--no-install` flag.
    InstallDisabled,
}

impl Unresolved {
    pub fn as_str(self) -> &'static str {
        match self {
            Unresolved::Exhausted => "retries exhausted",
            Unresolved::SearchPathExhausted => "search path did not provide the module",
            Unresolved::NoCandidate => "no module name in failure",
            Unresolved::InstallDisabled => "installation disabled",
        }
    }
}

/// The environment could not be remediated.
#[derive(Debug, Error)]
pub enum RemediationError {
    #[error("failed to create virtual environment {}: {detail}", .root.display())]
    EnvironmentCreation { root: PathBuf, detail: String },
    #[error("failed to install {}: {detail}", .packages.join(" "))]
    Installer { packages: Vec<String>, detail: String },
}

impl RemediationError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RemediationError::EnvironmentCreation { .. } => exit_codes::ENV_CREATE_FAILED,
            RemediationError::Installer { .. } => exit_codes::INSTALL_FAILED,
        }
    }
}

/// Fatal outcome of a guarded import cycle.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The block's own failure, returned as-is.
    #[error("{failure}")]
    Unresolved {
        failure: ImportFailure,
        reason: Unresolved,
    },
    /// The retry loop stopped before any block ran to completion.
    #[error("import recovery stopped after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error(transparent)]
    Remediation(#[from] RemediationError),
    /// Unrelated failure from the block, propagated immediately.
    #[error(transparent)]
    Other(anyhow::Error),
}

impl GuardError {
    /// The original import failure, when this error carries one.
    pub fn import_failure(&self) -> Option<&ImportFailure> {
        match self {
            GuardError::Unresolved { failure, .. } => Some(failure),
            _ => None,
        }
    }

    pub fn unresolved_reason(&self) -> Option<Unresolved> {
        match self {
            GuardError::Unresolved { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            GuardError::Unresolved { .. } | GuardError::Exhausted { .. } => exit_codes::UNRESOLVED,
            GuardError::Remediation(err) => err.exit_code(),
            GuardError::Other(_) => exit_codes::FAILED,
        }
    }
}
