//! Stable exit codes for the `ensure-import` CLI and exit-on-failure handlers.

/// Every module imported.
pub const OK: i32 = 0;
/// A virtual environment could not be created.
pub const ENV_CREATE_FAILED: i32 = 1;
/// The package installer failed.
pub const INSTALL_FAILED: i32 = 2;
/// An import still fails after retries, or could not be remediated.
pub const UNRESOLVED: i32 = 3;
/// Invalid configuration or any other error.
pub const FAILED: i32 = 4;
