//! Runtime import recovery for Python programs.
//!
//! A guarded import block that fails with a missing module is remediated
//! (virtual environment or project manager environment, package install,
//! search path extension) and the caller is told to run the block again,
//! up to a bounded number of attempts.
//!
//! - **[`core`]**: Pure logic (configuration defaults, retry bookkeeping,
//!   failure parsing, package names, search path). No I/O.
//! - **[`io`]**: Side effects (processes, filesystem probing, config files),
//!   behind the [`io::environment::Environment`] trait so tests can script them.
//!
//! [`registry::Recovery`] is the entry point: it memoizes handlers by their
//! [`core::config::ConfigArgs`] and hands out [`registry::Handle`]s whose
//! [`guard`](registry::Handle::guard) and [`run`](registry::Handle::run)
//! methods live in [`guard`].

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod guard;
pub mod handler;
pub mod io;
pub mod logging;
pub mod registry;
pub mod remediate;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
