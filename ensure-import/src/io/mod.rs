//! Side-effecting operations: processes, filesystem probing and config files.

pub mod config;
pub mod environment;
pub mod process;
pub mod project;
pub mod python;
