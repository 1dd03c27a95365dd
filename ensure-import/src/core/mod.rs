//! Deterministic, pure logic behind import recovery.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod config;
pub mod failure;
pub mod packages;
pub mod retry;
pub mod search_path;
