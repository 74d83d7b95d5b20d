//! Process execution backends for the wheelhouse build matrix.
//!
//! Provides:
//! - Local process execution (build tool, installer, test runner)
//! - Git queries for the build identity

pub mod git;
pub mod local;

pub use git::GitReader;
pub use local::LocalProcessExecutor;
pub use wheelhouse_core::executor::{Executor, ProcessOutput, ProcessSpec};
