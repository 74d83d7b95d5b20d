//! Core domain types and traits for the wheelhouse build matrix.
//!
//! This crate contains:
//! - Trigger snapshots and branch classification
//! - Build identity resolution from commit counts
//! - Matrix cells and their eligibility
//! - Artifact naming
//! - Cell outcomes and the aggregate report
//! - Executor trait and process types

pub mod artifact;
pub mod branch;
pub mod error;
pub mod executor;
pub mod id;
pub mod identity;
pub mod matrix;
pub mod outcome;
pub mod test_policy;
pub mod trigger;

pub use artifact::ArtifactName;
pub use branch::{BranchPolicy, Classification, classify};
pub use error::{Error, Result};
pub use id::RunId;
pub use identity::{BuildIdentity, GitContext, IdentityEnvNames};
pub use matrix::{Eligibility, InterpreterEntry, MatrixCell, Platform, PythonVersion, SkipReason};
pub use outcome::{CellFailure, CellOutcome, CellResult, MatrixReport};
pub use test_policy::TestPolicy;
pub use trigger::{TriggerContext, TriggerEnvNames};
