//! Cell outcomes and the aggregate run report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{BuildIdentity, MatrixCell, RunId};

/// Terminal outcome of one executed cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellOutcome {
    Passed,
    BuildFailed,
    InstallFailed,
    TestsFailed,
    TestsFailedThreshold,
}

impl CellOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, CellOutcome::Passed)
    }
}

/// Why a cell failed. Each variant maps onto one [`CellOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellFailure {
    #[error("build tool failed (exit code {exit_code:?}): {message}")]
    BuildFailed {
        exit_code: Option<i32>,
        message: String,
    },

    #[error("no artifact matching {pattern}")]
    ArtifactNotFound { pattern: String },

    #[error("{count} artifacts match {pattern}, expected exactly one")]
    ArtifactAmbiguous { pattern: String, count: usize },

    #[error("install failed (exit code {exit_code:?}): {message}")]
    InstallFailed {
        exit_code: Option<i32>,
        message: String,
    },

    #[error("test suite failed ({failures:?} failures)")]
    TestsFailed { failures: Option<u32> },

    #[error("test suite stopped after reaching the ceiling of {ceiling} failures")]
    TestsFailedThreshold { failures: u32, ceiling: u32 },
}

impl CellFailure {
    /// Artifact lookup problems are reported as build failures.
    pub fn outcome(&self) -> CellOutcome {
        match self {
            CellFailure::BuildFailed { .. }
            | CellFailure::ArtifactNotFound { .. }
            | CellFailure::ArtifactAmbiguous { .. } => CellOutcome::BuildFailed,
            CellFailure::InstallFailed { .. } => CellOutcome::InstallFailed,
            CellFailure::TestsFailed { .. } => CellOutcome::TestsFailed,
            CellFailure::TestsFailedThreshold { .. } => CellOutcome::TestsFailedThreshold,
        }
    }

    /// Pipeline step the failure happened in.
    pub fn step(&self) -> &'static str {
        match self {
            CellFailure::BuildFailed { .. } => "build",
            CellFailure::ArtifactNotFound { .. } | CellFailure::ArtifactAmbiguous { .. } => {
                "locate"
            }
            CellFailure::InstallFailed { .. } => "install",
            CellFailure::TestsFailed { .. } | CellFailure::TestsFailedThreshold { .. } => "test",
        }
    }

    pub fn failure_count(&self) -> Option<u32> {
        match self {
            CellFailure::TestsFailed { failures } => *failures,
            CellFailure::TestsFailedThreshold { failures, .. } => Some(*failures),
            _ => None,
        }
    }
}

/// Result of one executed cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellResult {
    pub cell: MatrixCell,
    pub outcome: CellOutcome,
    pub failure_count: Option<u32>,
    /// Failure detail, absent when the cell passed.
    pub failure: Option<CellFailure>,
    /// File name of the installed artifact, when one was located.
    pub artifact: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CellResult {
    pub fn passed(cell: MatrixCell, artifact: String, started_at: DateTime<Utc>) -> Self {
        Self {
            cell,
            outcome: CellOutcome::Passed,
            failure_count: None,
            failure: None,
            artifact: Some(artifact),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(
        cell: MatrixCell,
        failure: CellFailure,
        artifact: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            cell,
            outcome: failure.outcome(),
            failure_count: failure.failure_count(),
            failure: Some(failure),
            artifact,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn is_passed(&self) -> bool {
        self.outcome.is_passed()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Aggregate result of one matrix invocation.
#[derive(Debug, Clone, Serialize)]
pub struct MatrixReport {
    pub run_id: RunId,
    pub identity: BuildIdentity,
    /// One entry per executed cell, in execution order.
    pub results: Vec<CellResult>,
    /// Cells that were not executed.
    pub skipped: Vec<MatrixCell>,
}

impl MatrixReport {
    /// True when every executed cell passed. Skipped cells do not count.
    pub fn success(&self) -> bool {
        self.results.iter().all(CellResult::is_passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &CellResult> {
        self.results.iter().filter(|r| !r.is_passed())
    }
}
