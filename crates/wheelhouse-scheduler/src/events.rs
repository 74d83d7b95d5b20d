//! Matrix execution events.

use tracing::{error, info};
use wheelhouse_core::{BuildIdentity, CellResult, MatrixCell, RunId, SkipReason};

/// Event emitted during matrix execution, in execution order.
#[derive(Debug, Clone)]
pub enum MatrixEvent {
    RunStarted {
        run_id: RunId,
        identity: BuildIdentity,
        cells: usize,
    },
    CellSkipped {
        cell: MatrixCell,
        reason: SkipReason,
    },
    CellStarted {
        cell: MatrixCell,
    },
    StepFinished {
        cell: MatrixCell,
        step: &'static str,
        success: bool,
        duration_ms: u64,
    },
    CellFinished {
        result: CellResult,
    },
    RunFinished {
        success: bool,
        executed: usize,
        failed: usize,
    },
}

/// Receives events as the matrix runs.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &MatrixEvent);
}

/// Sink that reports events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &MatrixEvent) {
        match event {
            MatrixEvent::RunStarted {
                run_id,
                identity,
                cells,
            } => {
                info!(run_id = %run_id, identity = %identity, cells, "Matrix run started");
            }
            MatrixEvent::CellSkipped { cell, reason } => {
                info!(cell = %cell, reason = %reason, "Skipping cell");
            }
            MatrixEvent::CellStarted { cell } => {
                info!(cell = %cell, "Cell started");
            }
            MatrixEvent::StepFinished {
                cell,
                step,
                success,
                duration_ms,
            } => {
                info!(cell = %cell, step, success, duration_ms, "Step finished");
            }
            MatrixEvent::CellFinished { result } => match &result.failure {
                None => info!(cell = %result.cell, outcome = ?result.outcome, "Cell passed"),
                Some(failure) => error!(
                    cell = %result.cell,
                    outcome = ?result.outcome,
                    step = failure.step(),
                    error = %failure,
                    "Cell failed"
                ),
            },
            MatrixEvent::RunFinished {
                success,
                executed,
                failed,
            } => {
                info!(success, executed, failed, "Matrix run finished");
            }
        }
    }
}
