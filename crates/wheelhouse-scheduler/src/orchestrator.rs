//! Matrix orchestrator - runs eligible cells one after another.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use wheelhouse_config::{IdentityVars, VariableContext, WheelhouseConfig};
use wheelhouse_core::executor::Executor;
use wheelhouse_core::{BuildIdentity, MatrixCell, MatrixReport, RunId, SkipReason};

use crate::cell::CellRunner;
use crate::events::{EventSink, MatrixEvent, TracingSink};

/// Orchestrates the execution of a matrix on one platform.
///
/// Cells run strictly in order and a failing cell never stops the ones after
/// it. Skipped cells produce no result.
pub struct MatrixOrchestrator {
    runner: CellRunner,
    config: Arc<WheelhouseConfig>,
    sink: Arc<dyn EventSink>,
    vars: VariableContext,
}

impl MatrixOrchestrator {
    pub fn new(
        executor: Arc<dyn Executor>,
        config: Arc<WheelhouseConfig>,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner: CellRunner::new(executor, config.clone(), workdir),
            config,
            sink: Arc::new(TracingSink),
            vars: VariableContext::new(),
        }
    }

    /// Send events to `sink` instead of the log.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Base variables for command interpolation (trigger and env).
    /// Config `vars`, cell, identity, package and run variables are filled in per run.
    pub fn with_variables(mut self, vars: VariableContext) -> Self {
        self.vars = vars;
        self
    }

    /// Run `cells` in order with the same `identity` for every build.
    pub async fn run(&self, identity: &BuildIdentity, cells: &[MatrixCell]) -> MatrixReport {
        let run_id = RunId::new();
        let mut vars = self.vars.clone();
        vars.package = self.config.package.clone();
        for (name, value) in &self.config.vars {
            vars.set(name, value.clone());
        }
        vars.run.id = run_id.to_string();
        vars.identity = IdentityVars::new(identity, self.config.base_version.as_deref());

        let eligible = cells.iter().filter(|c| c.eligible).count();
        self.sink.emit(&MatrixEvent::RunStarted {
            run_id,
            identity: identity.clone(),
            cells: eligible,
        });
        if eligible == 0 {
            warn!("No eligible cells in the matrix");
        }

        let mut results = Vec::with_capacity(eligible);
        let mut skipped = Vec::new();

        for cell in cells {
            if !cell.eligible {
                let reason = cell.skip_reason.clone().unwrap_or(SkipReason::Filtered);
                self.sink.emit(&MatrixEvent::CellSkipped {
                    cell: cell.clone(),
                    reason,
                });
                skipped.push(cell.clone());
                continue;
            }

            self.sink.emit(&MatrixEvent::CellStarted { cell: cell.clone() });

            let result = self.runner.run_cell(cell, identity, &vars, &*self.sink).await;

            self.sink.emit(&MatrixEvent::CellFinished {
                result: result.clone(),
            });
            results.push(result);
        }

        let report = MatrixReport {
            run_id,
            identity: identity.clone(),
            results,
            skipped,
        };

        let failed = report.failed().count();
        info!(
            run_id = %run_id,
            executed = report.results.len(),
            failed,
            skipped = report.skipped.len(),
            "Matrix complete"
        );
        self.sink.emit(&MatrixEvent::RunFinished {
            success: report.success(),
            executed: report.results.len(),
            failed,
        });

        report
    }
}
