//! Run the build-test matrix locally.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use wheelhouse_config::VariableContextBuilder;
use wheelhouse_core::{CellOutcome, MatrixCell, MatrixReport, PythonVersion};
use wheelhouse_executor::LocalProcessExecutor;
use wheelhouse_scheduler::{EventSink, MatrixEvent, MatrixOrchestrator};

use crate::TriggerArgs;

pub struct RunOptions {
    pub platform: Option<String>,
    pub python: Vec<String>,
    pub json: bool,
}

/// Prints progress as the matrix runs.
struct TerminalSink;

impl EventSink for TerminalSink {
    fn emit(&self, event: &MatrixEvent) {
        match event {
            MatrixEvent::RunStarted {
                run_id,
                identity,
                cells,
            } => {
                println!("Run {} ({}), {} cells", run_id, identity, cells);
                println!("\n--- Starting matrix execution ---\n");
            }
            MatrixEvent::CellSkipped { cell, reason } => {
                println!("⊘ Cell '{}' skipped: {}\n", cell, reason);
            }
            MatrixEvent::CellStarted { cell } => {
                println!("▶ Cell '{}' started", cell);
            }
            MatrixEvent::StepFinished {
                step,
                success,
                duration_ms,
                ..
            } => {
                let mark = if *success { "✓" } else { "✗" };
                println!("  {} {} ({:.1}s)", mark, step, *duration_ms as f64 / 1000.0);
            }
            MatrixEvent::CellFinished { result } => match &result.failure {
                None => println!("✓ Cell '{}' passed\n", result.cell),
                Some(failure) => println!("✗ Cell '{}' failed: {}\n", result.cell, failure),
            },
            MatrixEvent::RunFinished { success, .. } => {
                if *success {
                    println!("--- Matrix completed successfully ---");
                } else {
                    println!("--- Matrix failed ---");
                }
            }
        }
    }
}

/// Returns whether every executed cell passed.
pub async fn run(config_path: &Path, trigger: &TriggerArgs, options: RunOptions) -> Result<bool> {
    let platform = super::platform(options.platform.as_deref())?;
    let selected = options
        .python
        .iter()
        .map(|v| {
            v.parse::<PythonVersion>()
                .with_context(|| format!("Invalid --python value: {}", v))
        })
        .collect::<Result<Vec<_>>>()?;

    let resolved = super::resolve(config_path, trigger).await?;

    if let Some(missing) = selected
        .iter()
        .find(|v| !resolved.config.interpreters.iter().any(|e| e.version == **v))
    {
        anyhow::bail!("Python {} is not part of the matrix", missing);
    }

    let cells: Vec<MatrixCell> =
        MatrixCell::enumerate(&resolved.config.interpreters, platform, &resolved.identity)
            .into_iter()
            .map(|cell| {
                if selected.is_empty() || selected.contains(&cell.interpreter_version) {
                    cell
                } else {
                    cell.filtered()
                }
            })
            .collect();

    let vars = VariableContextBuilder::new()
        .with_trigger(&resolved.trigger)
        .with_env()
        .build();

    let executor = Arc::new(LocalProcessExecutor::new());
    let mut orchestrator =
        MatrixOrchestrator::new(executor, Arc::new(resolved.config), &resolved.workdir)
            .with_variables(vars);
    if !options.json {
        orchestrator = orchestrator.with_sink(Arc::new(TerminalSink));
    }

    let report = orchestrator.run(&resolved.identity, &cells).await;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(report.success())
}

fn print_summary(report: &MatrixReport) {
    println!("\n--- Cell Summary ---");
    for result in &report.results {
        let status = match (result.outcome, result.failure_count) {
            (CellOutcome::Passed, _) => "✓ passed".to_string(),
            (CellOutcome::TestsFailed, Some(n)) => format!("✗ tests failed ({} failures)", n),
            (CellOutcome::TestsFailedThreshold, Some(n)) => {
                format!("✗ tests stopped at failure ceiling ({} failures)", n)
            }
            (outcome, _) => format!("✗ {:?}", outcome),
        };
        println!("  {} - {}", result.cell, status);
    }
    for cell in &report.skipped {
        let reason = cell
            .skip_reason
            .as_ref()
            .map(|r| r.to_string())
            .unwrap_or_default();
        println!("  {} - ⊘ skipped: {}", cell, reason);
    }

    if report.success() {
        println!("\n✓ Matrix succeeded!");
    } else {
        println!("\n✗ Matrix failed");
    }
}
