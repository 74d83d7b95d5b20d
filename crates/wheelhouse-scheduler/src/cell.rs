//! Build, locate, install and test one matrix cell.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};
use wheelhouse_config::{CellVars, StepConfig, VariableContext, WheelhouseConfig};
use wheelhouse_core::artifact::ArtifactName;
use wheelhouse_core::executor::{Executor, ProcessOutput, ProcessSpec};
use wheelhouse_core::{BuildIdentity, CellFailure, CellResult, MatrixCell};

use crate::events::{EventSink, MatrixEvent};
use crate::summary::TestSummary;

/// Lines of captured output included in failure logs.
const OUTPUT_TAIL_LINES: usize = 40;

const ARTIFACT_MATCH: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Runs the steps of a single cell. The first failing step ends the cell.
pub struct CellRunner {
    executor: Arc<dyn Executor>,
    config: Arc<WheelhouseConfig>,
    workdir: PathBuf,
}

/// A step that did not produce a usable result.
struct StepError {
    exit_code: Option<i32>,
    message: String,
    /// Captured output, absent when the process never started.
    output: Option<ProcessOutput>,
}

impl CellRunner {
    pub fn new(
        executor: Arc<dyn Executor>,
        config: Arc<WheelhouseConfig>,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executor,
            config,
            workdir: workdir.into(),
        }
    }

    /// Directory the build tool writes artifacts into.
    pub fn dist_dir(&self) -> PathBuf {
        self.workdir.join(&self.config.dist_dir)
    }

    /// Run every step of `cell`. Never fails: problems become the cell's outcome.
    pub async fn run_cell(
        &self,
        cell: &MatrixCell,
        identity: &BuildIdentity,
        vars: &VariableContext,
        sink: &dyn EventSink,
    ) -> CellResult {
        let started_at = Utc::now();
        let mut vars = vars.clone();
        vars.cell = CellVars::from(cell);

        if let Err(e) = self.build(cell, identity, &vars, sink).await {
            let failure = CellFailure::BuildFailed {
                exit_code: e.exit_code,
                message: e.message,
            };
            return CellResult::failed(cell.clone(), failure, None, started_at);
        }

        let artifact = match self.locate(cell) {
            Ok(path) => path,
            Err(failure) => {
                error!(cell = %cell, step = "locate", error = %failure, "Artifact lookup failed");
                return CellResult::failed(cell.clone(), failure, None, started_at);
            }
        };
        let artifact_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if let Err(e) = self.install(cell, &artifact, &vars, sink).await {
            let failure = CellFailure::InstallFailed {
                exit_code: e.exit_code,
                message: e.message,
            };
            return CellResult::failed(cell.clone(), failure, Some(artifact_name), started_at);
        }

        match self.test(cell, &vars, sink).await {
            None => CellResult::passed(cell.clone(), artifact_name, started_at),
            Some(failure) => {
                CellResult::failed(cell.clone(), failure, Some(artifact_name), started_at)
            }
        }
    }

    async fn build(
        &self,
        cell: &MatrixCell,
        identity: &BuildIdentity,
        vars: &VariableContext,
        sink: &dyn EventSink,
    ) -> Result<ProcessOutput, StepError> {
        let mut spec = self
            .step_spec("build", &self.config.build, vars)
            .inspect_err(|e| {
                error!(cell = %cell, step = "build", error = %e.message, "Step could not start");
            })?;

        // The identity travels with the build invocation only. Stale values
        // inherited from the parent are removed so they cannot leak in.
        let names = &self.config.identity_env;
        spec.env_remove = identity.unset_env(names);
        spec.env.extend(identity.to_env(names));

        self.run_step(cell, "build", spec, sink).await
    }

    /// Find the single artifact for this cell's interpreter tag.
    fn locate(&self, cell: &MatrixCell) -> Result<PathBuf, CellFailure> {
        let tag = cell.interpreter_tag();
        let ext = &self.config.artifact_ext;
        let dist = self.dist_dir();
        let pattern = dist
            .join(ArtifactName::pattern(&self.config.package, &tag, ext))
            .to_string_lossy()
            .to_string();

        let matches = find_artifacts(&dist, &self.config.package, &tag, ext);
        debug!(cell = %cell, pattern = %pattern, found = matches.len(), "Located artifacts");

        match matches.as_slice() {
            [] => Err(CellFailure::ArtifactNotFound { pattern }),
            [only] => Ok(only.clone()),
            _ => Err(CellFailure::ArtifactAmbiguous {
                pattern,
                count: matches.len(),
            }),
        }
    }

    async fn install(
        &self,
        cell: &MatrixCell,
        artifact: &Path,
        vars: &VariableContext,
        sink: &dyn EventSink,
    ) -> Result<ProcessOutput, StepError> {
        let spec = self
            .step_spec("install", &self.config.install.step, vars)
            .inspect_err(|e| {
                error!(cell = %cell, step = "install", error = %e.message, "Step could not start");
            })?
            .arg(artifact.to_string_lossy())
            .args(vars.interpolate_vec(&self.config.install.with));

        self.run_step(cell, "install", spec, sink).await
    }

    /// Returns the failure, or `None` when the suite passed.
    async fn test(
        &self,
        cell: &MatrixCell,
        vars: &VariableContext,
        sink: &dyn EventSink,
    ) -> Option<CellFailure> {
        let policy = self.config.test.policy;
        let spec = match self.step_spec("test", &self.config.test.step, vars) {
            Ok(spec) => spec
                .args(policy.flags())
                .args(vars.interpolate_vec(&self.config.test.args)),
            Err(e) => {
                error!(cell = %cell, step = "test", error = %e.message, "Step could not start");
                return Some(CellFailure::TestsFailed { failures: None });
            }
        };

        let err = match self.run_step(cell, "test", spec, sink).await {
            Ok(_) => return None,
            Err(err) => err,
        };

        let summary = err
            .output
            .as_ref()
            .filter(|o| !o.timed_out)
            .and_then(|o| TestSummary::parse(&o.stdout));

        match summary {
            Some(s) if s.stopped_early || policy.reached_ceiling(s.failures()) => {
                Some(CellFailure::TestsFailedThreshold {
                    failures: s.failures(),
                    ceiling: policy.max_failures,
                })
            }
            Some(s) => Some(CellFailure::TestsFailed {
                failures: Some(s.failures()),
            }),
            None => Some(CellFailure::TestsFailed { failures: None }),
        }
    }

    fn step_spec(
        &self,
        label: &str,
        step: &StepConfig,
        vars: &VariableContext,
    ) -> Result<ProcessSpec, StepError> {
        let command = vars.interpolate_vec(&step.command);
        let spec = ProcessSpec::from_command(label, &command).ok_or_else(|| StepError {
            exit_code: None,
            message: format!("{} command is empty", label),
            output: None,
        })?;

        let mut spec = spec.working_dir(&self.workdir).timeout(step.timeout);
        spec.env.extend(vars.interpolate_map(&step.env));
        Ok(spec)
    }

    async fn run_step(
        &self,
        cell: &MatrixCell,
        step: &'static str,
        spec: ProcessSpec,
        sink: &dyn EventSink,
    ) -> Result<ProcessOutput, StepError> {
        let command = spec.display_command();
        let timeout = spec.timeout;
        let result = self.executor.run(spec).await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                error!(cell = %cell, step, command = %command, error = %e, "Step could not start");
                sink.emit(&MatrixEvent::StepFinished {
                    cell: cell.clone(),
                    step,
                    success: false,
                    duration_ms: 0,
                });
                return Err(StepError {
                    exit_code: None,
                    message: e.to_string(),
                    output: None,
                });
            }
        };

        sink.emit(&MatrixEvent::StepFinished {
            cell: cell.clone(),
            step,
            success: output.success(),
            duration_ms: output.duration_ms,
        });

        if output.success() {
            return Ok(output);
        }

        let message = if output.timed_out {
            let secs = timeout.map(|t| t.as_secs()).unwrap_or_default();
            warn!(cell = %cell, step, timeout_secs = secs, "Step timed out");
            format!("timed out after {}s", secs)
        } else {
            last_line(&output)
        };

        error!(
            cell = %cell,
            step,
            command = %command,
            exit_code = ?output.exit_code,
            output = %output.tail(OUTPUT_TAIL_LINES),
            "Step failed"
        );

        Err(StepError {
            exit_code: output.exit_code,
            message,
            output: Some(output),
        })
    }
}

/// Files in `dist` whose names carry exactly `tag` for `package`.
///
/// Only file names are matched against the pattern; `dist` itself is taken
/// literally, so verbatim Windows prefixes and bracketed directories work.
fn find_artifacts(dist: &Path, package: &str, tag: &str, ext: &str) -> Vec<PathBuf> {
    let pattern = match glob::Pattern::new(&format!("*.{}", glob::Pattern::escape(ext))) {
        Ok(pattern) => pattern,
        Err(e) => {
            warn!(ext = %ext, error = %e, "Invalid artifact pattern");
            return Vec::new();
        }
    };

    let entries = match std::fs::read_dir(dist) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dist = %dist.display(), error = %e, "Dist directory not readable");
            return Vec::new();
        }
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                warn!(error = %e, "Unreadable dist entry");
                None
            }
        })
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .filter(|n| pattern.matches_with(n, ARTIFACT_MATCH))
                .and_then(ArtifactName::parse)
                .is_some_and(|name| name.matches(package, tag, ext))
        })
        .collect();
    found.sort();
    found
}

/// Last non-empty line of stderr, falling back to stdout.
fn last_line(output: &ProcessOutput) -> String {
    let last = |text: &str| {
        text.lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
    };
    last(&output.stderr)
        .or_else(|| last(&output.stdout))
        .unwrap_or_else(|| format!("exited with {:?}", output.exit_code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_artifacts_matches_exact_tag() {
        let tmp = TempDir::new().unwrap();
        for name in [
            "datatable-1.1.0-cp310-cp310-linux_x86_64.whl",
            "datatable-1.1.0-cp31-cp31-linux_x86_64.whl",
            "datatable-1.1.0-cp3100-cp3100-linux_x86_64.whl",
            "datatable-1.1.0.tar.gz",
            "other-1.0-cp310-cp310-linux_x86_64.whl",
        ] {
            std::fs::write(tmp.path().join(name), b"").unwrap();
        }

        let found = find_artifacts(tmp.path(), "datatable", "cp310", "whl");
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("datatable-1.1.0-cp310-cp310-linux_x86_64.whl"));
    }

    #[test]
    fn test_find_artifacts_in_dir_with_glob_metacharacters() {
        let tmp = TempDir::new().unwrap();
        let dist = tmp.path().join("agent[1]").join("dist");
        std::fs::create_dir_all(&dist).unwrap();
        std::fs::write(dist.join("datatable-1.1.0-cp39-cp39-win_amd64.whl"), b"").unwrap();
        std::fs::create_dir(dist.join("datatable-0.1-cp39-cp39-any.whl")).unwrap();

        let found = find_artifacts(&dist, "datatable", "cp39", "whl");
        assert_eq!(found, vec![dist.join("datatable-1.1.0-cp39-cp39-win_amd64.whl")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_find_artifacts_in_dir_with_question_mark() {
        let tmp = TempDir::new().unwrap();
        let dist = tmp.path().join("?").join("dist");
        std::fs::create_dir_all(&dist).unwrap();
        std::fs::write(dist.join("datatable-1.1.0-cp39-cp39-linux_x86_64.whl"), b"").unwrap();

        assert_eq!(find_artifacts(&dist, "datatable", "cp39", "whl").len(), 1);
    }

    #[test]
    fn test_find_artifacts_missing_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(find_artifacts(&tmp.path().join("dist"), "datatable", "cp310", "whl").is_empty());
    }

    #[test]
    fn test_last_line_prefers_stderr() {
        let output = ProcessOutput {
            exit_code: Some(1),
            stdout: "building\ndone\n".to_string(),
            stderr: "error: compiler not found\n\n".to_string(),
            ..Default::default()
        };
        assert_eq!(last_line(&output), "error: compiler not found");

        let silent = ProcessOutput {
            exit_code: Some(2),
            ..Default::default()
        };
        assert_eq!(last_line(&silent), "exited with Some(2)");
    }
}
