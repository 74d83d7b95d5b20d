//! Executor trait and process types.
//!
//! Executors run the external tools of a cell (build tool, installer, test
//! runner, git) and report how they exited. Every call runs to completion
//! before returning; there is no background execution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::Result;

/// Specification for a process to run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Short label used in logs (e.g. "build", "git rev-list").
    pub label: String,
    /// Executable to run.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Working directory.
    pub working_dir: Option<PathBuf>,
    /// Environment variables set on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Inherited variables to remove before starting.
    pub env_remove: Vec<String>,
    /// Maximum execution time.
    pub timeout: Option<Duration>,
}

impl ProcessSpec {
    /// Build a spec from a command line whose first element is the program.
    pub fn from_command(label: impl Into<String>, command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            label: label.into(),
            program: program.clone(),
            args: args.to_vec(),
            ..Default::default()
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Command line for logs.
    pub fn display_command(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessOutput {
    /// Exit code, `None` when the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }

    /// Last `lines` lines of stdout followed by stderr, for failure logs.
    pub fn tail(&self, lines: usize) -> String {
        let combined: Vec<&str> = self.stdout.lines().chain(self.stderr.lines()).collect();
        let start = combined.len().saturating_sub(lines);
        combined[start..].join("\n")
    }
}

/// Trait for process executors.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Name of this executor.
    fn name(&self) -> &'static str;

    /// Run a process to completion and capture its output.
    ///
    /// Returns `Err` only when the process could not be started; a process
    /// that ran and exited non-zero is reported through [`ProcessOutput`].
    async fn run(&self, spec: ProcessSpec) -> Result<ProcessOutput>;
}
