//! Git queries used to resolve the build identity.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};
use wheelhouse_core::executor::{Executor, ProcessSpec};
use wheelhouse_core::{Error, GitContext, Result};

/// Reads repository metadata through an [`Executor`].
pub struct GitReader {
    executor: Arc<dyn Executor>,
    repo_dir: PathBuf,
    count_ref: String,
}

impl GitReader {
    pub fn new(executor: Arc<dyn Executor>, repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            repo_dir: repo_dir.into(),
            count_ref: "HEAD".to_string(),
        }
    }

    /// Count commits reachable from `count_ref` instead of `HEAD`.
    pub fn with_count_ref(mut self, count_ref: impl Into<String>) -> Self {
        self.count_ref = count_ref.into();
        self
    }

    /// Number of commits reachable from the configured ref.
    pub async fn commit_count(&self) -> Result<u64> {
        let spec = ProcessSpec {
            label: "git rev-list".to_string(),
            program: "git".to_string(),
            args: vec![
                "rev-list".to_string(),
                "--count".to_string(),
                self.count_ref.clone(),
            ],
            working_dir: Some(self.repo_dir.clone()),
            ..Default::default()
        };

        let output = self
            .executor
            .run(spec)
            .await
            .map_err(|e| Error::GitQueryFailed(e.to_string()))?;

        if !output.success() {
            error!(
                git_ref = %self.count_ref,
                exit_code = ?output.exit_code,
                stderr = %output.stderr.trim(),
                "git rev-list failed"
            );
            return Err(Error::GitQueryFailed(format!(
                "git rev-list --count {} exited with {:?}: {}",
                self.count_ref,
                output.exit_code,
                output.stderr.trim()
            )));
        }

        let raw = output.stdout.trim();
        let count = raw.parse::<u64>().map_err(|_| {
            Error::GitQueryFailed(format!("unexpected commit count output: {:?}", raw))
        })?;
        debug!(git_ref = %self.count_ref, count, "Counted commits");
        Ok(count)
    }

    pub async fn context(&self) -> Result<GitContext> {
        Ok(GitContext {
            main_commit_count: self.commit_count().await?,
        })
    }
}
