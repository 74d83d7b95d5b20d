//! Local process executor.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};
use wheelhouse_core::executor::*;
use wheelhouse_core::{Error, Result};

/// Runs processes on the local machine and captures their output.
///
/// Child processes inherit the parent environment, minus
/// [`ProcessSpec::env_remove`], plus [`ProcessSpec::env`].
#[derive(Debug, Clone, Default)]
pub struct LocalProcessExecutor;

impl LocalProcessExecutor {
    pub fn new() -> Self {
        Self
    }

    fn command(spec: &ProcessSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);

        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        for name in &spec.env_remove {
            cmd.env_remove(name);
        }
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Executor for LocalProcessExecutor {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn run(&self, spec: ProcessSpec) -> Result<ProcessOutput> {
        let start = Instant::now();
        debug!(step = %spec.label, command = %spec.display_command(), "Starting process");

        let child = Self::command(&spec).spawn().map_err(|e| {
            Error::ExecutionFailed(format!("failed to start {}: {}", spec.program, e))
        })?;

        let waited = match spec.timeout {
            // Dropping the wait future on timeout kills the child.
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .ok(),
            None => Some(child.wait_with_output().await),
        };

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let Some(waited) = waited else {
            warn!(
                step = %spec.label,
                timeout_secs = spec.timeout.map(|t| t.as_secs()).unwrap_or_default(),
                "Process timed out"
            );
            return Ok(ProcessOutput {
                exit_code: None,
                duration_ms,
                timed_out: true,
                ..Default::default()
            });
        };

        let output = waited
            .map_err(|e| Error::ExecutionFailed(format!("{}: {}", spec.program, e)))?;
        let exit_code = output.status.code();

        info!(
            step = %spec.label,
            exit_code = ?exit_code,
            success = output.status.success(),
            duration_ms,
            "Process finished"
        );

        Ok(ProcessOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
            timed_out: false,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec::from_command("test", &["sh".to_string(), "-c".to_string(), script.to_string()])
            .unwrap()
    }

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let output = LocalProcessExecutor::new()
            .run(sh("echo hello; echo oops >&2; exit 3"))
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_env_is_applied() {
        let output = LocalProcessExecutor::new()
            .run(sh("echo $WH_VALUE").env("WH_VALUE", "42"))
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "42");
    }

    #[tokio::test]
    async fn test_env_remove_hides_inherited_variable() {
        temp_env::async_with_vars([("WH_STALE_BUILD_SUFFIX", Some("PR3.7"))], async {
            let echo = "echo \"[${WH_STALE_BUILD_SUFFIX:-unset}]\"";

            let inherited = LocalProcessExecutor::new().run(sh(echo)).await.unwrap();
            assert_eq!(inherited.stdout.trim(), "[PR3.7]");

            let mut spec = sh(echo);
            spec.env_remove.push("WH_STALE_BUILD_SUFFIX".to_string());
            let removed = LocalProcessExecutor::new().run(spec).await.unwrap();
            assert_eq!(removed.stdout.trim(), "[unset]");
        })
        .await;
    }

    #[tokio::test]
    async fn test_working_dir() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("marker.txt"), "").unwrap();
        let output = LocalProcessExecutor::new()
            .run(sh("ls").working_dir(tmp.path()))
            .await
            .unwrap();
        assert!(output.stdout.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let output = LocalProcessExecutor::new()
            .run(sh("sleep 5").timeout(Some(Duration::from_millis(100))))
            .await
            .unwrap();
        assert!(output.timed_out);
        assert_eq!(output.exit_code, None);
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let spec = ProcessSpec::from_command(
            "test",
            &["wheelhouse-definitely-not-a-program".to_string()],
        )
        .unwrap();
        let err = LocalProcessExecutor::new().run(spec).await.unwrap_err();
        assert!(matches!(err, Error::ExecutionFailed(_)));
    }
}
