//! Leaf test execution: runs a test body and classifies what happened.

use crate::config::ExecutorConfig;
use crate::middleware::RunContext;
use crate::types::{ErrorDetail, Outcome, Test};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

/// Innermost step of the test chain.
#[async_trait]
pub trait TestExecutor: Send + Sync {
    async fn execute(&self, test: &Test, ctx: &RunContext) -> Outcome;
}

/// Runs each test body as `<shell> -c <run>` in the directory of its file.
pub struct ProcessExecutor {
    config: ExecutorConfig,
}

impl ProcessExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

#[async_trait]
impl TestExecutor for ProcessExecutor {
    async fn execute(&self, test: &Test, _ctx: &RunContext) -> Outcome {
        let case = test.case();
        let shell = case.shell.as_deref().unwrap_or(&self.config.shell);
        let timeout = case.timeout.or(self.config.default_timeout);
        let started = Instant::now();

        let mut command = Command::new(shell);
        command
            .arg("-c")
            .arg(&case.run)
            .envs(&case.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = test.file().parent().filter(|d| d.is_dir()) {
            command.current_dir(dir);
        }

        debug!("Running {} with {}", test.id(), shell);

        let output = match timeout {
            Some(limit) => match tokio::time::timeout(limit, command.output()).await {
                Ok(output) => output,
                Err(_) => {
                    return Outcome::errored(
                        ErrorDetail::new(format!("timed out after {:?}", limit)),
                        started.elapsed(),
                    );
                }
            },
            None => command.output().await,
        };
        let duration = started.elapsed();

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return Outcome::errored(
                    ErrorDetail::new(format!("failed to spawn `{}`: {}", shell, e)),
                    duration,
                );
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let Some(code) = output.status.code() else {
            return Outcome::errored(
                ErrorDetail::new(format!("terminated without exit status ({})", output.status))
                    .with_stack(stderr.into_owned()),
                duration,
            );
        };

        match case.expect.check(code, &stdout, &stderr) {
            Ok(()) => Outcome::passed(duration),
            Err(failure) => Outcome::failed(failure, duration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogOptions;
    use crate::types::{Expectation, TestCase, TestStatus};
    use std::time::Duration;
    use tempfile::tempdir;

    fn ctx() -> RunContext {
        RunContext::new(Vec::new(), LogOptions::default())
    }

    fn test_running(run: &str) -> Test {
        test_with(TestCase::new(run))
    }

    fn test_with(case: TestCase) -> Test {
        Test::new("/nonexistent/a.test.toml", "case", 0, case)
    }

    #[tokio::test]
    async fn test_executor_pass() {
        let executor = ProcessExecutor::default();
        let test = test_with(TestCase::new("echo hello").with_expectation(Expectation {
            stdout: Some("hello\n".to_string()),
            ..Default::default()
        }));

        let outcome = executor.execute(&test, &ctx()).await;
        assert!(outcome.is_pass(), "{:?}", outcome);
    }

    #[tokio::test]
    async fn test_executor_assertion_failure() {
        let executor = ProcessExecutor::default();
        let test = test_running("echo oops >&2; exit 3");

        let outcome = executor.execute(&test, &ctx()).await;
        match outcome {
            Outcome::Failed { failure, .. } => {
                assert_eq!(failure.expected.as_deref(), Some("0"));
                assert_eq!(failure.actual.as_deref(), Some("3"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_executor_spawn_error() {
        let executor =
            ProcessExecutor::new(ExecutorConfig::new().with_shell("/nonexistent/shell"));
        let test = test_running("true");

        let outcome = executor.execute(&test, &ctx()).await;
        assert_eq!(outcome.status(), TestStatus::Errored);
        if let Outcome::Errored { error, .. } = outcome {
            assert!(error.message.contains("failed to spawn"));
        }
    }

    #[tokio::test]
    async fn test_executor_timeout_is_error() {
        let executor = ProcessExecutor::default();
        let test = test_with(TestCase::new("sleep 5").with_timeout(Duration::from_millis(50)));

        let outcome = executor.execute(&test, &ctx()).await;
        assert_eq!(outcome.status(), TestStatus::Errored);
        assert!(outcome.duration() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_executor_signal_is_error() {
        let executor = ProcessExecutor::default();
        let test = test_running("kill -9 $$");

        let outcome = executor.execute(&test, &ctx()).await;
        assert_eq!(outcome.status(), TestStatus::Errored);
    }

    #[tokio::test]
    async fn test_executor_runs_in_file_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();

        let mut case = TestCase::new("cat marker.txt");
        case.expect.stdout = Some("here".to_string());
        let test = Test::new(dir.path().join("a.test.toml"), "cwd", 0, case);

        let outcome = ProcessExecutor::default().execute(&test, &ctx()).await;
        assert!(outcome.is_pass(), "{:?}", outcome);
    }

    #[tokio::test]
    async fn test_executor_passes_environment() {
        let mut case = TestCase::new("printf %s \"$GREETING\"");
        case.env.insert("GREETING".to_string(), "hi".to_string());
        case.expect.stdout = Some("hi".to_string());
        let test = Test::new("/nonexistent/a.test.toml", "env", 0, case);

        let outcome = ProcessExecutor::default().execute(&test, &ctx()).await;
        assert!(outcome.is_pass(), "{:?}", outcome);
    }
}
