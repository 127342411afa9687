//! Continuations that thread a test (or a run) through the middleware layers.

use crate::executor::TestExecutor;
use crate::loader::TestFile;
use crate::middleware::{Middleware, RunContext};
use crate::types::{ErrorDetail, Outcome, Test, TestResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

/// The full pipeline: ordered layers around a leaf executor.
#[derive(Clone, Copy)]
pub struct Chain<'a> {
    layers: &'a [Box<dyn Middleware>],
    executor: &'a dyn TestExecutor,
}

impl<'a> Chain<'a> {
    pub fn new(layers: &'a [Box<dyn Middleware>], executor: &'a dyn TestExecutor) -> Self {
        Self { layers, executor }
    }

    /// Continuation entering the outermost `around_test`.
    pub fn test_next(&self) -> TestNext<'a> {
        TestNext {
            layers: self.layers,
            executor: self.executor,
        }
    }

    /// Continuation entering the outermost `around_run`.
    pub fn run_next(&self) -> RunNext<'a> {
        RunNext {
            layers: self.layers,
            chain: *self,
        }
    }

    async fn execute_files(&self, files: &[PathBuf], ctx: &mut RunContext) -> Vec<TestResult> {
        let mut results = Vec::with_capacity(files.len());
        for path in files {
            let result = self.execute_file(path, ctx).await;
            ctx.record_result(result.clone());
            results.push(result);
        }
        results
    }

    async fn execute_file(&self, path: &Path, ctx: &mut RunContext) -> TestResult {
        let file = match TestFile::load(path).await {
            Ok(file) => file,
            Err(e) => {
                warn!("{}", e);
                return TestResult::file_errored(path, ErrorDetail::new(e.to_string()));
            }
        };

        debug!("Loaded {} test(s) from {}", file.tests.len(), path.display());

        let mut tests = file.tests;
        for test in &mut tests {
            let outcome = self.test_next().run(test, ctx).await;
            if let Err(e) = test.record(outcome) {
                warn!("{}", e);
            }
        }

        TestResult::for_file(path, tests)
    }
}

/// Continuation handed to `around_test`.
#[derive(Clone, Copy)]
pub struct TestNext<'a> {
    layers: &'a [Box<dyn Middleware>],
    executor: &'a dyn TestExecutor,
}

impl<'a> TestNext<'a> {
    /// Invokes the next layer inward, or executes the test at the leaf.
    pub fn run<'b>(self, test: &'b Test, ctx: &'b mut RunContext) -> BoxFuture<'b, Outcome>
    where
        'a: 'b,
    {
        async move {
            let Some((layer, inner)) = self.layers.split_first() else {
                return execute_leaf(self.executor, test, ctx).await;
            };

            let next = TestNext {
                layers: inner,
                executor: self.executor,
            };
            let started = Instant::now();
            let hook = AssertUnwindSafe(layer.around_test(test, ctx, next));

            match hook.catch_unwind().await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    warn!("Middleware '{}' failed on {}: {}", layer.name(), test.id(), e);
                    Outcome::errored(
                        ErrorDetail::new(format!("middleware '{}' failed: {}", layer.name(), e)),
                        started.elapsed(),
                    )
                }
                Err(payload) => {
                    warn!("Middleware '{}' panicked on {}", layer.name(), test.id());
                    let message = format!(
                        "middleware '{}' panicked: {}",
                        layer.name(),
                        panic_message(payload)
                    );
                    Outcome::errored(ErrorDetail::new(message), started.elapsed())
                }
            }
        }
        .boxed()
    }
}

/// Continuation handed to `around_run`.
#[derive(Clone, Copy)]
pub struct RunNext<'a> {
    layers: &'a [Box<dyn Middleware>],
    chain: Chain<'a>,
}

impl<'a> RunNext<'a> {
    /// Invokes the next layer inward, or executes every file at the leaf.
    pub fn run<'b>(
        self,
        files: &'b [PathBuf],
        ctx: &'b mut RunContext,
    ) -> BoxFuture<'b, Vec<TestResult>>
    where
        'a: 'b,
    {
        async move {
            let Some((layer, inner)) = self.layers.split_first() else {
                return self.chain.execute_files(files, ctx).await;
            };

            let next = RunNext {
                layers: inner,
                chain: self.chain,
            };
            let hook = AssertUnwindSafe(layer.around_run(files, ctx, next));

            let error = match hook.catch_unwind().await {
                Ok(Ok(results)) => return results,
                Ok(Err(e)) => {
                    warn!("Middleware '{}' failed during the run: {}", layer.name(), e);
                    ErrorDetail::new(format!("middleware '{}' failed: {}", layer.name(), e))
                }
                Err(payload) => {
                    warn!("Middleware '{}' panicked during the run", layer.name());
                    ErrorDetail::new(format!(
                        "middleware '{}' panicked: {}",
                        layer.name(),
                        panic_message(payload)
                    ))
                }
            };

            // Keep whatever completed before the hook gave up.
            ctx.record_result(TestResult::run_errored(error));
            ctx.completed().to_vec()
        }
        .boxed()
    }
}

/// Runs the executor, turning a panicking test body into an errored outcome.
async fn execute_leaf(executor: &dyn TestExecutor, test: &Test, ctx: &RunContext) -> Outcome {
    let started = Instant::now();
    match AssertUnwindSafe(executor.execute(test, ctx)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => {
            warn!("Test body panicked in {}", test.id());
            Outcome::errored(
                ErrorDetail::new(format!("test body panicked: {}", panic_message(payload))),
                started.elapsed(),
            )
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
