//! Logger middleware.
//!
//! A logger is a [`Middleware`] that renders what it observes through a
//! [`ResultFormatter`] and writes the text out. Formatters only read test
//! data; they never change an outcome.
//!
//! Two formatters are provided:
//!
//! - [`ConsoleFormatter`]: human-readable output with `quiet`, `default` and
//!   `full` verbosity and optional stack traces
//! - [`BuildServerFormatter`]: TeamCity service messages for CI servers
//!
//! The summary is rendered from the run's tally, so the logger must sit
//! outside the [`Counter`](crate::counter::Counter) in the chain.

pub mod build_server;
pub mod console;

pub use build_server::BuildServerFormatter;
pub use console::ConsoleFormatter;

use crate::chain::{RunNext, TestNext};
use crate::middleware::{Middleware, MiddlewareError, MiddlewareResult, RunContext};
use crate::types::{Outcome, Tally, Test, TestResult};
use async_trait::async_trait;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

pub trait ResultFormatter: Send + Sync {
    fn format_run_start(&self, _files: &[PathBuf]) -> Option<String> {
        None
    }

    fn format_test_start(&self, _test: &Test) -> Option<String> {
        None
    }

    fn format_test(&self, test: &Test, outcome: &Outcome) -> Option<String>;

    /// Closes out a started test whose outcome will never reach this logger,
    /// for instance because an outer layer cancelled it.
    fn format_test_abandoned(&self, _test: &Test) -> Option<String> {
        None
    }

    fn format_summary(&self, results: &[TestResult], tally: &Tally) -> String;
}

pub struct LoggerMiddleware<F> {
    name: String,
    formatter: F,
    out: Mutex<Box<dyn Write + Send>>,
}

impl<F: ResultFormatter> LoggerMiddleware<F> {
    /// Logger writing to standard output.
    pub fn new(name: impl Into<String>, formatter: F) -> Self {
        Self::with_writer(name, formatter, io::stdout())
    }

    pub fn with_writer(
        name: impl Into<String>,
        formatter: F,
        writer: impl Write + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            formatter,
            out: Mutex::new(Box::new(writer)),
        }
    }

    pub fn formatter(&self) -> &F {
        &self.formatter
    }

    fn emit(&self, text: &str) -> MiddlewareResult<()> {
        if text.is_empty() {
            return Ok(());
        }

        let mut out = self
            .out
            .lock()
            .map_err(|_| MiddlewareError::failed("log writer lock poisoned"))?;
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

/// Emits the formatter's abandoned-test text if dropped while still armed.
struct StartedTest<'a, F: ResultFormatter> {
    logger: &'a LoggerMiddleware<F>,
    test: &'a Test,
    armed: bool,
}

impl<F: ResultFormatter> Drop for StartedTest<'_, F> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(text) = self.logger.formatter.format_test_abandoned(self.test) {
            if let Err(e) = self.logger.emit(&text) {
                warn!("Failed to close out {}: {}", self.test.id(), e);
            }
        }
    }
}

pub type ConsoleLogger = LoggerMiddleware<ConsoleFormatter>;
pub type BuildServerLogger = LoggerMiddleware<BuildServerFormatter>;

impl ConsoleLogger {
    pub fn console(formatter: ConsoleFormatter) -> Self {
        Self::new("console-logger", formatter)
    }
}

impl BuildServerLogger {
    pub fn build_server(formatter: BuildServerFormatter) -> Self {
        Self::new("build-server-logger", formatter)
    }
}

#[async_trait]
impl<F: ResultFormatter> Middleware for LoggerMiddleware<F> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn around_test(
        &self,
        test: &Test,
        ctx: &mut RunContext,
        next: TestNext<'_>,
    ) -> MiddlewareResult<Outcome> {
        let started = match self.formatter.format_test_start(test) {
            Some(text) => {
                self.emit(&text)?;
                true
            }
            None => false,
        };

        let mut guard = StartedTest {
            logger: self,
            test,
            armed: started,
        };
        let outcome = next.run(test, ctx).await;
        guard.armed = false;

        if let Some(text) = self.formatter.format_test(test, &outcome) {
            self.emit(&text)?;
        }
        Ok(outcome)
    }

    async fn around_run(
        &self,
        files: &[PathBuf],
        ctx: &mut RunContext,
        next: RunNext<'_>,
    ) -> MiddlewareResult<Vec<TestResult>> {
        if let Some(text) = self.formatter.format_run_start(files) {
            self.emit(&text)?;
        }

        let results = next.run(files, ctx).await;

        let summary = self.formatter.format_summary(&results, ctx.tally());
        self.emit(&summary)?;
        Ok(results)
    }
}
