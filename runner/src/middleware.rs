//! Middleware protocol.
//!
//! A middleware wraps the execution of every test (`around_test`) and of the
//! whole run (`around_run`). Both hooks receive an explicit continuation that
//! invokes the next layer inward; the innermost continuation executes the
//! tests themselves. Layers are composed in the order they are supplied, the
//! first one being outermost.
//!
//! A hook may run code before or after its continuation, call it several
//! times, or not at all, in which case it must produce the terminal outcome
//! itself. Errors and panics raised by a hook are caught by the continuation
//! that invoked it and turned into errored outcomes.

use crate::chain::{RunNext, TestNext};
use crate::config::LogOptions;
use crate::types::{Outcome, Tally, Test, TestResult};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MiddlewareError {
    #[error("{message}")]
    Failed { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MiddlewareError {
    pub fn failed(message: impl Into<String>) -> Self {
        MiddlewareError::Failed {
            message: message.into(),
        }
    }
}

pub type MiddlewareResult<T> = Result<T, MiddlewareError>;

#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    async fn around_test(
        &self,
        test: &Test,
        ctx: &mut RunContext,
        next: TestNext<'_>,
    ) -> MiddlewareResult<Outcome> {
        Ok(next.run(test, ctx).await)
    }

    async fn around_run(
        &self,
        files: &[PathBuf],
        ctx: &mut RunContext,
        next: RunNext<'_>,
    ) -> MiddlewareResult<Vec<TestResult>> {
        Ok(next.run(files, ctx).await)
    }
}

/// State shared by every layer for the duration of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    files: Vec<PathBuf>,
    options: LogOptions,
    tally: Tally,
    completed: Vec<TestResult>,
}

impl RunContext {
    pub fn new(files: Vec<PathBuf>, options: LogOptions) -> Self {
        Self {
            files,
            options,
            tally: Tally::new(),
            completed: Vec::new(),
        }
    }

    /// Every file taking part in the run, in the order supplied.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn options(&self) -> LogOptions {
        self.options
    }

    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    pub fn tally_mut(&mut self) -> &mut Tally {
        &mut self.tally
    }

    /// Results recorded so far, including run-level errors.
    pub fn completed(&self) -> &[TestResult] {
        &self.completed
    }

    pub fn record_result(&mut self, result: TestResult) {
        self.completed.push(result);
    }

    pub fn into_tally(self) -> Tally {
        self.tally
    }
}

/// Calls `next` and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

#[async_trait]
impl Middleware for Passthrough {
    fn name(&self) -> &str {
        "noop"
    }
}
