use crate::chain::Chain;
use crate::config::{ExecutorConfig, LogOptions};
use crate::executor::{ProcessExecutor, TestExecutor};
use crate::middleware::{Middleware, RunContext};
use crate::types::{Tally, TestResult};
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

/// Layers that make no sense twice in one chain.
const SINGLETON_LAYERS: &[&str] = &["counter", "console-logger", "build-server-logger"];

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Test file path must be absolute: {}", path.display())]
    RelativePath { path: PathBuf },

    #[error("Middleware at position {index} has an empty name")]
    EmptyMiddlewareName { index: usize },

    #[error("Middleware '{name}' appears more than once")]
    DuplicateMiddleware { name: String },

    #[error("Invalid executor configuration: {message}")]
    InvalidConfig { message: String },
}

pub type RunnerResult<T> = Result<T, RunnerError>;

/// Results of a run together with the final tally.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub results: Vec<TestResult>,
    pub tally: Tally,
}

impl RunReport {
    pub fn has_passed(&self) -> bool {
        self.results.iter().all(TestResult::has_passed)
    }
}

/// Loads test files and drives every test through the middleware chain.
///
/// The first middleware supplied is the outermost layer.
pub struct TestRunner {
    middleware: Vec<Box<dyn Middleware>>,
    executor: Box<dyn TestExecutor>,
    options: LogOptions,
}

impl TestRunner {
    pub fn new(middleware: Vec<Box<dyn Middleware>>) -> Self {
        Self {
            middleware,
            executor: Box::new(ProcessExecutor::default()),
            options: LogOptions::default(),
        }
    }

    pub fn with_executor(mut self, executor: impl TestExecutor + 'static) -> Self {
        self.executor = Box::new(executor);
        self
    }

    pub fn with_executor_config(self, config: ExecutorConfig) -> RunnerResult<Self> {
        config
            .validate()
            .map_err(|message| RunnerError::InvalidConfig { message })?;
        Ok(self.with_executor(ProcessExecutor::new(config)))
    }

    pub fn with_log_options(mut self, options: LogOptions) -> Self {
        self.options = options;
        self
    }

    pub fn middleware_names(&self) -> Vec<&str> {
        self.middleware.iter().map(|m| m.name()).collect()
    }

    /// Runs every file and returns one result per file, in input order.
    pub async fn run_tests(&self, files: &[PathBuf]) -> RunnerResult<Vec<TestResult>> {
        Ok(self.run(files).await?.results)
    }

    pub async fn run(&self, files: &[PathBuf]) -> RunnerResult<RunReport> {
        self.validate(files)?;

        info!(
            "Running {} file(s) through {} middleware",
            files.len(),
            self.middleware.len()
        );
        debug!("Middleware chain: {:?}", self.middleware_names());

        let mut ctx = RunContext::new(files.to_vec(), self.options);
        let chain = Chain::new(&self.middleware, self.executor.as_ref());
        let results = chain.run_next().run(files, &mut ctx).await;

        Ok(RunReport {
            results,
            tally: ctx.into_tally(),
        })
    }

    fn validate(&self, files: &[PathBuf]) -> RunnerResult<()> {
        if let Some(path) = files.iter().find(|p| p.is_relative()) {
            return Err(RunnerError::RelativePath { path: path.clone() });
        }

        let mut seen = HashSet::new();
        for (index, layer) in self.middleware.iter().enumerate() {
            let name = layer.name();
            if name.trim().is_empty() {
                return Err(RunnerError::EmptyMiddlewareName { index });
            }
            if SINGLETON_LAYERS.contains(&name) && !seen.insert(name) {
                return Err(RunnerError::DuplicateMiddleware {
                    name: name.to_string(),
                });
            }
        }

        Ok(())
    }
}
