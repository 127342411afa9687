pub mod chain;
pub mod config;
pub mod counter;
pub mod executor;
pub mod loader;
pub mod logger;
pub mod middleware;
pub mod runner;
pub mod types;

pub use chain::{Chain, RunNext, TestNext};
pub use config::{ExecutorConfig, LogOptions, Verbosity};
pub use counter::Counter;
pub use executor::{ProcessExecutor, TestExecutor};
pub use loader::{LoadError, LoadResult, TestFile};
pub use logger::{
    BuildServerFormatter, BuildServerLogger, ConsoleFormatter, ConsoleLogger, LoggerMiddleware,
    ResultFormatter,
};
pub use middleware::{Middleware, MiddlewareError, MiddlewareResult, Passthrough, RunContext};
pub use runner::{RunReport, RunnerError, RunnerResult, TestRunner};
pub use types::{
    AssertionFailure, ErrorDetail, Expectation, Outcome, OutcomeAlreadyRecorded, ResultScope,
    Tally, Test, TestCase, TestId, TestResult, TestStatus,
};

pub mod prelude {
    pub use crate::chain::*;
    pub use crate::config::*;
    pub use crate::counter::*;
    pub use crate::logger::*;
    pub use crate::middleware::*;
    pub use crate::runner::*;
    pub use crate::types::*;
}
