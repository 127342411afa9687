use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestId {
    pub file: PathBuf,
    pub name: String,
}

impl TestId {
    pub fn new(file: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.file.display(), self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pending,
    Passed,
    Failed,
    Errored,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Pending => write!(f, "pending"),
            TestStatus::Passed => write!(f, "passed"),
            TestStatus::Failed => write!(f, "failed"),
            TestStatus::Errored => write!(f, "errored"),
        }
    }
}

/// An expectation that did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionFailure {
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl AssertionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    pub fn with_comparison(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }
}

/// Anything that went wrong outside of an assertion: a test body that could
/// not run, a middleware hook that failed, a file that could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    pub stack: Option<String>,
}

impl ErrorDetail {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        let stack = stack.into();
        if !stack.trim().is_empty() {
            self.stack = Some(stack);
        }
        self
    }

    /// Builds a detail from an error and its `source()` chain.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {}", cause));
            source = cause.source();
        }
        Self::new(error.to_string()).with_stack(chain.join("\n"))
    }
}

/// Terminal result of executing a test body, as it travels through the
/// middleware chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Passed {
        duration: Duration,
    },
    Failed {
        failure: AssertionFailure,
        duration: Duration,
    },
    Errored {
        error: ErrorDetail,
        duration: Duration,
    },
}

impl Outcome {
    pub fn passed(duration: Duration) -> Self {
        Outcome::Passed { duration }
    }

    pub fn failed(failure: AssertionFailure, duration: Duration) -> Self {
        Outcome::Failed { failure, duration }
    }

    pub fn errored(error: ErrorDetail, duration: Duration) -> Self {
        Outcome::Errored { error, duration }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Passed { .. })
    }

    pub fn status(&self) -> TestStatus {
        match self {
            Outcome::Passed { .. } => TestStatus::Passed,
            Outcome::Failed { .. } => TestStatus::Failed,
            Outcome::Errored { .. } => TestStatus::Errored,
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Outcome::Passed { duration } => *duration,
            Outcome::Failed { duration, .. } => *duration,
            Outcome::Errored { duration, .. } => *duration,
        }
    }
}

/// How a single test is executed and judged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub run: String,
    pub shell: Option<String>,
    pub timeout: Option<Duration>,
    pub env: BTreeMap<String, String>,
    pub expect: Expectation,
}

impl TestCase {
    pub fn new(run: impl Into<String>) -> Self {
        Self {
            run: run.into(),
            shell: None,
            timeout: None,
            env: BTreeMap::new(),
            expect: Expectation::default(),
        }
    }

    pub fn with_expectation(mut self, expect: Expectation) -> Self {
        self.expect = expect;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    pub status: i32,
    pub stdout: Option<String>,
    pub stdout_contains: Vec<String>,
    pub stderr_contains: Vec<String>,
}

impl Expectation {
    /// Checks the captured process output, reporting the first expectation
    /// that does not hold.
    pub fn check(&self, status: i32, stdout: &str, stderr: &str) -> Result<(), AssertionFailure> {
        if status != self.status {
            return Err(AssertionFailure::new("exit status mismatch")
                .with_comparison(self.status.to_string(), status.to_string()));
        }

        if let Some(expected) = &self.stdout {
            if expected != stdout {
                return Err(AssertionFailure::new("stdout mismatch")
                    .with_comparison(expected.clone(), stdout));
            }
        }

        for needle in &self.stdout_contains {
            if !stdout.contains(needle.as_str()) {
                return Err(
                    AssertionFailure::new(format!("stdout does not contain {:?}", needle))
                        .with_comparison(needle.clone(), stdout),
                );
            }
        }

        for needle in &self.stderr_contains {
            if !stderr.contains(needle.as_str()) {
                return Err(
                    AssertionFailure::new(format!("stderr does not contain {:?}", needle))
                        .with_comparison(needle.clone(), stderr),
                );
            }
        }

        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("outcome of {0} is already recorded")]
pub struct OutcomeAlreadyRecorded(pub TestId);

/// A registered test. Its outcome starts pending and is recorded once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Test {
    id: TestId,
    index: usize,
    case: TestCase,
    outcome: Option<Outcome>,
}

impl Test {
    pub fn new(file: impl Into<PathBuf>, name: impl Into<String>, index: usize, case: TestCase) -> Self {
        Self {
            id: TestId::new(file, name),
            index,
            case,
            outcome: None,
        }
    }

    pub fn id(&self) -> &TestId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn file(&self) -> &Path {
        &self.id.file
    }

    /// Position of the declaration within its file.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn case(&self) -> &TestCase {
        &self.case
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn status(&self) -> TestStatus {
        self.outcome
            .as_ref()
            .map(Outcome::status)
            .unwrap_or(TestStatus::Pending)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.outcome.as_ref().map(Outcome::duration)
    }

    pub fn record(&mut self, outcome: Outcome) -> Result<(), OutcomeAlreadyRecorded> {
        if self.outcome.is_some() {
            return Err(OutcomeAlreadyRecorded(self.id.clone()));
        }
        self.outcome = Some(outcome);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultScope {
    File(PathBuf),
    Run,
}

impl fmt::Display for ResultScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultScope::File(path) => write!(f, "{}", path.display()),
            ResultScope::Run => write!(f, "<run>"),
        }
    }
}

/// Aggregated outcome of a file (or of the run itself, when a run-level
/// hook failed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    scope: ResultScope,
    tests: Vec<Test>,
    error: Option<ErrorDetail>,
}

impl TestResult {
    pub fn for_file(path: impl Into<PathBuf>, tests: Vec<Test>) -> Self {
        Self {
            scope: ResultScope::File(path.into()),
            tests,
            error: None,
        }
    }

    pub fn file_errored(path: impl Into<PathBuf>, error: ErrorDetail) -> Self {
        Self {
            scope: ResultScope::File(path.into()),
            tests: Vec::new(),
            error: Some(error),
        }
    }

    pub fn run_errored(error: ErrorDetail) -> Self {
        Self {
            scope: ResultScope::Run,
            tests: Vec::new(),
            error: Some(error),
        }
    }

    pub fn scope(&self) -> &ResultScope {
        &self.scope
    }

    pub fn file(&self) -> Option<&Path> {
        match &self.scope {
            ResultScope::File(path) => Some(path),
            ResultScope::Run => None,
        }
    }

    pub fn tests(&self) -> &[Test] {
        &self.tests
    }

    /// Load or run-level error, if the scope never got to run its tests.
    pub fn error(&self) -> Option<&ErrorDetail> {
        self.error.as_ref()
    }

    pub fn has_passed(&self) -> bool {
        self.error.is_none() && self.tests.iter().all(|t| t.status() == TestStatus::Passed)
    }

    pub fn total(&self) -> usize {
        self.tests.len()
    }

    pub fn passed(&self) -> usize {
        self.count(TestStatus::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(TestStatus::Failed)
    }

    pub fn errored(&self) -> usize {
        self.count(TestStatus::Errored)
    }

    pub fn duration(&self) -> Duration {
        self.tests.iter().filter_map(Test::duration).sum()
    }

    fn count(&self, status: TestStatus) -> usize {
        self.tests.iter().filter(|t| t.status() == status).count()
    }
}

/// Outcome counts for a run. Each test is counted once, by the last status
/// observed for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    statuses: HashMap<TestId, TestStatus>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: &TestId, outcome: &Outcome) {
        self.statuses.insert(id.clone(), outcome.status());
    }

    /// Replaces observed statuses with the outcomes recorded on the results.
    pub fn reconcile(&mut self, results: &[TestResult]) {
        for test in results.iter().flat_map(TestResult::tests) {
            if let Some(outcome) = test.outcome() {
                self.record(test.id(), outcome);
            }
        }
    }

    pub fn passed(&self) -> usize {
        self.count(TestStatus::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(TestStatus::Failed)
    }

    pub fn errored(&self) -> usize {
        self.count(TestStatus::Errored)
    }

    pub fn total(&self) -> usize {
        self.passed() + self.failed() + self.errored()
    }

    fn count(&self, status: TestStatus) -> usize {
        self.statuses.values().filter(|s| **s == status).count()
    }
}
