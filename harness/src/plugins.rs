//! Built-in plugin middleware, selected with `--middleware name[:arg]`.

use crate::registry::{parse_arg, MiddlewareFactory, RegistryError, RegistryResult};
use async_trait::async_trait;
use runner::{
    ErrorDetail, Middleware, MiddlewareResult, Outcome, Passthrough, RunContext, Test, TestNext,
};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Logs each test's duration and warns about slow ones.
pub struct TimingMiddleware {
    threshold: Duration,
}

impl TimingMiddleware {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }
}

#[async_trait]
impl Middleware for TimingMiddleware {
    fn name(&self) -> &str {
        "timing"
    }

    async fn around_test(
        &self,
        test: &Test,
        ctx: &mut RunContext,
        next: TestNext<'_>,
    ) -> MiddlewareResult<Outcome> {
        let started = Instant::now();
        let outcome = next.run(test, ctx).await;
        let elapsed = started.elapsed();

        if elapsed > self.threshold {
            warn!(
                "Slow test {}: {:?} (threshold {:?})",
                test.id(),
                elapsed,
                self.threshold
            );
        } else {
            debug!("{} took {:?}", test.id(), elapsed);
        }

        Ok(outcome)
    }
}

/// Re-runs a test that did not pass, up to `attempts` runs in total.
pub struct RetryMiddleware {
    attempts: u32,
}

impl RetryMiddleware {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
        }
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    fn name(&self) -> &str {
        "retry"
    }

    async fn around_test(
        &self,
        test: &Test,
        ctx: &mut RunContext,
        next: TestNext<'_>,
    ) -> MiddlewareResult<Outcome> {
        let mut outcome = next.run(test, ctx).await;
        let mut attempt = 1;

        while !outcome.is_pass() && attempt < self.attempts {
            attempt += 1;
            info!(
                "Retrying {} (attempt {}/{}) after {}",
                test.id(),
                attempt,
                self.attempts,
                outcome.status()
            );
            outcome = next.run(test, ctx).await;
        }

        Ok(outcome)
    }
}

/// Gives up on a test that takes longer than `limit`.
pub struct TimeoutMiddleware {
    limit: Duration,
}

impl TimeoutMiddleware {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }
}

#[async_trait]
impl Middleware for TimeoutMiddleware {
    fn name(&self) -> &str {
        "timeout"
    }

    async fn around_test(
        &self,
        test: &Test,
        ctx: &mut RunContext,
        next: TestNext<'_>,
    ) -> MiddlewareResult<Outcome> {
        match tokio::time::timeout(self.limit, next.run(test, ctx)).await {
            Ok(outcome) => Ok(outcome),
            Err(_) => {
                warn!("{} exceeded {:?}", test.id(), self.limit);
                Ok(Outcome::errored(
                    ErrorDetail::new(format!("timed out after {:?}", self.limit)),
                    self.limit,
                ))
            }
        }
    }
}

pub struct TimingFactory;

impl MiddlewareFactory for TimingFactory {
    fn name(&self) -> &str {
        "timing"
    }

    fn description(&self) -> &str {
        "Log test durations; warn above a threshold in ms (default 1000)"
    }

    fn create(&self, arg: Option<&str>) -> RegistryResult<Box<dyn Middleware>> {
        let ms: u64 = parse_arg(self.name(), arg, Some(1000))?;
        Ok(Box::new(TimingMiddleware::new(Duration::from_millis(ms))))
    }
}

pub struct RetryFactory;

impl MiddlewareFactory for RetryFactory {
    fn name(&self) -> &str {
        "retry"
    }

    fn description(&self) -> &str {
        "Re-run tests that did not pass, up to N runs in total (default 2)"
    }

    fn create(&self, arg: Option<&str>) -> RegistryResult<Box<dyn Middleware>> {
        let attempts: u32 = parse_arg(self.name(), arg, Some(2))?;
        if attempts == 0 {
            return Err(RegistryError::InvalidArgument {
                name: self.name().to_string(),
                message: "attempts must be at least 1".to_string(),
            });
        }
        Ok(Box::new(RetryMiddleware::new(attempts)))
    }
}

pub struct TimeoutFactory;

impl MiddlewareFactory for TimeoutFactory {
    fn name(&self) -> &str {
        "timeout"
    }

    fn description(&self) -> &str {
        "Error any test running longer than the given ms"
    }

    fn create(&self, arg: Option<&str>) -> RegistryResult<Box<dyn Middleware>> {
        let ms: u64 = parse_arg(self.name(), arg, None)?;
        if ms == 0 {
            return Err(RegistryError::InvalidArgument {
                name: self.name().to_string(),
                message: "timeout must be greater than 0".to_string(),
            });
        }
        Ok(Box::new(TimeoutMiddleware::new(Duration::from_millis(ms))))
    }
}

pub struct NoopFactory;

impl MiddlewareFactory for NoopFactory {
    fn name(&self) -> &str {
        "noop"
    }

    fn description(&self) -> &str {
        "Pass every test through unchanged"
    }

    fn create(&self, _arg: Option<&str>) -> RegistryResult<Box<dyn Middleware>> {
        Ok(Box::new(Passthrough))
    }
}
