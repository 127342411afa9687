use crate::chain::{RunNext, TestNext};
use crate::middleware::{Middleware, MiddlewareResult, RunContext};
use crate::types::{Outcome, Test, TestResult};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

/// Tallies passed, failed and errored tests into the run's [`Tally`].
///
/// Counts are keyed by test identity, so a test that is executed more than
/// once (for instance by a retrying layer further out) is counted once, by
/// its last outcome. When the run completes the tally is reconciled with the
/// outcomes actually recorded on the results.
///
/// [`Tally`]: crate::types::Tally
#[derive(Debug, Default, Clone, Copy)]
pub struct Counter;

impl Counter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    async fn around_test(
        &self,
        test: &Test,
        ctx: &mut RunContext,
        next: TestNext<'_>,
    ) -> MiddlewareResult<Outcome> {
        let outcome = next.run(test, ctx).await;
        ctx.tally_mut().record(test.id(), &outcome);
        Ok(outcome)
    }

    async fn around_run(
        &self,
        files: &[PathBuf],
        ctx: &mut RunContext,
        next: RunNext<'_>,
    ) -> MiddlewareResult<Vec<TestResult>> {
        let results = next.run(files, ctx).await;
        ctx.tally_mut().reconcile(&results);

        let tally = ctx.tally();
        info!(
            passed = tally.passed(),
            failed = tally.failed(),
            errored = tally.errored(),
            total = tally.total(),
            "Run complete"
        );

        Ok(results)
    }
}
