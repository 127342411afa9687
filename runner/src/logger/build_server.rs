//! TeamCity service messages.
//!
//! Every line has the form `##teamcity[messageName key='value' ...]`, with
//! values escaped by [`escape`].

use super::ResultFormatter;
use crate::types::{Outcome, ResultScope, Tally, Test, TestResult};
use chrono::{SecondsFormat, Utc};
use std::fmt::Write as _;
use std::path::PathBuf;

pub struct BuildServerFormatter {
    suite_name: String,
    timestamps: bool,
}

impl BuildServerFormatter {
    pub fn new() -> Self {
        Self {
            suite_name: "chaintest".to_string(),
            timestamps: false,
        }
    }

    pub fn with_suite_name(mut self, name: impl Into<String>) -> Self {
        self.suite_name = name.into();
        self
    }

    /// Adds a `timestamp` attribute to every message.
    pub fn with_timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }

    fn message(&self, name: &str, attrs: &[(&str, &str)]) -> String {
        let mut line = format!("##teamcity[{}", name);
        for (key, value) in attrs {
            let _ = write!(line, " {}='{}'", key, escape(value));
        }
        if self.timestamps {
            let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, false);
            let _ = write!(line, " timestamp='{}'", escape(&now));
        }
        line.push_str("]\n");
        line
    }

    fn failed_pseudo_test(&self, name: &str, message: &str, details: Option<&str>) -> String {
        let mut out = self.message("testStarted", &[("name", name)]);
        let mut attrs = vec![("name", name), ("message", message)];
        if let Some(details) = details {
            attrs.push(("details", details));
        }
        out.push_str(&self.message("testFailed", &attrs));
        out.push_str(&self.message("testFinished", &[("name", name)]));
        out
    }
}

impl Default for BuildServerFormatter {
    fn default() -> Self {
        Self::new()
    }
}

/// Escapes a value for use inside a service message attribute.
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '|' => escaped.push_str("||"),
            '\'' => escaped.push_str("|'"),
            '\n' => escaped.push_str("|n"),
            '\r' => escaped.push_str("|r"),
            '[' => escaped.push_str("|["),
            ']' => escaped.push_str("|]"),
            '\u{0085}' => escaped.push_str("|x"),
            '\u{2028}' => escaped.push_str("|l"),
            '\u{2029}' => escaped.push_str("|p"),
            c => escaped.push(c),
        }
    }
    escaped
}

impl ResultFormatter for BuildServerFormatter {
    fn format_run_start(&self, _files: &[PathBuf]) -> Option<String> {
        Some(self.message("testSuiteStarted", &[("name", self.suite_name.as_str())]))
    }

    fn format_test_start(&self, test: &Test) -> Option<String> {
        let name = test.id().to_string();
        Some(self.message(
            "testStarted",
            &[("name", name.as_str()), ("captureStandardOutput", "false")],
        ))
    }

    fn format_test(&self, test: &Test, outcome: &Outcome) -> Option<String> {
        let name = test.id().to_string();
        let mut out = String::new();

        match outcome {
            Outcome::Passed { .. } => {}
            Outcome::Failed { failure, .. } => match (&failure.expected, &failure.actual) {
                (Some(expected), Some(actual)) => out.push_str(&self.message(
                    "testFailed",
                    &[
                        ("type", "comparisonFailure"),
                        ("name", name.as_str()),
                        ("message", failure.message.as_str()),
                        ("expected", expected.as_str()),
                        ("actual", actual.as_str()),
                    ],
                )),
                _ => out.push_str(&self.message(
                    "testFailed",
                    &[("name", name.as_str()), ("message", failure.message.as_str())],
                )),
            },
            Outcome::Errored { error, .. } => {
                let mut attrs = vec![("name", name.as_str()), ("message", error.message.as_str())];
                if let Some(stack) = &error.stack {
                    attrs.push(("details", stack.as_str()));
                }
                out.push_str(&self.message("testFailed", &attrs));
            }
        }

        let millis = outcome.duration().as_millis().to_string();
        out.push_str(&self.message(
            "testFinished",
            &[("name", name.as_str()), ("duration", millis.as_str())],
        ));
        Some(out)
    }

    fn format_test_abandoned(&self, test: &Test) -> Option<String> {
        let name = test.id().to_string();
        let mut out = self.message(
            "testFailed",
            &[
                ("name", name.as_str()),
                ("message", "test was cancelled before it finished"),
            ],
        );
        out.push_str(&self.message("testFinished", &[("name", name.as_str())]));
        Some(out)
    }

    fn format_summary(&self, results: &[TestResult], tally: &Tally) -> String {
        let mut out = String::new();

        for result in results {
            let Some(error) = result.error() else {
                continue;
            };
            let name = match result.scope() {
                ResultScope::File(path) => format!("{}::<load>", path.display()),
                ResultScope::Run => "<run>".to_string(),
            };
            out.push_str(&self.failed_pseudo_test(
                &name,
                &error.message,
                error.stack.as_deref(),
            ));
        }

        out.push_str(&self.message("testSuiteFinished", &[("name", self.suite_name.as_str())]));

        let text = format!(
            "{} total, {} passed, {} failed, {} errored",
            tally.total(),
            tally.passed(),
            tally.failed(),
            tally.errored()
        );
        let status = if results.iter().all(TestResult::has_passed) {
            "NORMAL"
        } else {
            "FAILURE"
        };
        out.push_str(&self.message("message", &[("text", text.as_str()), ("status", status)]));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssertionFailure, ErrorDetail, TestCase};
    use std::time::Duration;

    fn test_named(name: &str) -> Test {
        Test::new("/suite/a.test.toml", name, 0, TestCase::new("true"))
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("it's [x]|y\nz"), "it|'s |[x|]||y|nz");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_passed_test_messages() {
        let formatter = BuildServerFormatter::new();
        let test = test_named("ok");

        let started = formatter.format_test_start(&test).unwrap();
        assert_eq!(
            started,
            "##teamcity[testStarted name='/suite/a.test.toml::ok' captureStandardOutput='false']\n"
        );

        let finished = formatter
            .format_test(&test, &Outcome::passed(Duration::from_millis(42)))
            .unwrap();
        assert_eq!(
            finished,
            "##teamcity[testFinished name='/suite/a.test.toml::ok' duration='42']\n"
        );
    }

    #[test]
    fn test_comparison_failure() {
        let formatter = BuildServerFormatter::new();
        let outcome = Outcome::failed(
            AssertionFailure::new("stdout mismatch").with_comparison("hi\n", "bye\n"),
            Duration::from_millis(3),
        );

        let text = formatter.format_test(&test_named("cmp"), &outcome).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("##teamcity[testFailed type='comparisonFailure'"));
        assert!(lines[0].contains("expected='hi|n' actual='bye|n'"));
        assert!(lines[1].starts_with("##teamcity[testFinished"));
    }

    #[test]
    fn test_errored_includes_details() {
        let formatter = BuildServerFormatter::new();
        let outcome = Outcome::errored(
            ErrorDetail::new("timed out").with_stack("partial stderr"),
            Duration::from_millis(100),
        );

        let text = formatter.format_test(&test_named("slow"), &outcome).unwrap();
        assert!(text.contains("message='timed out' details='partial stderr'"));
        assert!(text.contains("duration='100'"));
    }

    #[test]
    fn test_summary_reports_load_errors_as_pseudo_tests() {
        let formatter = BuildServerFormatter::new().with_suite_name("suite");
        let results = vec![TestResult::file_errored(
            "/suite/bad.test.toml",
            ErrorDetail::new("invalid TOML"),
        )];

        let summary = formatter.format_summary(&results, &Tally::new());
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(
            lines,
            vec![
                "##teamcity[testStarted name='/suite/bad.test.toml::<load>']",
                "##teamcity[testFailed name='/suite/bad.test.toml::<load>' message='invalid TOML']",
                "##teamcity[testFinished name='/suite/bad.test.toml::<load>']",
                "##teamcity[testSuiteFinished name='suite']",
                "##teamcity[message text='0 total, 0 passed, 0 failed, 0 errored' status='FAILURE']",
            ]
        );
    }

    #[test]
    fn test_abandoned_test_is_closed_out() {
        let formatter = BuildServerFormatter::new();
        let text = formatter.format_test_abandoned(&test_named("slow")).unwrap();
        assert_eq!(
            text.lines().collect::<Vec<_>>(),
            vec![
                "##teamcity[testFailed name='/suite/a.test.toml::slow' message='test was cancelled before it finished']",
                "##teamcity[testFinished name='/suite/a.test.toml::slow']",
            ]
        );
    }

    #[test]
    fn test_timestamps() {
        let formatter = BuildServerFormatter::new().with_timestamps(true);
        let text = formatter.format_run_start(&[]).unwrap();
        assert!(text.starts_with("##teamcity[testSuiteStarted name='chaintest' timestamp='"));
        assert!(text.ends_with("]\n"));
    }
}
