//! Human-readable console output.

use super::ResultFormatter;
use crate::config::Verbosity;
use crate::types::{Outcome, ResultScope, Tally, Test, TestResult, TestStatus};
use colored::{ColoredString, Colorize};
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub struct ConsoleFormatter {
    verbosity: Verbosity,
    show_stacks: bool,
    color: bool,
    root: Option<PathBuf>,
}

impl ConsoleFormatter {
    /// `files` is used to shorten the paths that get printed.
    pub fn new(verbosity: Verbosity, show_stacks: bool, files: &[PathBuf]) -> Self {
        Self {
            verbosity,
            show_stacks,
            color: true,
            root: common_root(files),
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    fn paint(&self, text: &str, style: fn(&str) -> ColoredString) -> String {
        if self.color {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn display_path(&self, path: &Path) -> String {
        self.root
            .as_deref()
            .and_then(|root| path.strip_prefix(root).ok())
            .filter(|rel| !rel.as_os_str().is_empty())
            .unwrap_or(path)
            .display()
            .to_string()
    }

    fn write_failure_detail(&self, out: &mut String, outcome: &Outcome, indent: &str) {
        match outcome {
            Outcome::Passed { .. } => {}
            Outcome::Failed { failure, .. } => {
                let _ = writeln!(out, "{}{}", indent, failure.message);
                if let Some(expected) = &failure.expected {
                    let _ = writeln!(
                        out,
                        "{}{} {}",
                        indent,
                        self.paint("expected:", |s| s.green()),
                        expected.escape_debug()
                    );
                }
                if let Some(actual) = &failure.actual {
                    let _ = writeln!(
                        out,
                        "{}{} {}",
                        indent,
                        self.paint("actual:  ", |s| s.red()),
                        actual.escape_debug()
                    );
                }
            }
            Outcome::Errored { error, .. } => {
                let _ = writeln!(out, "{}{}", indent, error.message);
                if self.show_stacks {
                    if let Some(stack) = &error.stack {
                        for line in stack.lines() {
                            let _ = writeln!(out, "{}  {}", indent, self.paint(line, |s| s.dimmed()));
                        }
                    }
                }
            }
        }
    }
}

#[derive(Default)]
struct Totals {
    files: usize,
    unloadable: usize,
    duration: Duration,
}

impl ResultFormatter for ConsoleFormatter {
    fn format_run_start(&self, files: &[PathBuf]) -> Option<String> {
        if self.verbosity != Verbosity::Full {
            return None;
        }
        Some(format!(
            "Running {} test file{}\n\n",
            files.len(),
            if files.len() == 1 { "" } else { "s" }
        ))
    }

    fn format_test(&self, test: &Test, outcome: &Outcome) -> Option<String> {
        match self.verbosity {
            Verbosity::Quiet => None,
            Verbosity::Default => Some(match outcome.status() {
                TestStatus::Passed => self.paint(".", |s| s.green()),
                TestStatus::Failed => self.paint("F", |s| s.red().bold()),
                _ => self.paint("E", |s| s.yellow().bold()),
            }),
            Verbosity::Full => {
                let label = match outcome.status() {
                    TestStatus::Passed => self.paint("PASS", |s| s.green().bold()),
                    TestStatus::Failed => self.paint("FAIL", |s| s.red().bold()),
                    _ => self.paint("ERROR", |s| s.yellow().bold()),
                };
                let mut out = format!(
                    "{} {} › {} ({:.2?})\n",
                    label,
                    self.display_path(test.file()),
                    test.name(),
                    outcome.duration()
                );
                self.write_failure_detail(&mut out, outcome, "    ");
                Some(out)
            }
        }
    }

    fn format_summary(&self, results: &[TestResult], tally: &Tally) -> String {
        let mut out = String::new();
        let mut totals = Totals::default();

        for result in results {
            if let ResultScope::File(_) = result.scope() {
                totals.files += 1;
                if result.error().is_some() {
                    totals.unloadable += 1;
                }
            }
            totals.duration += result.duration();
        }

        if self.verbosity == Verbosity::Default && tally.total() > 0 {
            out.push('\n');
        }

        let problems: Vec<&TestResult> = results.iter().filter(|r| !r.has_passed()).collect();
        if !problems.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", self.paint("Failures:", |s| s.red().bold()));
            let _ = writeln!(out);
        }

        for result in problems {
            if let Some(error) = result.error() {
                let what = match result.scope() {
                    ResultScope::File(path) => {
                        format!("{} (failed to load)", self.display_path(path))
                    }
                    ResultScope::Run => "run aborted".to_string(),
                };
                let _ = writeln!(out, "  {} {}", self.paint("●", |s| s.red()), what);
                let _ = writeln!(out, "    {}", error.message);
                if self.show_stacks {
                    if let Some(stack) = &error.stack {
                        for line in stack.lines() {
                            let _ = writeln!(out, "      {}", self.paint(line, |s| s.dimmed()));
                        }
                    }
                }
                let _ = writeln!(out);
                continue;
            }

            for test in result.tests().iter().filter(|t| t.status() != TestStatus::Passed) {
                let _ = writeln!(
                    out,
                    "  {} {} › {}",
                    self.paint("●", |s| s.red()),
                    self.display_path(test.file()),
                    self.paint(test.name(), |s| s.bold())
                );
                if let Some(outcome) = test.outcome() {
                    self.write_failure_detail(&mut out, outcome, "    ");
                }
                let _ = writeln!(out);
            }
        }

        let status = if results.iter().all(TestResult::has_passed) {
            self.paint("PASSED", |s| s.green().bold())
        } else {
            self.paint("FAILED", |s| s.red().bold())
        };

        let _ = writeln!(out, "{}", "─".repeat(50));
        let _ = writeln!(
            out,
            "Test result: {} | {} total, {} passed, {} failed, {} errored",
            status,
            tally.total(),
            tally.passed(),
            tally.failed(),
            tally.errored()
        );
        if totals.unloadable > 0 {
            let _ = writeln!(
                out,
                "Files: {} total, {} failed to load",
                totals.files, totals.unloadable
            );
        }
        if self.verbosity != Verbosity::Quiet {
            let _ = writeln!(out, "Time: {:.2?}", totals.duration);
        }

        out
    }
}

/// Deepest directory containing every file.
fn common_root(files: &[PathBuf]) -> Option<PathBuf> {
    let mut parents = files.iter().filter_map(|f| f.parent());
    let first = parents.next()?;
    let mut root: Vec<Component> = first.components().collect();

    for parent in parents {
        let shared = root
            .iter()
            .zip(parent.components())
            .take_while(|(a, b)| **a == *b)
            .count();
        root.truncate(shared);
    }

    if root.is_empty() {
        None
    } else {
        Some(root.iter().collect())
    }
}
