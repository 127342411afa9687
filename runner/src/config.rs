use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub shell: String,
    pub default_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            default_timeout: None,
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.shell.trim().is_empty() {
            return Err("Shell cannot be empty".to_string());
        }

        if let Some(timeout) = self.default_timeout {
            if timeout.is_zero() {
                return Err("Default timeout must be greater than 0".to_string());
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Quiet,
    #[default]
    Default,
    Full,
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verbosity::Quiet => write!(f, "quiet"),
            Verbosity::Default => write!(f, "default"),
            Verbosity::Full => write!(f, "full"),
        }
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quiet" => Ok(Verbosity::Quiet),
            "default" => Ok(Verbosity::Default),
            "full" => Ok(Verbosity::Full),
            other => Err(format!(
                "Unknown verbosity '{}', expected quiet, default or full",
                other
            )),
        }
    }
}

/// Formatting preferences carried through a run for logger middleware.
/// The runner passes them along without interpreting them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogOptions {
    pub verbosity: Verbosity,
    pub show_stacks: bool,
}

impl LogOptions {
    pub fn new(verbosity: Verbosity, show_stacks: bool) -> Self {
        Self {
            verbosity,
            show_stacks,
        }
    }
}
