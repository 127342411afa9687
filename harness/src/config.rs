//! `chaintest.toml` configuration file.

use runner::Verbosity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "chaintest.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Every field is optional; command-line flags take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub test_files: Option<Vec<String>>,
    pub middleware: Option<Vec<String>>,
    pub verbosity: Option<Verbosity>,
    pub show_stacks: Option<bool>,
    pub build_server: Option<bool>,
    /// Suite name reported in build-server output.
    pub build_server_suite: Option<String>,
    /// Adds a timestamp to every build-server message.
    pub build_server_timestamps: Option<bool>,
    /// Default per-test timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    pub shell: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: FileConfig = toml::from_str(&source).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, or `chaintest.toml` in `dir` when that file exists.
    pub fn discover(path: Option<&Path>, dir: &Path) -> ConfigResult<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let default = dir.join(CONFIG_FILE_NAME);
        if default.is_file() {
            Self::load(&default)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(globs) = &self.test_files {
            if globs.iter().any(|g| g.trim().is_empty() || g.trim() == "!") {
                return Err(ConfigError::Invalid {
                    message: "test_files cannot contain empty globs".to_string(),
                });
            }
        }

        if let Some(middleware) = &self.middleware {
            if middleware.iter().any(|m| m.trim().is_empty()) {
                return Err(ConfigError::Invalid {
                    message: "middleware names cannot be empty".to_string(),
                });
            }
        }

        if self.timeout_ms == Some(0) {
            return Err(ConfigError::Invalid {
                message: "timeout_ms must be greater than 0".to_string(),
            });
        }

        if let Some(suite) = &self.build_server_suite {
            if suite.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    message: "build_server_suite cannot be empty".to_string(),
                });
            }
        }

        if let Some(shell) = &self.shell {
            if shell.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    message: "shell cannot be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}
