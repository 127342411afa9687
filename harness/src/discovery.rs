//! Resolves test-file globs to absolute paths.
//!
//! Globs starting with `!` exclude matches of the other globs. Paths are
//! returned in glob order, files only, each path once.

use glob::{MatchOptions, Pattern};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_GLOBS: &[&str] = &["**/*.test.toml", "!target/**"];

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Invalid glob '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("No test globs given, only ignore patterns")]
    NoPatterns,

    #[error("Base directory is not valid UTF-8: {}", path.display())]
    NonUtf8Base { path: PathBuf },
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Test globs and ignore globs, split apart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobSet {
    pub include: Vec<String>,
    pub ignore: Vec<String>,
}

impl GlobSet {
    pub fn parse<S: AsRef<str>>(globs: &[S]) -> Self {
        let mut set = GlobSet::default();
        for glob in globs {
            let glob = glob.as_ref().trim();
            if glob.is_empty() {
                continue;
            }
            match glob.strip_prefix('!') {
                Some(ignored) => set.ignore.push(strip_dot_slash(ignored).to_string()),
                None => set.include.push(strip_dot_slash(glob).to_string()),
            }
        }
        set
    }

    pub fn defaults() -> Self {
        Self::parse(DEFAULT_GLOBS)
    }

    /// Expands the globs relative to `base`.
    pub fn resolve(&self, base: &Path) -> DiscoveryResult<Vec<PathBuf>> {
        if self.include.is_empty() {
            return Err(DiscoveryError::NoPatterns);
        }

        let ignore = self
            .ignore
            .iter()
            .map(|p| compile(p))
            .collect::<DiscoveryResult<Vec<_>>>()?;

        let base_str = base.to_str().ok_or_else(|| DiscoveryError::NonUtf8Base {
            path: base.to_path_buf(),
        })?;
        let escaped_base = Pattern::escape(base_str);

        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for include in &self.include {
            let full = if Path::new(include).is_absolute() {
                include.clone()
            } else {
                format!("{}/{}", escaped_base.trim_end_matches('/'), include)
            };

            let entries = glob::glob_with(&full, match_options()).map_err(|e| DiscoveryError::InvalidPattern {
                pattern: include.clone(),
                message: e.msg.to_string(),
            })?;

            for entry in entries {
                let path = match entry {
                    Ok(path) => path,
                    Err(e) => {
                        warn!("Skipping unreadable path: {}", e);
                        continue;
                    }
                };

                if !path.is_file()
                    || is_hidden_unnamed(&path, &full)
                    || is_ignored(&path, base, &ignore)
                {
                    continue;
                }

                if seen.insert(path.clone()) {
                    files.push(path);
                }
            }
        }

        debug!("Resolved {} test file(s)", files.len());
        Ok(files)
    }
}

fn compile(pattern: &str) -> DiscoveryResult<Pattern> {
    Pattern::new(pattern).map_err(|e| DiscoveryError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.msg.to_string(),
    })
}

fn strip_dot_slash(glob: &str) -> &str {
    let mut glob = glob;
    while let Some(rest) = glob.strip_prefix("./") {
        glob = rest;
    }
    glob
}

/// Wildcards never match a leading dot; hidden entries must be named.
fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: false,
        require_literal_leading_dot: true,
    }
}

fn is_hidden_unnamed(path: &Path, pattern: &str) -> bool {
    let named: HashSet<&OsStr> = Path::new(pattern).iter().collect();
    path.iter().any(|part| {
        let hidden = part.to_str().is_some_and(|p| p.starts_with('.') && p != "." && p != "..");
        hidden && !named.contains(part)
    })
}

fn is_ignored(path: &Path, base: &Path, ignore: &[Pattern]) -> bool {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    let relative = path.strip_prefix(base).unwrap_or(path);
    ignore
        .iter()
        .any(|p| p.matches_path_with(relative, options) || p.matches_path_with(path, options))
}
