//! Test file loading.
//!
//! A test file is a TOML document declaring `[[test]]` tables. Loading a file
//! only registers its tests, in declaration order; nothing is executed.

use crate::types::{Expectation, Test, TestCase};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Test #{index} in {} has an empty name", path.display())]
    EmptyName { path: PathBuf, index: usize },

    #[error("Test '{name}' in {} has an empty `run` command", path.display())]
    EmptyBody { path: PathBuf, name: String },

    #[error("Test '{name}' is declared more than once in {}", path.display())]
    DuplicateName { path: PathBuf, name: String },

    #[error("Timeout of test '{name}' in {} must be greater than 0", path.display())]
    InvalidTimeout { path: PathBuf, name: String },
}

pub type LoadResult<T> = Result<T, LoadError>;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTestFile {
    #[serde(default)]
    defaults: RawDefaults,
    #[serde(default, rename = "test")]
    tests: Vec<RawTest>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDefaults {
    timeout_ms: Option<u64>,
    shell: Option<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTest {
    name: String,
    run: String,
    #[serde(default)]
    status: i32,
    stdout: Option<String>,
    #[serde(default)]
    stdout_contains: Vec<String>,
    #[serde(default)]
    stderr_contains: Vec<String>,
    timeout_ms: Option<u64>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

/// The tests registered by one file.
#[derive(Debug, Clone)]
pub struct TestFile {
    pub path: PathBuf,
    pub tests: Vec<Test>,
}

impl TestFile {
    /// Reads and registers the tests declared in `path`.
    pub async fn load(path: &Path) -> LoadResult<Self> {
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| LoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        Self::parse(path, &source)
    }

    pub fn parse(path: &Path, source: &str) -> LoadResult<Self> {
        let raw: RawTestFile = toml::from_str(source).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })?;

        let shell = raw
            .defaults
            .shell
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let mut seen = HashSet::new();
        let mut tests = Vec::with_capacity(raw.tests.len());

        for (index, declared) in raw.tests.into_iter().enumerate() {
            let name = declared.name.trim().to_string();
            if name.is_empty() {
                return Err(LoadError::EmptyName {
                    path: path.to_path_buf(),
                    index,
                });
            }

            if declared.run.trim().is_empty() {
                return Err(LoadError::EmptyBody {
                    path: path.to_path_buf(),
                    name,
                });
            }

            if !seen.insert(name.clone()) {
                return Err(LoadError::DuplicateName {
                    path: path.to_path_buf(),
                    name,
                });
            }

            let timeout_ms = declared.timeout_ms.or(raw.defaults.timeout_ms);
            if timeout_ms == Some(0) {
                return Err(LoadError::InvalidTimeout {
                    path: path.to_path_buf(),
                    name,
                });
            }

            let mut env = raw.defaults.env.clone();
            env.extend(declared.env);

            let case = TestCase {
                run: declared.run,
                shell: shell.clone(),
                timeout: timeout_ms.map(Duration::from_millis),
                env,
                expect: Expectation {
                    status: declared.status,
                    stdout: declared.stdout,
                    stdout_contains: declared.stdout_contains,
                    stderr_contains: declared.stderr_contains,
                },
            };

            tests.push(Test::new(path, name, index, case));
        }

        Ok(Self {
            path: path.to_path_buf(),
            tests,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const PATH: &str = "/suite/sample.test.toml";

    #[test]
    fn test_parse_preserves_declaration_order() {
        let file = TestFile::parse(
            Path::new(PATH),
            r#"
[[test]]
name = "second alphabetically"
run = "true"

[[test]]
name = "a first"
run = "echo hi"
stdout = "hi\n"
"#,
        )
        .unwrap();

        assert_eq!(file.tests.len(), 2);
        assert_eq!(file.tests[0].name(), "second alphabetically");
        assert_eq!(file.tests[0].index(), 0);
        assert_eq!(file.tests[1].name(), "a first");
        assert_eq!(file.tests[1].index(), 1);
        assert_eq!(
            file.tests[1].case().expect.stdout.as_deref(),
            Some("hi\n")
        );
        assert_eq!(file.tests[1].file(), Path::new(PATH));
    }

    #[test]
    fn test_parse_applies_defaults() {
        let file = TestFile::parse(
            Path::new(PATH),
            r#"
[defaults]
timeout_ms = 250
shell = "bash"
env = { MODE = "ci", SHARED = "file" }

[[test]]
name = "inherits"
run = "true"

[[test]]
name = "overrides"
run = "true"
timeout_ms = 10
env = { SHARED = "test" }
"#,
        )
        .unwrap();

        let inherits = file.tests[0].case();
        assert_eq!(inherits.timeout, Some(Duration::from_millis(250)));
        assert_eq!(inherits.shell.as_deref(), Some("bash"));
        assert_eq!(inherits.env.get("MODE").map(String::as_str), Some("ci"));

        let overrides = file.tests[1].case();
        assert_eq!(overrides.timeout, Some(Duration::from_millis(10)));
        assert_eq!(overrides.env.get("SHARED").map(String::as_str), Some("test"));
        assert_eq!(overrides.env.get("MODE").map(String::as_str), Some("ci"));
    }

    #[test]
    fn test_parse_empty_file() {
        let file = TestFile::parse(Path::new(PATH), "").unwrap();
        assert!(file.tests.is_empty());
    }

    #[test]
    fn test_parse_rejects_duplicates() {
        let err = TestFile::parse(
            Path::new(PATH),
            r#"
[[test]]
name = "same"
run = "true"

[[test]]
name = "same"
run = "false"
"#,
        )
        .unwrap_err();

        assert!(matches!(err, LoadError::DuplicateName { ref name, .. } if name == "same"));
    }

    #[test]
    fn test_parse_rejects_invalid_declarations() {
        let err = TestFile::parse(Path::new(PATH), "[[test]]\nname = \" \"\nrun = \"true\"\n")
            .unwrap_err();
        assert!(matches!(err, LoadError::EmptyName { index: 0, .. }));

        let err = TestFile::parse(Path::new(PATH), "[[test]]\nname = \"x\"\nrun = \"\"\n")
            .unwrap_err();
        assert!(matches!(err, LoadError::EmptyBody { .. }));

        let err = TestFile::parse(
            Path::new(PATH),
            "[[test]]\nname = \"x\"\nrun = \"true\"\ntimeout_ms = 0\n",
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::InvalidTimeout { .. }));

        let err = TestFile::parse(Path::new(PATH), "[[test]]\nname = \"x\"\n").unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));

        let err = TestFile::parse(
            Path::new(PATH),
            "[[test]]\nname = \"x\"\nrun = \"true\"\nunknown = 1\n",
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_load_from_disk() {
        let mut file = NamedTempFile::with_suffix(".test.toml").unwrap();
        write!(file, "[[test]]\nname = \"ok\"\nrun = \"true\"\n").unwrap();

        let loaded = TestFile::load(file.path()).await.unwrap();
        assert_eq!(loaded.path, file.path());
        assert_eq!(loaded.tests.len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let err = tokio_test::block_on(TestFile::load(Path::new("/nonexistent/missing.test.toml")))
            .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
        assert!(err.to_string().contains("Failed to read"));
    }
}
