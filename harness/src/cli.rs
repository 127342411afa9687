use crate::config::{ConfigError, FileConfig};
use crate::discovery::{DiscoveryError, GlobSet};
use crate::registry::{MiddlewareRegistry, RegistryError};
use clap::{Parser, ValueEnum};
use runner::{
    BuildServerFormatter, BuildServerLogger, ConsoleFormatter, ConsoleLogger, Counter,
    ExecutorConfig, LogOptions, Middleware, RunnerError, TestResult, TestRunner, Verbosity,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CliResult<T> = Result<T, CliError>;

#[derive(Parser, Debug, Default)]
#[command(name = "chaintest")]
#[command(about = "Run test files through a chain of middleware")]
#[command(version)]
pub struct Cli {
    /// Test file globs; prefix a glob with ! to ignore its matches
    pub globs: Vec<String>,

    /// Test file globs, taking precedence over positional globs
    #[arg(short = 't', long = "test-files", num_args = 1..)]
    pub test_files: Vec<String>,

    /// Plugin middleware as name[:arg], outermost first
    #[arg(short, long, num_args = 1..)]
    pub middleware: Vec<String>,

    /// Include stack traces in output
    #[arg(short, long)]
    pub show_stacks: bool,

    /// Logging verbosity
    #[arg(short, long, value_enum)]
    pub verbosity: Option<VerbosityArg>,

    /// Output TeamCity service messages for a build server
    #[arg(short, long)]
    pub build_server: bool,

    /// Configuration file (default: ./chaintest.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// List available plugin middleware and exit
    #[arg(long)]
    pub list_middleware: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityArg {
    Quiet,
    Default,
    Full,
}

impl From<VerbosityArg> for Verbosity {
    fn from(arg: VerbosityArg) -> Self {
        match arg {
            VerbosityArg::Quiet => Verbosity::Quiet,
            VerbosityArg::Default => Verbosity::Default,
            VerbosityArg::Full => Verbosity::Full,
        }
    }
}

/// Command-line flags merged over the configuration file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub globs: GlobSet,
    pub middleware: Vec<String>,
    pub log_options: LogOptions,
    pub build_server: bool,
    pub build_server_suite: Option<String>,
    pub build_server_timestamps: bool,
    pub executor: ExecutorConfig,
}

impl Settings {
    pub fn resolve(cli: &Cli, config: FileConfig) -> Self {
        let globs = if !cli.test_files.is_empty() {
            GlobSet::parse(&cli.test_files)
        } else if !cli.globs.is_empty() {
            GlobSet::parse(&cli.globs)
        } else if let Some(globs) = &config.test_files {
            GlobSet::parse(globs)
        } else {
            GlobSet::defaults()
        };

        let middleware = if cli.middleware.is_empty() {
            config.middleware.unwrap_or_default()
        } else {
            cli.middleware.clone()
        };

        let verbosity = cli
            .verbosity
            .map(Verbosity::from)
            .or(config.verbosity)
            .unwrap_or_default();
        let show_stacks = cli.show_stacks || config.show_stacks.unwrap_or(false);

        let mut executor = ExecutorConfig::new();
        if let Some(shell) = config.shell {
            executor = executor.with_shell(shell);
        }
        if let Some(ms) = config.timeout_ms {
            executor = executor.with_default_timeout(Duration::from_millis(ms));
        }

        Self {
            globs,
            middleware,
            log_options: LogOptions::new(verbosity, show_stacks),
            build_server: cli.build_server || config.build_server.unwrap_or(false),
            build_server_suite: config.build_server_suite,
            build_server_timestamps: config.build_server_timestamps.unwrap_or(false),
            executor,
        }
    }
}

/// Plugins first, then the logger, then the counter as the innermost layer.
pub fn build_chain(
    registry: &MiddlewareRegistry,
    settings: &Settings,
    files: &[PathBuf],
) -> CliResult<Vec<Box<dyn Middleware>>> {
    let mut chain = registry.resolve_all(&settings.middleware)?;

    if settings.build_server {
        let mut formatter =
            BuildServerFormatter::new().with_timestamps(settings.build_server_timestamps);
        if let Some(suite) = &settings.build_server_suite {
            formatter = formatter.with_suite_name(suite.clone());
        }
        chain.push(Box::new(BuildServerLogger::build_server(formatter)));
    } else {
        let formatter = ConsoleFormatter::new(
            settings.log_options.verbosity,
            settings.log_options.show_stacks,
            files,
        )
        .with_color(std::io::stdout().is_terminal());
        chain.push(Box::new(ConsoleLogger::console(formatter)));
    }

    chain.push(Box::new(Counter::new()));
    Ok(chain)
}

pub fn exit_code(results: &[TestResult]) -> i32 {
    if results.iter().all(TestResult::has_passed) {
        0
    } else {
        1
    }
}

/// Maps the outcome of [`run`] to a process exit code, logging any error.
pub fn finish(result: CliResult<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            1
        }
    }
}

/// Runs the command relative to the current directory.
pub async fn run(cli: Cli) -> CliResult<i32> {
    let cwd = std::env::current_dir()?;
    run_in(&cli, &cwd).await
}

/// Runs the command with globs and the default config file resolved
/// against `dir`, returning the process exit code.
pub async fn run_in(cli: &Cli, dir: &Path) -> CliResult<i32> {
    let registry = MiddlewareRegistry::with_builtins();

    if cli.list_middleware {
        print_middleware(&registry);
        return Ok(0);
    }

    let config = FileConfig::discover(cli.config.as_deref(), dir)?;
    let settings = Settings::resolve(cli, config);

    let files = settings.globs.resolve(dir)?;
    if files.is_empty() {
        warn!("No test files matched {:?}", settings.globs.include);
    }
    info!("Found {} test file(s)", files.len());

    let chain = build_chain(&registry, &settings, &files)?;
    let runner = TestRunner::new(chain)
        .with_executor_config(settings.executor.clone())?
        .with_log_options(settings.log_options);

    let results = runner.run_tests(&files).await?;
    Ok(exit_code(&results))
}

fn print_middleware(registry: &MiddlewareRegistry) {
    println!("Available middleware:");
    for name in registry.list_middleware() {
        if let Some(factory) = registry.get_factory(name) {
            println!("  - {}: {}", factory.name(), factory.description());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("chaintest").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_flags() {
        let cli = parse(&[
            "-t",
            "a/*.test.toml",
            "-t",
            "!a/skip.test.toml",
            "-m",
            "timing:10",
            "-s",
            "-v",
            "full",
            "-b",
        ]);
        assert_eq!(cli.test_files, vec!["a/*.test.toml", "!a/skip.test.toml"]);
        assert_eq!(cli.middleware, vec!["timing:10"]);
        assert!(cli.show_stacks);
        assert_eq!(cli.verbosity, Some(VerbosityArg::Full));
        assert!(cli.build_server);
    }

    #[test]
    fn test_flags_take_several_values() {
        let cli = parse(&[
            "-t",
            "a/*.test.toml",
            "b/*.test.toml",
            "-m",
            "retry",
            "timing",
            "-v",
            "quiet",
        ]);
        assert_eq!(cli.test_files, vec!["a/*.test.toml", "b/*.test.toml"]);
        assert_eq!(cli.middleware, vec!["retry", "timing"]);
        assert!(cli.globs.is_empty());

        let settings = Settings::resolve(&cli, FileConfig::default());
        assert_eq!(settings.globs.include, vec!["a/*.test.toml", "b/*.test.toml"]);
        assert_eq!(settings.middleware, vec!["retry", "timing"]);
    }

    #[test]
    fn test_positional_globs_before_flags() {
        let cli = parse(&["a.test.toml", "!b.test.toml", "-m", "noop"]);
        assert_eq!(cli.globs, vec!["a.test.toml", "!b.test.toml"]);
        assert_eq!(cli.middleware, vec!["noop"]);
    }

    #[test]
    fn test_rejects_unknown_verbosity() {
        let result = Cli::try_parse_from(["chaintest", "-v", "loud"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_glob_precedence() {
        let config = FileConfig {
            test_files: Some(vec!["from_config/*.test.toml".to_string()]),
            ..Default::default()
        };

        let settings = Settings::resolve(&parse(&["pos.test.toml"]), config.clone());
        assert_eq!(settings.globs.include, vec!["pos.test.toml"]);

        let settings = Settings::resolve(
            &parse(&["pos.test.toml", "-t", "flag.test.toml"]),
            config.clone(),
        );
        assert_eq!(settings.globs.include, vec!["flag.test.toml"]);

        let settings = Settings::resolve(&parse(&[]), config);
        assert_eq!(settings.globs.include, vec!["from_config/*.test.toml"]);

        let settings = Settings::resolve(&parse(&[]), FileConfig::default());
        assert_eq!(settings.globs, GlobSet::defaults());
    }

    #[test]
    fn test_flags_override_config() {
        let config = FileConfig {
            middleware: Some(vec!["retry".to_string()]),
            verbosity: Some(Verbosity::Quiet),
            show_stacks: Some(true),
            timeout_ms: Some(250),
            ..Default::default()
        };

        let settings = Settings::resolve(&parse(&["-v", "full"]), config.clone());
        assert_eq!(settings.log_options.verbosity, Verbosity::Full);
        assert!(settings.log_options.show_stacks);
        assert_eq!(settings.middleware, vec!["retry"]);
        assert_eq!(
            settings.executor.default_timeout,
            Some(Duration::from_millis(250))
        );

        let settings = Settings::resolve(&parse(&["-m", "noop"]), config);
        assert_eq!(settings.middleware, vec!["noop"]);
        assert_eq!(settings.log_options.verbosity, Verbosity::Quiet);
    }

    #[test]
    fn test_chain_order() {
        let registry = MiddlewareRegistry::with_builtins();
        let settings = Settings::resolve(
            &parse(&["-m", "retry", "-m", "timing"]),
            FileConfig::default(),
        );

        let chain = build_chain(&registry, &settings, &[]).unwrap();
        let names: Vec<&str> = chain.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["retry", "timing", "console-logger", "counter"]);

        let settings = Settings::resolve(&parse(&["-b"]), FileConfig::default());
        let chain = build_chain(&registry, &settings, &[]).unwrap();
        let names: Vec<&str> = chain.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["build-server-logger", "counter"]);
    }

    #[test]
    fn test_build_server_options_come_from_config() {
        let config = FileConfig {
            build_server_suite: Some("nightly".to_string()),
            build_server_timestamps: Some(true),
            ..Default::default()
        };

        let settings = Settings::resolve(&parse(&["-b"]), config);
        assert!(settings.build_server);
        assert_eq!(settings.build_server_suite.as_deref(), Some("nightly"));
        assert!(settings.build_server_timestamps);

        let settings = Settings::resolve(&parse(&[]), FileConfig::default());
        assert_eq!(settings.build_server_suite, None);
        assert!(!settings.build_server_timestamps);
    }

    #[test]
    fn test_finish_maps_errors_to_one() {
        assert_eq!(finish(Ok(0)), 0);
        assert_eq!(finish(Ok(1)), 1);
        assert_eq!(
            finish(Err(CliError::Discovery(DiscoveryError::NoPatterns))),
            1
        );
    }

    #[test]
    fn test_unknown_middleware_is_error() {
        let registry = MiddlewareRegistry::with_builtins();
        let settings = Settings::resolve(&parse(&["-m", "nope"]), FileConfig::default());
        assert!(matches!(
            build_chain(&registry, &settings, &[]),
            Err(CliError::Registry(RegistryError::Unknown { .. }))
        ));
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(&[]), 0);
        assert_eq!(exit_code(&[TestResult::for_file("/a.test.toml", vec![])]), 0);
        assert_eq!(
            exit_code(&[TestResult::file_errored(
                "/b.test.toml",
                runner::ErrorDetail::new("bad")
            )]),
            1
        );
    }
}
