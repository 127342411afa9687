pub mod cli;
pub mod config;
pub mod discovery;
pub mod plugins;
pub mod registry;

pub use cli::{build_chain, exit_code, finish, run, run_in, Cli, CliError, CliResult, Settings};
pub use config::{ConfigError, ConfigResult, FileConfig};
pub use discovery::{DiscoveryError, DiscoveryResult, GlobSet};
pub use plugins::{RetryMiddleware, TimeoutMiddleware, TimingMiddleware};
pub use registry::{MiddlewareFactory, MiddlewareRegistry, RegistryError, RegistryResult};
