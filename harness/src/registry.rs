use crate::plugins::{NoopFactory, RetryFactory, TimeoutFactory, TimingFactory};
use runner::Middleware;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Empty middleware name")]
    EmptyName,

    #[error("Unknown middleware '{name}' (available: {available})")]
    Unknown { name: String, available: String },

    #[error("Invalid argument for middleware '{name}': {message}")]
    InvalidArgument { name: String, message: String },
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Builds a middleware from an optional `name:arg` argument.
pub trait MiddlewareFactory: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn create(&self, arg: Option<&str>) -> RegistryResult<Box<dyn Middleware>>;
}

pub struct MiddlewareRegistry {
    factories: HashMap<String, Box<dyn MiddlewareFactory>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding every built-in plugin.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(TimingFactory));
        registry.register(Box::new(RetryFactory));
        registry.register(Box::new(TimeoutFactory));
        registry.register(Box::new(NoopFactory));
        registry
    }

    pub fn register(&mut self, factory: Box<dyn MiddlewareFactory>) {
        let name = factory.name().to_string();
        self.factories.insert(name, factory);
    }

    pub fn get_factory(&self, name: &str) -> Option<&dyn MiddlewareFactory> {
        self.factories.get(name).map(|f| f.as_ref())
    }

    /// Registered names, sorted.
    pub fn list_middleware(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Instantiates `name` or `name:arg`.
    pub fn resolve(&self, spec: &str) -> RegistryResult<Box<dyn Middleware>> {
        let (name, arg) = match spec.split_once(':') {
            Some((name, arg)) => (name.trim(), Some(arg.trim())),
            None => (spec.trim(), None),
        };

        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        match self.factories.get(name) {
            Some(factory) => factory.create(arg),
            None => Err(RegistryError::Unknown {
                name: name.to_string(),
                available: self.list_middleware().join(", "),
            }),
        }
    }

    /// Instantiates every spec, keeping their order.
    pub fn resolve_all<S: AsRef<str>>(
        &self,
        specs: &[S],
    ) -> RegistryResult<Vec<Box<dyn Middleware>>> {
        specs.iter().map(|s| self.resolve(s.as_ref())).collect()
    }
}

impl Default for MiddlewareRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a numeric factory argument, falling back to `default` when absent.
pub(crate) fn parse_arg<T: FromStr>(
    name: &str,
    arg: Option<&str>,
    default: Option<T>,
) -> RegistryResult<T> {
    match (arg, default) {
        (Some(raw), _) => raw.parse().map_err(|_| RegistryError::InvalidArgument {
            name: name.to_string(),
            message: format!("'{}' is not a valid number", raw),
        }),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(RegistryError::InvalidArgument {
            name: name.to_string(),
            message: "an argument is required".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_listed() {
        let registry = MiddlewareRegistry::with_builtins();
        assert_eq!(
            registry.list_middleware(),
            vec!["noop", "retry", "timeout", "timing"]
        );
        assert!(registry.get_factory("retry").is_some());
        assert!(registry.get_factory("console-logger").is_none());
    }

    #[test]
    fn test_resolve_with_and_without_argument() {
        let registry = MiddlewareRegistry::with_builtins();

        assert_eq!(registry.resolve("timing").unwrap().name(), "timing");
        assert_eq!(registry.resolve("timing:250").unwrap().name(), "timing");
        assert_eq!(registry.resolve(" retry : 3 ").unwrap().name(), "retry");
        assert_eq!(registry.resolve("noop").unwrap().name(), "noop");
    }

    #[test]
    fn test_resolve_errors() {
        let registry = MiddlewareRegistry::with_builtins();

        match registry.resolve("coverage") {
            Err(RegistryError::Unknown { name, available }) => {
                assert_eq!(name, "coverage");
                assert_eq!(available, "noop, retry, timeout, timing");
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("unknown middleware resolved"),
        }

        assert!(matches!(registry.resolve(":5"), Err(RegistryError::EmptyName)));
        assert!(matches!(
            registry.resolve("timeout"),
            Err(RegistryError::InvalidArgument { .. })
        ));
        assert!(matches!(
            registry.resolve("retry:lots"),
            Err(RegistryError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_resolve_all_keeps_order() {
        let registry = MiddlewareRegistry::with_builtins();
        let chain = registry.resolve_all(&["retry:2", "timing", "noop"]).unwrap();
        let names: Vec<&str> = chain.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["retry", "timing", "noop"]);
    }

    #[test]
    fn test_parse_arg() {
        assert_eq!(parse_arg::<u64>("x", Some("5"), None).unwrap(), 5);
        assert_eq!(parse_arg::<u64>("x", None, Some(7)).unwrap(), 7);
        assert!(parse_arg::<u64>("x", Some("-1"), Some(7)).is_err());
    }
}
