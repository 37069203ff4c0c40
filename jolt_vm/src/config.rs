//! Runtime configuration.
//!
//! Resolved once when a [`Runtime`](crate::Runtime) is created; nothing
//! re-reads the environment afterwards.

use jolt_gc::{ConfigError, GcConfig};

/// Configuration of a runtime instance.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Allocator settings.
    pub gc: GcConfig,

    /// Log every call binding at info level (`JOLT_TRACE_DISPATCH`).
    pub trace_dispatch: bool,

    /// Log every compilation at info level (`JOLT_TRACE_COMPILE`).
    pub trace_compile: bool,
}

impl RuntimeConfig {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(|var| std::env::var(var).ok())
    }

    /// Resolve configuration through a variable lookup function.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("JOLT_GC_PAGE_SIZE") {
            match raw.trim().parse::<usize>() {
                Ok(page_size) => config.gc.page_size = page_size,
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid JOLT_GC_PAGE_SIZE"),
            }
        }
        config.trace_dispatch = env_bool(lookup("JOLT_TRACE_DISPATCH"));
        config.trace_compile = env_bool(lookup("JOLT_TRACE_COMPILE"));

        config
    }

    /// Create a configuration for unit tests.
    pub fn for_testing() -> Self {
        Self {
            gc: GcConfig::for_testing(),
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gc.validate()
    }
}

/// Check if a variable is set to a non-empty, truthy value.
#[inline]
fn env_bool(value: Option<String>) -> bool {
    value.map(|v| !v.is_empty() && v != "0").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: FxHashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_vars() {
        let config = RuntimeConfig::from_vars(vars(&[]));
        assert!(!config.trace_dispatch);
        assert!(!config.trace_compile);
        assert_eq!(config.gc.page_size, GcConfig::default().page_size);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reads_variables() {
        let config = RuntimeConfig::from_vars(vars(&[
            ("JOLT_GC_PAGE_SIZE", "8192"),
            ("JOLT_TRACE_DISPATCH", "1"),
            ("JOLT_TRACE_COMPILE", "0"),
        ]));
        assert_eq!(config.gc.page_size, 8192);
        assert!(config.trace_dispatch);
        assert!(!config.trace_compile);
    }

    #[test]
    fn test_invalid_page_size_ignored() {
        let config = RuntimeConfig::from_vars(vars(&[("JOLT_GC_PAGE_SIZE", "lots")]));
        assert_eq!(config.gc.page_size, GcConfig::default().page_size);
    }

    #[test]
    fn test_bad_page_size_fails_validation() {
        let config = RuntimeConfig::from_vars(vars(&[("JOLT_GC_PAGE_SIZE", "1000")]));
        assert!(config.validate().is_err());
    }
}
