//! Scheduler configuration.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Environment variable overriding the default concurrency limit.
pub const MAX_WORKERS_ENV: &str = "SLIPWAY_MAX_WORKERS";

/// Environment variable selecting the backend (`process` or `inline`).
pub const BACKEND_ENV: &str = "SLIPWAY_BACKEND";

/// How jobs are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// One fresh worker process per job.
    #[default]
    Process,
    /// Run jobs inline on the calling thread, one after another.
    ///
    /// No isolation and no parallelism. Meant for profiling and debugging.
    Inline,
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(Self::Process),
            "inline" => Ok(Self::Inline),
            other => Err(Error::Config(format!(
                "unknown backend '{}', expected 'process' or 'inline'",
                other
            ))),
        }
    }
}

/// Settings for one scheduling call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Jobs carry keyword arguments (`JobArgs::Keyword`).
    pub with_keyword_args: bool,
    /// Maximum number of workers alive at the same time.
    pub concurrency_limit: usize,
    /// Stop at the first job failure and return it.
    ///
    /// When off, failed jobs are dropped from the results.
    pub propagate_failures: bool,
    /// Execution backend.
    pub backend: BackendKind,
    /// Worker binary for the process backend. Searched for when unset.
    pub worker_path: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            with_keyword_args: false,
            concurrency_limit: default_concurrency(),
            propagate_failures: true,
            backend: BackendKind::default(),
            worker_path: None,
        }
    }
}

/// Number of processors available to this process, at least 1.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl SchedulerConfig {
    /// Defaults overridden by `SLIPWAY_MAX_WORKERS`, `SLIPWAY_BACKEND` and
    /// `SLIPWAY_WORKER_PATH`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup(MAX_WORKERS_ENV) {
            config.concurrency_limit = value.trim().parse().map_err(|e| {
                Error::Config(format!("{}='{}' is not a number: {}", MAX_WORKERS_ENV, value, e))
            })?;
        }
        if let Some(value) = lookup(BACKEND_ENV) {
            config.backend = value.parse()?;
        }
        if let Some(value) = lookup(crate::ipc::WORKER_PATH_ENV) {
            config.worker_path = Some(PathBuf::from(value));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_keyword_args(mut self, enabled: bool) -> Self {
        self.with_keyword_args = enabled;
        self
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn with_propagate_failures(mut self, enabled: bool) -> Self {
        self.propagate_failures = enabled;
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Shorthand for the inline backend.
    pub fn inline(self) -> Self {
        self.with_backend(BackendKind::Inline)
    }

    pub fn with_worker_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.worker_path = Some(path.into());
        self
    }

    /// Check the configuration before anything is spawned.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(Error::Config(
                "concurrency limit must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert!(!config.with_keyword_args);
        assert!(config.propagate_failures);
        assert_eq!(config.backend, BackendKind::Process);
        assert_eq!(config.concurrency_limit, default_concurrency());
        assert!(config.concurrency_limit >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_limit_rejected() {
        let config = SchedulerConfig::default().with_concurrency_limit(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = SchedulerConfig::from_lookup(lookup(&[
            (MAX_WORKERS_ENV, " 3 "),
            (BACKEND_ENV, "Inline"),
            ("SLIPWAY_WORKER_PATH", "/opt/slipway-worker"),
        ]))
        .unwrap();
        assert_eq!(config.concurrency_limit, 3);
        assert_eq!(config.backend, BackendKind::Inline);
        assert_eq!(config.worker_path, Some(PathBuf::from("/opt/slipway-worker")));
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        assert!(SchedulerConfig::from_lookup(lookup(&[(MAX_WORKERS_ENV, "many")])).is_err());
        assert!(SchedulerConfig::from_lookup(lookup(&[(MAX_WORKERS_ENV, "0")])).is_err());
        assert!(SchedulerConfig::from_lookup(lookup(&[(BACKEND_ENV, "threads")])).is_err());
    }

    #[test]
    fn test_builder() {
        let config = SchedulerConfig::default()
            .with_keyword_args(true)
            .with_concurrency_limit(1)
            .with_propagate_failures(false)
            .inline();
        assert!(config.with_keyword_args);
        assert_eq!(config.concurrency_limit, 1);
        assert!(!config.propagate_failures);
        assert_eq!(config.backend, BackendKind::Inline);
    }
}
