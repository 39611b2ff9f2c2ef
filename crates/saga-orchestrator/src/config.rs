use std::path::Path;
use std::time::Duration;

use saga_engine::SagaConfig;
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    saga: SagaSection,
    #[serde(default)]
    runs: RunsSection,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SagaSection {
    #[serde(default, rename = "step-timeout-ms")]
    step_timeout_ms: Option<u64>,
    #[serde(default, rename = "compensation-timeout-ms")]
    compensation_timeout_ms: Option<u64>,
    #[serde(default, rename = "deadline-ms")]
    deadline_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RunsSection {
    #[serde(default, rename = "max-tracked")]
    max_tracked: Option<usize>,
}

/// Settings applied by a [`SagaOrchestrator`](crate::SagaOrchestrator).
///
/// Every key is optional:
///
/// ```toml
/// [saga]
/// step-timeout-ms = 5000
/// compensation-timeout-ms = 10000
/// deadline-ms = 60000
///
/// [runs]
/// max-tracked = 1000
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorConfig {
    saga_defaults: SagaConfig,
    max_tracked_runs: Option<usize>,
}

impl OrchestratorConfig {
    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Toml` if the text is not valid configuration and
    /// `ConfigError::InvalidValue` if a value is out of range.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        Self::from_file(file)
    }

    /// Read and parse a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read,
    /// `ConfigError::Parse` if it is not valid configuration and
    /// `ConfigError::InvalidValue` if a value is out of range.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let saga = file.saga;
        let mut defaults = SagaConfig::new();
        if let Some(ms) = positive_millis("saga.step-timeout-ms", saga.step_timeout_ms)? {
            defaults = defaults.with_default_step_timeout(ms);
        }
        if let Some(ms) =
            positive_millis("saga.compensation-timeout-ms", saga.compensation_timeout_ms)?
        {
            defaults = defaults.with_compensation_timeout(ms);
        }
        if let Some(ms) = positive_millis("saga.deadline-ms", saga.deadline_ms)? {
            defaults = defaults.with_deadline(ms);
        }

        if file.runs.max_tracked == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "runs.max-tracked",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            saga_defaults: defaults,
            max_tracked_runs: file.runs.max_tracked,
        })
    }

    /// Time bounds applied to registered sagas that did not set their own.
    #[must_use]
    pub fn saga_defaults(&self) -> SagaConfig {
        self.saga_defaults
    }

    /// Upper bound on run records kept by the in-memory store.
    #[must_use]
    pub fn max_tracked_runs(&self) -> Option<usize> {
        self.max_tracked_runs
    }

    #[must_use]
    pub fn with_saga_defaults(mut self, defaults: SagaConfig) -> Self {
        self.saga_defaults = defaults;
        self
    }

    #[must_use]
    pub fn with_max_tracked_runs(mut self, max: usize) -> Self {
        self.max_tracked_runs = Some(max);
        self
    }
}

fn positive_millis(key: &'static str, value: Option<u64>) -> Result<Option<Duration>, ConfigError> {
    match value {
        None => Ok(None),
        Some(0) => Err(ConfigError::InvalidValue {
            key,
            reason: "must be greater than zero".to_string(),
        }),
        Some(ms) => Ok(Some(Duration::from_millis(ms))),
    }
}
