use std::error::Error as StdError;
use std::path::PathBuf;

use saga_engine::SagaStatus;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OrchestratorError {
    #[error("no saga registered under '{name}'")]
    SagaNotFound { name: String },

    #[error("a saga named '{name}' is already registered")]
    AlreadyRegistered { name: String },

    #[error("run '{correlation_id}' is already in progress")]
    RunInProgress { correlation_id: String },

    #[error("no run recorded for correlation id '{correlation_id}'")]
    RunNotFound { correlation_id: String },

    #[error("run '{correlation_id}' is {status} and cannot be retried")]
    NotRetryable {
        correlation_id: String,
        status: SagaStatus,
    },

    #[error("run store error")]
    Store(#[from] RunStoreError),

    #[error("configuration error")]
    Config(#[from] ConfigError),
}

/// Failure reported by a [`RunStore`](crate::RunStore) implementation.
#[derive(Debug, Error)]
#[error("failed to {operation} run record")]
pub struct RunStoreError {
    operation: &'static str,
    #[source]
    source: Box<dyn StdError + Send + Sync>,
}

impl RunStoreError {
    /// Wrap a backend failure that happened while performing `operation`
    /// (for example `"write"` or `"read"`).
    #[must_use]
    pub fn new<E>(operation: &'static str, source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self {
            operation,
            source: source.into(),
        }
    }

    #[must_use]
    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("TOML parse error")]
    Toml(#[from] toml::de::Error),

    #[error("failed to read configuration at '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration at '{path}'")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },
}
